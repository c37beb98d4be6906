//! Contract with the hosted real-time communication provider.
//!
//! The provider owns transport, codecs and mixing. The core only drives it
//! through these traits: a client joins a channel, publishes local tracks,
//! subscribes to remote ones and reports membership changes as events.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::errors::RtcError;

/// Identity of a channel member as assigned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(u32),
    Named(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(n) => write!(f, "{n}"),
            UserId::Named(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Where a local track comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenVideo,
    ScreenAudio,
}

impl TrackSource {
    pub fn kind(self) -> MediaKind {
        match self {
            TrackSource::Microphone | TrackSource::ScreenAudio => MediaKind::Audio,
            TrackSource::Camera | TrackSource::ScreenVideo => MediaKind::Video,
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackSource::Microphone => "microphone",
            TrackSource::Camera => "camera",
            TrackSource::ScreenVideo => "screen-video",
            TrackSource::ScreenAudio => "screen-audio",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Vp8,
    Vp9,
    H264,
    Av1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    #[default]
    Rtc,
    Live,
}

/// Parameters used when creating a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub codec: Codec,
    #[serde(default)]
    pub mode: ClientMode,
}

/// Notifications a client receives about other channel members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcEvent {
    UserJoined(UserId),
    UserPublished { uid: UserId, kind: MediaKind },
    UserUnpublished { uid: UserId, kind: MediaKind },
    UserLeft(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenCaptureOptions {
    /// Ask the browser to include system audio with the capture.
    pub system_audio: bool,
}

/// Tracks produced by a single screen capture request.
#[derive(Debug, Clone)]
pub struct ScreenTracks {
    pub video: Arc<dyn LocalTrack>,
    pub audio: Option<Arc<dyn LocalTrack>>,
}

/// A captured local media track wrapping a device handle.
///
/// The device stays held until `close` is called.
#[async_trait]
pub trait LocalTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn source(&self) -> TrackSource;
    fn is_enabled(&self) -> bool;
    fn is_closed(&self) -> bool;
    async fn set_enabled(&self, enabled: bool) -> Result<(), RtcError>;
    fn play(&self);
    fn stop(&self);
    fn close(&self);
    /// Flips to `true` when capture ends outside of our control, e.g. the
    /// browser's own "stop sharing" button.
    fn ended(&self) -> watch::Receiver<bool>;
}

/// A subscribed remote track.
pub trait RemoteTrack: Send + Sync + fmt::Debug {
    fn kind(&self) -> MediaKind;
    fn play(&self);
    fn stop(&self);
    fn is_playing(&self) -> bool;
}

/// One connection to the provider. Holds at most one channel membership.
#[async_trait]
pub trait RtcClient: Send + Sync {
    fn config(&self) -> ClientConfig;

    /// Register a new event receiver. Events emitted before the call are not
    /// replayed.
    fn events(&self) -> mpsc::UnboundedReceiver<RtcEvent>;

    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: Option<&str>,
    ) -> Result<UserId, RtcError>;

    async fn publish(&self, tracks: &[Arc<dyn LocalTrack>]) -> Result<(), RtcError>;

    async fn unpublish(&self, tracks: &[Arc<dyn LocalTrack>]) -> Result<(), RtcError>;

    async fn subscribe(
        &self,
        uid: &UserId,
        kind: MediaKind,
    ) -> Result<Arc<dyn RemoteTrack>, RtcError>;

    async fn leave(&self) -> Result<(), RtcError>;
}

/// Access to capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalTrack>, RtcError>;
    async fn create_camera_track(&self) -> Result<Arc<dyn LocalTrack>, RtcError>;
    async fn create_screen_tracks(
        &self,
        options: ScreenCaptureOptions,
    ) -> Result<ScreenTracks, RtcError>;
}

/// Entry point of a provider SDK.
pub trait RtcProvider: Send + Sync {
    fn create_client(&self, config: ClientConfig) -> Arc<dyn RtcClient>;
    fn devices(&self) -> Arc<dyn MediaDevices>;
}
