//! In-process provider for offline sessions and tests.
//!
//! Models what the hosted provider does at the membership level: a client
//! holds at most one channel membership, publishes at most one video track,
//! and every publish/unpublish/leave is announced to the other members of
//! the channel. Tracks carry no media.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::errors::RtcError;
use crate::rtc::{
    ClientConfig, LocalTrack, MediaDevices, MediaKind, RemoteTrack, RtcClient, RtcEvent,
    RtcProvider, ScreenCaptureOptions, ScreenTracks, TrackSource, UserId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

static NEXT_TRACK: AtomicU64 = AtomicU64::new(1);

/// Failure and latency knobs for a loopback network.
#[derive(Debug, Clone, Default)]
pub struct LoopbackFaults {
    pub deny_camera: bool,
    pub deny_microphone: bool,
    /// The user dismisses the screen picker.
    pub cancel_screen_picker: bool,
    /// Screen captures never come with system audio.
    pub no_screen_audio: bool,
    pub reject_publish: bool,
    /// When set, joins must present this token.
    pub required_token: Option<String>,
    pub join_latency: Option<Duration>,
}

type Listeners = Arc<Mutex<Vec<mpsc::UnboundedSender<RtcEvent>>>>;

fn deliver(listeners: &Listeners, event: &RtcEvent) {
    lock(listeners).retain(|tx| tx.send(event.clone()).is_ok());
}

struct Member {
    listeners: Listeners,
    audio: usize,
    video: usize,
}

impl Member {
    fn count(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
        }
    }

    fn count_mut(&mut self, kind: MediaKind) -> &mut usize {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }
}

#[derive(Default)]
struct NetworkInner {
    channels: HashMap<String, HashMap<UserId, Member>>,
    faults: LoopbackFaults,
    join_calls: usize,
    tracks: Vec<Arc<LoopbackTrack>>,
}

impl NetworkInner {
    fn broadcast(&self, channel: &str, except: &UserId, event: RtcEvent) {
        if let Some(members) = self.channels.get(channel) {
            for (uid, member) in members {
                if uid != except {
                    deliver(&member.listeners, &event);
                }
            }
        }
    }
}

/// A set of channels shared by every client created from it.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: LoopbackFaults) -> Self {
        let network = Self::new();
        network.set_faults(faults);
        network
    }

    pub fn set_faults(&self, faults: LoopbackFaults) {
        lock(&self.inner).faults = faults;
    }

    pub fn faults(&self) -> LoopbackFaults {
        lock(&self.inner).faults.clone()
    }

    pub fn client(&self, config: ClientConfig) -> LoopbackClient {
        LoopbackClient {
            network: self.clone(),
            config,
            listeners: Arc::new(Mutex::new(Vec::new())),
            state: Mutex::new(ClientState::default()),
        }
    }

    /// Number of join attempts that reached the network.
    pub fn join_calls(&self) -> usize {
        lock(&self.inner).join_calls
    }

    /// Members of a channel, sorted.
    pub fn members(&self, channel: &str) -> Vec<UserId> {
        let inner = lock(&self.inner);
        let mut members: Vec<UserId> = inner
            .channels
            .get(channel)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn is_publishing(&self, channel: &str, uid: &UserId, kind: MediaKind) -> bool {
        lock(&self.inner)
            .channels
            .get(channel)
            .and_then(|m| m.get(uid))
            .is_some_and(|m| m.count(kind) > 0)
    }

    /// Every track created by this network's devices.
    pub fn tracks(&self) -> Vec<Arc<LoopbackTrack>> {
        lock(&self.inner).tracks.clone()
    }

    pub fn track(&self, id: &str) -> Option<Arc<LoopbackTrack>> {
        lock(&self.inner).tracks.iter().find(|t| t.id == id).cloned()
    }

    fn create_track(&self, source: TrackSource) -> Arc<LoopbackTrack> {
        let track = Arc::new(LoopbackTrack::new(source));
        lock(&self.inner).tracks.push(track.clone());
        track
    }
}

impl RtcProvider for LoopbackNetwork {
    fn create_client(&self, config: ClientConfig) -> Arc<dyn RtcClient> {
        Arc::new(self.client(config))
    }

    fn devices(&self) -> Arc<dyn MediaDevices> {
        Arc::new(LoopbackDevices {
            network: self.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Connection {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Default)]
struct ClientState {
    connection: Connection,
    channel: Option<String>,
    uid: Option<UserId>,
    published: Vec<Arc<dyn LocalTrack>>,
}

impl ClientState {
    fn membership(&self) -> Option<(String, UserId)> {
        match (&self.channel, &self.uid) {
            (Some(channel), Some(uid)) if self.connection == Connection::Connected => {
                Some((channel.clone(), uid.clone()))
            }
            _ => None,
        }
    }

    fn publishes(&self, kind: MediaKind) -> bool {
        self.published.iter().any(|t| t.source().kind() == kind)
    }
}

pub struct LoopbackClient {
    network: LoopbackNetwork,
    config: ClientConfig,
    listeners: Listeners,
    state: Mutex<ClientState>,
}

impl LoopbackClient {
    pub fn uid(&self) -> Option<UserId> {
        lock(&self.state).uid.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connection == Connection::Connected
    }

    pub fn published_ids(&self) -> Vec<String> {
        lock(&self.state)
            .published
            .iter()
            .map(|t| t.id().to_string())
            .collect()
    }
}

#[async_trait]
impl RtcClient for LoopbackClient {
    fn config(&self) -> ClientConfig {
        self.config
    }

    fn events(&self) -> mpsc::UnboundedReceiver<RtcEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(tx);
        rx
    }

    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: Option<&str>,
    ) -> Result<UserId, RtcError> {
        if app_id.is_empty() {
            return Err(RtcError::InvalidParams("app id is empty".into()));
        }
        if channel.is_empty() {
            return Err(RtcError::InvalidParams("channel name is empty".into()));
        }
        {
            let mut state = lock(&self.state);
            if state.connection != Connection::Disconnected {
                return Err(RtcError::InvalidOperation(format!(
                    "client already in {:?} state",
                    state.connection
                )));
            }
            state.connection = Connection::Connecting;
        }

        let faults = {
            let mut inner = lock(&self.network.inner);
            inner.join_calls += 1;
            inner.faults.clone()
        };
        match faults.join_latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        let mut state = lock(&self.state);
        if state.connection != Connection::Connecting {
            return Err(RtcError::InvalidOperation("join aborted by leave".into()));
        }
        if let Some(required) = faults.required_token.as_deref() {
            if token != Some(required) {
                state.connection = Connection::Disconnected;
                return Err(RtcError::Network("invalid token".into()));
            }
        }

        let mut inner = lock(&self.network.inner);
        let members = inner.channels.entry(channel.to_string()).or_default();
        let uid = loop {
            let candidate = UserId::Numeric(rand::random::<u32>());
            if !members.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut replay = Vec::new();
        for (other, member) in members.iter() {
            deliver(&member.listeners, &RtcEvent::UserJoined(uid.clone()));
            replay.push(RtcEvent::UserJoined(other.clone()));
            for kind in [MediaKind::Audio, MediaKind::Video] {
                if member.count(kind) > 0 {
                    replay.push(RtcEvent::UserPublished {
                        uid: other.clone(),
                        kind,
                    });
                }
            }
        }
        members.insert(
            uid.clone(),
            Member {
                listeners: self.listeners.clone(),
                audio: 0,
                video: 0,
            },
        );
        drop(inner);

        for event in &replay {
            deliver(&self.listeners, event);
        }

        state.connection = Connection::Connected;
        state.channel = Some(channel.to_string());
        state.uid = Some(uid.clone());
        tracing::debug!("loopback client {uid} joined {channel}");
        Ok(uid)
    }

    async fn publish(&self, tracks: &[Arc<dyn LocalTrack>]) -> Result<(), RtcError> {
        let faults = self.network.faults();
        let mut state = lock(&self.state);
        let (channel, uid) = state.membership().ok_or_else(|| {
            RtcError::InvalidOperation("can not publish track before joining channel".into())
        })?;
        if faults.reject_publish {
            return Err(RtcError::Network("publish rejected".into()));
        }

        let mut added: Vec<Arc<dyn LocalTrack>> = Vec::new();
        for track in tracks {
            if track.is_closed() {
                return Err(RtcError::InvalidOperation(format!(
                    "track {} is closed",
                    track.id()
                )));
            }
            if state.published.iter().chain(added.iter()).any(|t| t.id() == track.id()) {
                continue;
            }
            let is_video = track.source().kind() == MediaKind::Video;
            if is_video
                && (state.publishes(MediaKind::Video)
                    || added.iter().any(|t| t.source().kind() == MediaKind::Video))
            {
                return Err(RtcError::InvalidOperation(
                    "can not publish multiple video tracks".into(),
                ));
            }
            added.push(track.clone());
        }

        let mut inner = lock(&self.network.inner);
        let mut announced = Vec::new();
        if let Some(member) = inner.channels.get_mut(&channel).and_then(|m| m.get_mut(&uid)) {
            for track in &added {
                let kind = track.source().kind();
                let count = member.count_mut(kind);
                *count += 1;
                if *count == 1 {
                    announced.push(kind);
                }
            }
        }
        for kind in announced {
            inner.broadcast(&channel, &uid, RtcEvent::UserPublished { uid: uid.clone(), kind });
        }
        state.published.extend(added);
        Ok(())
    }

    async fn unpublish(&self, tracks: &[Arc<dyn LocalTrack>]) -> Result<(), RtcError> {
        let mut state = lock(&self.state);
        let Some((channel, uid)) = state.membership() else {
            tracing::debug!("unpublish on a client that is not in a channel");
            return Ok(());
        };

        let mut removed = Vec::new();
        state.published.retain(|held| {
            let matched = tracks.iter().any(|t| t.id() == held.id());
            if matched {
                removed.push(held.source().kind());
            }
            !matched
        });

        let mut inner = lock(&self.network.inner);
        let mut announced = Vec::new();
        if let Some(member) = inner.channels.get_mut(&channel).and_then(|m| m.get_mut(&uid)) {
            for kind in removed {
                let count = member.count_mut(kind);
                *count = count.saturating_sub(1);
                if *count == 0 {
                    announced.push(kind);
                }
            }
        }
        for kind in announced {
            inner.broadcast(&channel, &uid, RtcEvent::UserUnpublished { uid: uid.clone(), kind });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        uid: &UserId,
        kind: MediaKind,
    ) -> Result<Arc<dyn RemoteTrack>, RtcError> {
        let (channel, _) = lock(&self.state).membership().ok_or_else(|| {
            RtcError::InvalidOperation("can not subscribe before joining channel".into())
        })?;
        if !self.network.is_publishing(&channel, uid, kind) {
            return Err(RtcError::InvalidOperation(format!(
                "user {uid} is not publishing {kind}"
            )));
        }
        Ok(Arc::new(LoopbackRemoteTrack::new(uid.clone(), kind)))
    }

    async fn leave(&self) -> Result<(), RtcError> {
        let mut state = lock(&self.state);
        let membership = state.membership();
        state.connection = Connection::Disconnected;
        state.channel = None;
        state.uid = None;
        state.published.clear();

        if let Some((channel, uid)) = membership {
            let mut inner = lock(&self.network.inner);
            if let Some(members) = inner.channels.get_mut(&channel) {
                members.remove(&uid);
                if members.is_empty() {
                    inner.channels.remove(&channel);
                }
            }
            inner.broadcast(&channel, &uid, RtcEvent::UserLeft(uid.clone()));
            tracing::debug!("loopback client {uid} left {channel}");
        }
        Ok(())
    }
}

struct LoopbackDevices {
    network: LoopbackNetwork,
}

#[async_trait]
impl MediaDevices for LoopbackDevices {
    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalTrack>, RtcError> {
        tokio::task::yield_now().await;
        if self.network.faults().deny_microphone {
            return Err(RtcError::PermissionDenied("microphone".into()));
        }
        Ok(self.network.create_track(TrackSource::Microphone))
    }

    async fn create_camera_track(&self) -> Result<Arc<dyn LocalTrack>, RtcError> {
        tokio::task::yield_now().await;
        if self.network.faults().deny_camera {
            return Err(RtcError::PermissionDenied("camera".into()));
        }
        Ok(self.network.create_track(TrackSource::Camera))
    }

    async fn create_screen_tracks(
        &self,
        options: ScreenCaptureOptions,
    ) -> Result<ScreenTracks, RtcError> {
        tokio::task::yield_now().await;
        let faults = self.network.faults();
        if faults.cancel_screen_picker {
            return Err(RtcError::PermissionDenied("screen capture dismissed".into()));
        }
        let video: Arc<dyn LocalTrack> = self.network.create_track(TrackSource::ScreenVideo);
        let audio = (options.system_audio && !faults.no_screen_audio).then(|| {
            let track: Arc<dyn LocalTrack> = self.network.create_track(TrackSource::ScreenAudio);
            track
        });
        Ok(ScreenTracks { video, audio })
    }
}

/// A local track with call counters.
#[derive(Debug)]
pub struct LoopbackTrack {
    id: String,
    source: TrackSource,
    enabled: AtomicBool,
    playing: AtomicBool,
    stops: AtomicUsize,
    closes: AtomicUsize,
    ended: watch::Sender<bool>,
}

impl LoopbackTrack {
    pub fn new(source: TrackSource) -> Self {
        let n = NEXT_TRACK.fetch_add(1, Ordering::Relaxed);
        let (ended, _) = watch::channel(false);
        Self {
            id: format!("{source}-{n}"),
            source,
            enabled: AtomicBool::new(true),
            playing: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            ended,
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Simulate the user ending the capture from the browser's own UI.
    pub fn end_capture(&self) {
        self.ended.send_replace(true);
    }
}

#[async_trait]
impl LocalTrack for LoopbackTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> TrackSource {
        self.source
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), RtcError> {
        if self.is_closed() {
            return Err(RtcError::InvalidOperation(format!("track {} is closed", self.id)));
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended.subscribe()
    }
}

#[derive(Debug)]
pub struct LoopbackRemoteTrack {
    uid: UserId,
    kind: MediaKind,
    playing: AtomicBool,
}

impl LoopbackRemoteTrack {
    fn new(uid: UserId, kind: MediaKind) -> Self {
        Self {
            uid,
            kind,
            playing: AtomicBool::new(false),
        }
    }

    pub fn uid(&self) -> &UserId {
        &self.uid
    }
}

impl RemoteTrack for LoopbackRemoteTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
