//! The in-call surface: local media toggles, screen share, and the remote
//! participant model the UI renders from.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::errors::MeetError;
use crate::events::MeetEvent;
use crate::rtc::{LocalTrack, MediaKind, RtcEvent, ScreenCaptureOptions, TrackSource, UserId};
use crate::session::{CallState, CallTrigger, MediaToggles, SessionHandle, SurfaceStatus};
use crate::tracks::PendingTrack;

pub const LOADING_DEVICES: &str = "Loading devices...";
pub const NO_REMOTE_USERS: &str = "No remote users";

/// What occupies the main area of the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Screen { track_id: String },
    Camera { track_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBar {
    pub camera: &'static str,
    pub microphone: &'static str,
    pub screen_share: &'static str,
    pub screen_share_active: bool,
    pub end_call: &'static str,
}

impl ControlBar {
    fn from_toggles(toggles: &MediaToggles) -> Self {
        Self {
            camera: if toggles.camera_on { "Cam On" } else { "Cam Off" },
            microphone: if toggles.mic_on { "Mic On" } else { "Mic Off" },
            screen_share: if toggles.screen_share_on {
                "Stop Share"
            } else {
                "Share Screen"
            },
            screen_share_active: toggles.screen_share_on,
            end_call: "End Call",
        }
    }
}

/// Render model of the call surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceLayout {
    pub status: SurfaceStatus,
    pub stage: Stage,
    /// Small camera preview shown over the screen share.
    pub camera_overlay: Option<String>,
    pub remote_tiles: Vec<UserId>,
    pub placeholder: Option<&'static str>,
    pub controls: ControlBar,
}

impl SurfaceLayout {
    /// Text shown instead of the surface, if any.
    pub fn banner(&self) -> Option<String> {
        match &self.status {
            SurfaceStatus::LoadingDevices => Some(LOADING_DEVICES.to_string()),
            SurfaceStatus::Ready => None,
            SurfaceStatus::Failed(reason) => Some(reason.clone()),
        }
    }
}

#[derive(Clone)]
pub struct CallSurface {
    session: Arc<SessionHandle>,
}

impl CallSurface {
    pub fn new(session: Arc<SessionHandle>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    /// Flip the camera. Returns the new state.
    pub async fn toggle_camera(&self) -> Result<bool, MeetError> {
        self.toggle_device(TrackSource::Camera).await
    }

    /// Flip the microphone. Returns the new state.
    pub async fn toggle_microphone(&self) -> Result<bool, MeetError> {
        self.toggle_device(TrackSource::Microphone).await
    }

    async fn toggle_device(&self, source: TrackSource) -> Result<bool, MeetError> {
        let s = &self.session;
        if s.state().await.is_over() {
            return Err(MeetError::SessionEnded);
        }
        let track = s
            .local
            .lock()
            .await
            .track(source)
            .ok_or(MeetError::TrackUnavailable(source))?;

        let mut toggles = s.toggles.lock().await;
        let enabled = !toggles.get(source);
        track.set_enabled(enabled).await.map_err(MeetError::Track)?;
        toggles.set(source, enabled);
        drop(toggles);

        s.emitter.emit(MeetEvent::LocalMediaToggled { source, enabled });
        tracing::info!("{source} enabled: {enabled}");
        Ok(enabled)
    }

    /// Start or stop screen share. Returns whether sharing is now on.
    pub async fn toggle_screen_share(&self) -> Result<bool, MeetError> {
        if self.session.toggles().await.screen_share_on {
            self.stop_screen_share().await?;
            Ok(false)
        } else {
            self.start_screen_share().await?;
            Ok(true)
        }
    }

    pub async fn start_screen_share(&self) -> Result<(), MeetError> {
        let s = &self.session;
        {
            let _op = s.screen_op.lock().await;
            match s.state().await {
                CallState::ScreenSharing => return Ok(()),
                CallState::Joined => {}
                from => {
                    return Err(MeetError::InvalidTransition {
                        from,
                        trigger: CallTrigger::ScreenShareStarted,
                    });
                }
            }
            if s.toggles().await.screen_share_on {
                tracing::debug!("screen capture already requested");
                return Ok(());
            }
            s.set_screen_share_flag(true).await;
        }

        // screen_op is not held while the picker is open: end_call must not
        // wait on the user.
        let options = ScreenCaptureOptions {
            system_audio: s.config.screen_system_audio,
        };
        let captured = match s.devices.create_screen_tracks(options).await {
            Ok(captured) => captured,
            Err(e) => {
                tracing::warn!("screen capture unavailable: {e}");
                s.set_screen_share_flag(false).await;
                return Err(MeetError::DeviceAcquisition(e));
            }
        };
        let video = captured.video.clone();
        let pending: Vec<PendingTrack> = std::iter::once(captured.video)
            .chain(captured.audio)
            .map(PendingTrack::new)
            .collect();

        let _op = s.screen_op.lock().await;
        let state = s.state().await;
        if state != CallState::Joined {
            tracing::info!("screen picked after the call moved to {state:?}, dropping capture");
            drop(pending);
            s.set_screen_share_flag(false).await;
            return Err(if state.is_over() {
                MeetError::SessionEnded
            } else {
                MeetError::InvalidTransition {
                    from: state,
                    trigger: CallTrigger::ScreenShareStarted,
                }
            });
        }

        let tracks = {
            let mut local = s.local.lock().await;
            for track in pending {
                local.claim(track);
            }
            local.screen_tracks()
        };

        if let Err(e) = self.publish_screen(&tracks).await {
            tracing::error!("screen share failed: {e}");
            s.local.lock().await.release_screen();
            s.set_screen_share_flag(false).await;
            return Err(e);
        }

        s.transition(CallTrigger::ScreenShareStarted).await?;
        self.watch_screen_capture(&video);
        tracing::info!("screen share published ({} tracks)", tracks.len());
        Ok(())
    }

    pub async fn stop_screen_share(&self) -> Result<(), MeetError> {
        let s = &self.session;
        let _op = s.screen_op.lock().await;
        let state = s.state().await;
        if state != CallState::ScreenSharing {
            tracing::debug!("screen share not active ({state:?}), nothing to stop");
            return Ok(());
        }

        s.tasks().screen_watch.take();
        self.withdraw_screen(true).await;
        let released = s.local.lock().await.release_screen();
        s.set_screen_share_flag(false).await;
        s.transition(CallTrigger::ScreenShareStopped).await?;
        tracing::info!("screen share stopped, released {released} tracks");
        Ok(())
    }

    async fn publish_screen(&self, tracks: &[Arc<dyn LocalTrack>]) -> Result<(), MeetError> {
        let s = &self.session;
        match &s.screen_client {
            Some(client) => {
                s.screen_link.lock().await.begin_join()?;
                let uid = match client
                    .join(&s.config.app_id, &s.channel, s.config.token.as_deref())
                    .await
                {
                    Ok(uid) => uid,
                    Err(e) => {
                        s.screen_link.lock().await.abort_join();
                        return Err(MeetError::Join(e));
                    }
                };
                s.screen_link.lock().await.complete_join(uid.clone());
                s.participants.lock().await.add_local_uid(uid);

                if let Err(e) = client.publish(tracks).await {
                    self.withdraw_screen(false).await;
                    return Err(MeetError::Publish(e));
                }
            }
            None => {
                let camera = s.local.lock().await.track(TrackSource::Camera);
                if let Some(camera) = &camera {
                    s.media_client
                        .unpublish(std::slice::from_ref(camera))
                        .await
                        .map_err(MeetError::Publish)?;
                }
                if let Err(e) = s.media_client.publish(tracks).await {
                    if let Some(camera) = camera {
                        if let Err(err) = s.media_client.publish(&[camera]).await {
                            tracing::warn!("republishing camera failed: {err}");
                        }
                    }
                    return Err(MeetError::Publish(e));
                }
            }
        }
        Ok(())
    }

    /// Take the screen capture off the channel: leave the dedicated client,
    /// or unpublish it from the shared one (optionally putting the camera
    /// back). Failures are logged.
    pub(crate) async fn withdraw_screen(&self, restore_camera: bool) {
        let s = &self.session;
        let tracks = s.local.lock().await.screen_tracks();
        match &s.screen_client {
            Some(client) => {
                if !s.screen_link.lock().await.begin_leave() {
                    return;
                }
                if !tracks.is_empty() {
                    if let Err(e) = client.unpublish(&tracks).await {
                        tracing::warn!("unpublishing screen tracks failed: {e}");
                    }
                }
                if let Err(e) = client.leave().await {
                    tracing::warn!("leaving with screen client failed: {e}");
                }
                s.screen_link.lock().await.complete_leave();
            }
            None => {
                if tracks.is_empty() || !s.media_link.lock().await.is_joined() {
                    return;
                }
                if let Err(e) = s.media_client.unpublish(&tracks).await {
                    tracing::warn!("unpublishing screen tracks failed: {e}");
                }
                if restore_camera {
                    let camera = s.local.lock().await.track(TrackSource::Camera);
                    if let Some(camera) = camera {
                        if let Err(e) = s.media_client.publish(&[camera]).await {
                            tracing::warn!("republishing camera failed: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Stop sharing when the capture ends from outside the app.
    fn watch_screen_capture(&self, video: &Arc<dyn LocalTrack>) {
        let mut ended = video.ended();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let surface = self.clone();
        tokio::spawn(async move {
            let capture_ended = async move { ended.wait_for(|ended| *ended).await.is_ok() };
            let ended_by_user = tokio::select! {
                ended = capture_ended => ended,
                _ = cancel_rx => false,
            };
            if !ended_by_user {
                return;
            }
            tracing::info!("screen share stopped from browser UI");
            if let Err(e) = surface.stop_screen_share().await {
                tracing::warn!("stopping screen share failed: {e}");
            }
        });
        self.session.tasks().screen_watch = Some(cancel_tx);
    }

    pub async fn layout(&self) -> SurfaceLayout {
        let s = &self.session;
        let toggles = s.toggles().await;
        let status = s.status().await;
        let (camera, screen) = {
            let local = s.local.lock().await;
            (
                local.track(TrackSource::Camera).map(|t| t.id().to_string()),
                local.track(TrackSource::ScreenVideo).map(|t| t.id().to_string()),
            )
        };
        let (stage, camera_overlay) = match screen {
            Some(track_id) if toggles.screen_share_on => (Stage::Screen { track_id }, camera),
            _ => (Stage::Camera { track_id: camera }, None),
        };
        let (remote_tiles, placeholder) = {
            let participants = s.participants.lock().await;
            (
                participants.video_tiles(),
                (participants.participant_count() == 0).then_some(NO_REMOTE_USERS),
            )
        };

        SurfaceLayout {
            status,
            stage,
            camera_overlay,
            remote_tiles,
            placeholder,
            controls: ControlBar::from_toggles(&toggles),
        }
    }
}

pub(crate) async fn pump_remote_events(
    session: Arc<SessionHandle>,
    mut events: mpsc::UnboundedReceiver<RtcEvent>,
) {
    while let Some(event) = events.recv().await {
        handle_remote_event(&session, event).await;
    }
    tracing::debug!("remote event stream closed");
}

pub(crate) async fn handle_remote_event(s: &SessionHandle, event: RtcEvent) {
    match event {
        RtcEvent::UserJoined(uid) => {
            if s.participants.lock().await.upsert(&uid).is_some() {
                s.emitter.emit(MeetEvent::RemoteUserJoined(uid));
            }
        }
        RtcEvent::UserPublished { uid, kind } => {
            if s.participants.lock().await.is_local(&uid) {
                tracing::debug!("ignoring own {kind} publication as {uid}");
                return;
            }
            let track = match s.media_client.subscribe(&uid, kind).await {
                Ok(track) => track,
                Err(e) => {
                    tracing::warn!("subscribing to {kind} of {uid} failed: {e}");
                    return;
                }
            };
            if !s.participants.lock().await.attach(&uid, track.clone()) {
                return;
            }
            if kind == MediaKind::Audio {
                track.play();
            }
            s.emitter.emit(MeetEvent::RemoteUserPublished { uid, kind });
        }
        RtcEvent::UserUnpublished { uid, kind } => {
            let mut participants = s.participants.lock().await;
            if participants.is_local(&uid) {
                return;
            }
            participants.detach(&uid, kind);
            drop(participants);
            s.emitter.emit(MeetEvent::RemoteUserUnpublished { uid, kind });
        }
        RtcEvent::UserLeft(uid) => {
            let mut participants = s.participants.lock().await;
            if participants.is_local(&uid) {
                return;
            }
            participants.remove(&uid);
            drop(participants);
            s.emitter.emit(MeetEvent::RemoteUserLeft(uid));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{MeetingConfig, ScreenShareMode};
    use crate::controller::CallController;
    use crate::loopback::{LoopbackFaults, LoopbackNetwork, LoopbackTrack};
    use crate::rtc::{ClientConfig, RtcClient, RtcProvider};
    use crate::session::LinkState;

    fn config(mode: ScreenShareMode) -> MeetingConfig {
        MeetingConfig {
            app_id: "test-app".into(),
            screen_share: mode,
            ..Default::default()
        }
    }

    async fn joined_call(
        network: &LoopbackNetwork,
        mode: ScreenShareMode,
    ) -> (CallController, CallSurface) {
        let config = config(mode);
        let session = SessionHandle::new(config, "main".into(), network);
        let controller = CallController::new(session.clone());
        controller.start().await.unwrap();
        (controller, CallSurface::new(session))
    }

    async fn loopback_track(
        network: &LoopbackNetwork,
        surface: &CallSurface,
        source: TrackSource,
    ) -> Arc<LoopbackTrack> {
        let track = surface.session().local.lock().await.track(source).unwrap();
        network.track(track.id()).unwrap()
    }

    async fn settle<F, Fut>(mut done: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if done().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn camera_flag_follows_toggle_parity() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        let camera = loopback_track(&network, &surface, TrackSource::Camera).await;
        let initial = surface.session().toggles().await.camera_on;

        for n in 1..=7 {
            let enabled = surface.toggle_camera().await.unwrap();
            assert_eq!(enabled, initial ^ (n % 2 == 1));
            assert_eq!(camera.is_enabled(), enabled);
        }
        assert_eq!(camera.close_count(), 0);
        assert_eq!(surface.layout().await.controls.camera, "Cam Off");
    }

    #[tokio::test]
    async fn microphone_toggle_leaves_camera_alone() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        assert!(!surface.toggle_microphone().await.unwrap());
        let toggles = surface.session().toggles().await;
        assert!(!toggles.mic_on);
        assert!(toggles.camera_on);
        assert_eq!(surface.layout().await.controls.microphone, "Mic Off");
    }

    #[tokio::test]
    async fn toggles_rejected_after_end() {
        let network = LoopbackNetwork::new();
        let (controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        controller.end_call().await.unwrap();
        assert!(matches!(
            surface.toggle_camera().await,
            Err(MeetError::SessionEnded)
        ));
        assert!(surface.toggle_screen_share().await.is_err());
    }

    #[tokio::test]
    async fn dedicated_screen_share_uses_second_client() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;

        assert!(surface.toggle_screen_share().await.unwrap());

        let s = surface.session();
        assert_eq!(s.state().await, CallState::ScreenSharing);
        let LinkState::Joined(screen_uid) = s.screen_link().await else {
            panic!("screen client not joined");
        };
        assert_eq!(network.members("main").len(), 2);
        assert!(network.is_publishing("main", &screen_uid, MediaKind::Video));
        assert!(network.is_publishing("main", &screen_uid, MediaKind::Audio));

        let layout = surface.layout().await;
        assert!(matches!(layout.stage, Stage::Screen { .. }));
        assert!(layout.camera_overlay.is_some());
        assert_eq!(layout.controls.screen_share, "Stop Share");
        assert!(layout.remote_tiles.is_empty());

        assert!(!surface.toggle_screen_share().await.unwrap());
        assert_eq!(s.state().await, CallState::Joined);
        assert_eq!(s.screen_link().await, LinkState::Left);
        assert_eq!(network.members("main").len(), 1);
    }

    #[tokio::test]
    async fn screen_client_can_rejoin_after_stop() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        surface.start_screen_share().await.unwrap();
        surface.stop_screen_share().await.unwrap();
        surface.start_screen_share().await.unwrap();
        assert_eq!(surface.session().state().await, CallState::ScreenSharing);
        assert_eq!(network.members("main").len(), 2);
    }

    #[tokio::test]
    async fn shared_screen_share_swaps_camera() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::SharedClient).await;
        let s = surface.session();
        let uid = s.media_link().await.uid().cloned().unwrap();
        let camera = loopback_track(&network, &surface, TrackSource::Camera).await;

        surface.start_screen_share().await.unwrap();
        let screen = loopback_track(&network, &surface, TrackSource::ScreenVideo).await;
        assert_eq!(network.members("main").len(), 1);
        assert!(network.is_publishing("main", &uid, MediaKind::Video));
        assert!(!camera.is_closed());

        surface.stop_screen_share().await.unwrap();
        assert!(network.is_publishing("main", &uid, MediaKind::Video));
        assert_eq!(screen.close_count(), 1);
        assert_eq!(camera.close_count(), 0);
        assert_eq!(s.state().await, CallState::Joined);
    }

    #[tokio::test]
    async fn dismissed_picker_resets_flag() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        network.set_faults(LoopbackFaults {
            cancel_screen_picker: true,
            ..Default::default()
        });
        assert!(matches!(
            surface.toggle_screen_share().await,
            Err(MeetError::DeviceAcquisition(_))
        ));
        assert!(!surface.session().toggles().await.screen_share_on);
        assert_eq!(surface.session().state().await, CallState::Joined);
    }

    #[tokio::test]
    async fn screen_publish_failure_leaves_screen_client() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        network.set_faults(LoopbackFaults {
            reject_publish: true,
            ..Default::default()
        });
        assert!(matches!(
            surface.start_screen_share().await,
            Err(MeetError::Publish(_))
        ));
        let s = surface.session();
        assert_eq!(s.screen_link().await, LinkState::Left);
        assert_eq!(network.members("main").len(), 1);
        assert!(s.local.lock().await.screen_tracks().is_empty());
        assert!(!s.toggles().await.screen_share_on);
    }

    const MODES: [ScreenShareMode; 2] = [
        ScreenShareMode::DedicatedClient,
        ScreenShareMode::SharedClient,
    ];

    async fn browser_stop_signal(mode: ScreenShareMode) {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, mode).await;
        let s = surface.session().clone();
        let uid = s.media_link().await.uid().cloned().unwrap();
        surface.toggle_microphone().await.unwrap();
        surface.start_screen_share().await.unwrap();

        let screen_video = loopback_track(&network, &surface, TrackSource::ScreenVideo).await;
        let screen_audio = loopback_track(&network, &surface, TrackSource::ScreenAudio).await;
        let camera = loopback_track(&network, &surface, TrackSource::Camera).await;
        let mic = loopback_track(&network, &surface, TrackSource::Microphone).await;

        screen_video.end_capture();
        settle(|| {
            let s = s.clone();
            async move { s.state().await == CallState::Joined }
        })
        .await;

        let toggles = s.toggles().await;
        assert!(!toggles.screen_share_on, "{mode:?}");
        assert!(toggles.camera_on);
        assert!(!toggles.mic_on);
        assert_eq!(screen_video.close_count(), 1);
        assert_eq!(screen_audio.close_count(), 1);
        assert_eq!(camera.close_count(), 0);
        assert_eq!(mic.close_count(), 0);
        assert!(camera.is_enabled());
        assert!(!mic.is_enabled());
        assert_eq!(network.members("main"), vec![uid.clone()]);
        // The screen tracks are gone, so a published video track is the camera.
        assert!(network.is_publishing("main", &uid, MediaKind::Video), "{mode:?}");
        assert!(network.is_publishing("main", &uid, MediaKind::Audio), "{mode:?}");
    }

    #[tokio::test]
    async fn browser_stop_signal_ends_screen_share_only() {
        for mode in MODES {
            browser_stop_signal(mode).await;
        }
    }

    async fn end_call_while_sharing(mode: ScreenShareMode) {
        let network = LoopbackNetwork::new();
        let (controller, surface) = joined_call(&network, mode).await;
        surface.start_screen_share().await.unwrap();
        assert_eq!(network.tracks().len(), 4);

        controller.end_call().await.unwrap();
        controller.end_call().await.unwrap();

        for track in network.tracks() {
            assert_eq!(track.stop_count(), 1, "{} stopped ({mode:?})", track.id());
            assert_eq!(track.close_count(), 1, "{} closed ({mode:?})", track.id());
        }
        assert!(network.members("main").is_empty(), "{mode:?}");
        assert!(!surface.session().toggles().await.screen_share_on);
        assert_eq!(surface.session().state().await, CallState::Ended);
    }

    #[tokio::test]
    async fn end_call_while_sharing_releases_all_tracks_once() {
        for mode in MODES {
            end_call_while_sharing(mode).await;
        }
    }

    #[tokio::test]
    async fn repeated_publish_events_render_one_tile() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        let peer = network.client(ClientConfig::default());
        let peer_uid = peer.join("test-app", "main", None).await.unwrap();
        let camera = network.devices().create_camera_track().await.unwrap();
        peer.publish(&[camera]).await.unwrap();

        let event = RtcEvent::UserPublished {
            uid: peer_uid.clone(),
            kind: MediaKind::Video,
        };
        handle_remote_event(surface.session(), event.clone()).await;
        handle_remote_event(surface.session(), event).await;

        let layout = surface.layout().await;
        assert_eq!(layout.remote_tiles, vec![peer_uid]);
        assert_eq!(layout.placeholder, None);
    }

    #[tokio::test]
    async fn remote_audio_plays_automatically() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        let peer = network.client(ClientConfig::default());
        let peer_uid = peer.join("test-app", "main", None).await.unwrap();
        let mic = network.devices().create_microphone_track().await.unwrap();
        peer.publish(&[mic]).await.unwrap();

        let s = surface.session().clone();
        let uid = peer_uid.clone();
        settle(|| {
            let s = s.clone();
            let uid = uid.clone();
            async move {
                s.participants
                    .lock()
                    .await
                    .participant(&uid)
                    .is_some_and(|p| p.has_audio)
            }
        })
        .await;

        let participants = s.participants.lock().await;
        let participant = participants.participant(&peer_uid).unwrap();
        assert!(participant.audio_track.as_ref().unwrap().is_playing());
        assert!(participants.video_tiles().is_empty());
    }

    #[tokio::test]
    async fn remote_leave_removes_tile() {
        let network = LoopbackNetwork::new();
        let (_controller, surface) = joined_call(&network, ScreenShareMode::DedicatedClient).await;
        let peer = network.client(ClientConfig::default());
        let peer_uid = peer.join("test-app", "main", None).await.unwrap();

        handle_remote_event(surface.session(), RtcEvent::UserJoined(peer_uid.clone())).await;
        assert_eq!(surface.layout().await.placeholder, None);
        handle_remote_event(surface.session(), RtcEvent::UserLeft(peer_uid)).await;
        assert_eq!(surface.layout().await.placeholder, Some(NO_REMOTE_USERS));
    }

    #[tokio::test]
    async fn layout_while_loading_devices() {
        let network = LoopbackNetwork::new();
        let session = SessionHandle::new(
            config(ScreenShareMode::DedicatedClient),
            "main".into(),
            &network,
        );
        let layout = CallSurface::new(session).layout().await;
        assert_eq!(layout.banner().as_deref(), Some(LOADING_DEVICES));
        assert_eq!(layout.stage, Stage::Camera { track_id: None });
        assert_eq!(layout.controls.camera, "Cam On");
        assert_eq!(layout.controls.screen_share, "Share Screen");
    }
}
