use std::sync::Arc;

use futures_util::future;

use crate::errors::{MeetError, RtcError};
use crate::events::MeetEvent;
use crate::rtc::{LocalTrack, TrackSource, UserId};
use crate::session::{CallState, CallTrigger, SessionHandle, SurfaceStatus};
use crate::surface::{CallSurface, pump_remote_events};
use crate::tracks::PendingTrack;

/// Drives the media side of a session: acquire devices, join, publish, and
/// tear everything down again.
#[derive(Clone)]
pub struct CallController {
    session: Arc<SessionHandle>,
}

impl CallController {
    pub fn new(session: Arc<SessionHandle>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    /// Run [`start`](Self::start) in the background. The task is owned by the
    /// session so that [`end_call`](Self::end_call) can cancel it.
    pub fn launch(&self) {
        let mut tasks = self.session.tasks();
        if tasks.start.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("call start already in flight");
            return;
        }
        let controller = self.clone();
        tasks.start = Some(tokio::spawn(async move {
            if let Err(e) = controller.start().await {
                tracing::warn!("call start did not complete: {e}");
            }
        }));
    }

    /// Acquire microphone and camera, join the channel and publish them.
    pub async fn start(&self) -> Result<(), MeetError> {
        let s = &self.session;
        s.transition(CallTrigger::Start).await?;
        s.set_status(SurfaceStatus::LoadingDevices).await;

        if let Err(e) = self.acquire_local_media().await {
            self.abandon_start(&e).await;
            return Err(e);
        }
        s.set_status(SurfaceStatus::Ready).await;

        self.watch_remote_events();

        let uid = match self.join_media().await {
            Ok(uid) => uid,
            Err(e) => {
                self.abandon_start(&e).await;
                return Err(e);
            }
        };

        let published = self.publish_local_media().await;
        if let Err(e) = s.transition(CallTrigger::MediaJoined).await {
            tracing::info!("call ended while joining, leaving as {uid}");
            self.leave_media().await;
            return Err(e);
        }
        if let Err(e) = published {
            s.fail(&e).await;
            return Err(e);
        }

        tracing::info!("joined {} as {uid} and published local tracks", s.channel);
        Ok(())
    }

    /// Leave the call. Safe to call in any state; only the first call does
    /// any work.
    pub async fn end_call(&self) -> Result<(), MeetError> {
        let s = &self.session;
        match s.transition(CallTrigger::EndRequested).await {
            Ok(_) => {}
            Err(MeetError::SessionEnded)
            | Err(MeetError::InvalidTransition {
                from: CallState::Leaving,
                ..
            }) => {
                tracing::debug!("end call ignored, session already leaving");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.cancel_tasks().await;

        let _screen_op = s.screen_op.lock().await;
        CallSurface::new(s.clone()).withdraw_screen(false).await;
        self.leave_media().await;

        let released = s.local.lock().await.release_all();
        s.participants.lock().await.clear();
        s.set_screen_share_flag(false).await;
        s.transition(CallTrigger::LeaveCompleted).await?;
        s.emitter.emit(MeetEvent::CallEnded);
        tracing::info!("call ended, released {released} local tracks");
        Ok(())
    }

    async fn abandon_start(&self, error: &MeetError) {
        self.session.fail(error).await;
        if let Err(err) = self.session.transition(CallTrigger::JoinFailed).await {
            tracing::debug!("start abandoned after end of call: {err}");
        }
    }

    async fn acquire_local_media(&self) -> Result<(), MeetError> {
        let s = &self.session;
        let (microphone, camera) = future::join(
            self.acquire_device(s.devices.create_microphone_track()),
            self.acquire_device(s.devices.create_camera_track()),
        )
        .await;

        let mut failure = None;
        for acquired in [microphone, camera] {
            if let Err(e) = acquired {
                tracing::warn!("local device unavailable: {e}");
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            return Err(MeetError::DeviceAcquisition(e));
        }

        let toggles = s.toggles().await;
        for source in [TrackSource::Camera, TrackSource::Microphone] {
            if toggles.get(source) {
                continue;
            }
            let track = s.local.lock().await.track(source);
            if let Some(track) = track {
                track.set_enabled(false).await.map_err(MeetError::Track)?;
            }
        }
        Ok(())
    }

    /// Store the track as soon as its own request resolves, so teardown
    /// finds it even while the other device is still pending.
    async fn acquire_device<F>(&self, request: F) -> Result<(), RtcError>
    where
        F: Future<Output = Result<Arc<dyn LocalTrack>, RtcError>>,
    {
        let track = PendingTrack::new(request.await?);
        self.session.local.lock().await.claim(track);
        Ok(())
    }

    fn watch_remote_events(&self) {
        let events = self.session.media_client.events();
        let handle = tokio::spawn(pump_remote_events(self.session.clone(), events));
        if let Some(previous) = self.session.tasks().remote_events.replace(handle) {
            previous.abort();
        }
    }

    async fn join_media(&self) -> Result<UserId, MeetError> {
        let s = &self.session;
        s.media_link.lock().await.begin_join()?;

        let join = s
            .media_client
            .join(&s.config.app_id, &s.channel, s.config.token.as_deref());
        let joined = match s.config.join_timeout() {
            Some(limit) => match tokio::time::timeout(limit, join).await {
                Ok(result) => result.map_err(MeetError::Join),
                Err(_) => Err(MeetError::JoinTimeout(limit)),
            },
            None => join.await.map_err(MeetError::Join),
        };

        match joined {
            Ok(uid) => {
                s.media_link.lock().await.complete_join(uid.clone());
                s.participants.lock().await.add_local_uid(uid.clone());
                Ok(uid)
            }
            Err(e) => {
                if matches!(e, MeetError::JoinTimeout(_)) {
                    if let Err(err) = s.media_client.leave().await {
                        tracing::warn!("resetting client after join timeout failed: {err}");
                    }
                }
                s.media_link.lock().await.abort_join();
                Err(e)
            }
        }
    }

    async fn publish_local_media(&self) -> Result<(), MeetError> {
        let s = &self.session;
        let tracks = s.local.lock().await.device_tracks();
        if tracks.is_empty() {
            return Ok(());
        }
        s.media_client
            .publish(&tracks)
            .await
            .map_err(MeetError::Publish)
    }

    async fn leave_media(&self) {
        let s = &self.session;
        if !s.media_link.lock().await.begin_leave() {
            tracing::debug!("media client not in channel, nothing to leave");
            return;
        }
        let tracks = s.local.lock().await.device_tracks();
        if !tracks.is_empty() {
            if let Err(e) = s.media_client.unpublish(&tracks).await {
                tracing::warn!("unpublishing local tracks failed: {}", MeetError::Teardown(e));
            }
        }
        if let Err(e) = s.media_client.leave().await {
            tracing::warn!("leaving channel failed: {}", MeetError::Teardown(e));
        }
        s.media_link.lock().await.complete_leave();
        tracing::info!("left {}", s.channel);
    }

    async fn cancel_tasks(&self) {
        let (start, remote_events) = {
            let mut tasks = self.session.tasks();
            tasks.screen_watch.take();
            (tasks.start.take(), tasks.remote_events.take())
        };
        for handle in [start, remote_events].into_iter().flatten() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::MeetingConfig;
    use crate::loopback::{LoopbackFaults, LoopbackNetwork, LoopbackTrack};
    use crate::rtc::{
        ClientConfig, LocalTrack, MediaDevices, MediaKind, RtcClient, RtcProvider,
        ScreenCaptureOptions, ScreenTracks,
    };
    use crate::session::LinkState;
    use crate::surface::CallSurface;

    /// Devices whose camera permission prompt (optionally) and screen picker
    /// never get an answer.
    struct StalledDevices {
        microphone: Arc<LoopbackTrack>,
        camera: Arc<LoopbackTrack>,
        stall_camera: bool,
    }

    #[async_trait]
    impl MediaDevices for StalledDevices {
        async fn create_microphone_track(&self) -> Result<Arc<dyn LocalTrack>, RtcError> {
            Ok(self.microphone.clone())
        }

        async fn create_camera_track(&self) -> Result<Arc<dyn LocalTrack>, RtcError> {
            if self.stall_camera {
                std::future::pending::<()>().await;
            }
            Ok(self.camera.clone())
        }

        async fn create_screen_tracks(
            &self,
            _options: ScreenCaptureOptions,
        ) -> Result<ScreenTracks, RtcError> {
            std::future::pending::<()>().await;
            Err(RtcError::DeviceNotFound("screen".into()))
        }
    }

    struct StalledProvider {
        network: LoopbackNetwork,
        devices: Arc<StalledDevices>,
    }

    impl StalledProvider {
        fn new(stall_camera: bool) -> Self {
            Self {
                network: LoopbackNetwork::new(),
                devices: Arc::new(StalledDevices {
                    microphone: Arc::new(LoopbackTrack::new(TrackSource::Microphone)),
                    camera: Arc::new(LoopbackTrack::new(TrackSource::Camera)),
                    stall_camera,
                }),
            }
        }
    }

    impl RtcProvider for StalledProvider {
        fn create_client(&self, config: ClientConfig) -> Arc<dyn RtcClient> {
            self.network.create_client(config)
        }

        fn devices(&self) -> Arc<dyn MediaDevices> {
            self.devices.clone()
        }
    }

    fn config() -> MeetingConfig {
        MeetingConfig {
            app_id: "test-app".into(),
            ..Default::default()
        }
    }

    fn controller(network: &LoopbackNetwork, config: MeetingConfig) -> CallController {
        let channel = config.channel_name.clone();
        CallController::new(SessionHandle::new(config, channel, network))
    }

    async fn local_track(c: &CallController, source: TrackSource) -> Arc<dyn LocalTrack> {
        c.session().local.lock().await.track(source).unwrap()
    }

    #[tokio::test]
    async fn start_joins_and_publishes() {
        let network = LoopbackNetwork::new();
        let c = controller(&network, config());
        c.start().await.unwrap();

        let s = c.session();
        assert_eq!(s.state().await, CallState::Joined);
        assert_eq!(s.status().await, SurfaceStatus::Ready);
        let LinkState::Joined(uid) = s.media_link().await else {
            panic!("media client not joined");
        };
        assert_eq!(network.members("main"), vec![uid.clone()]);
        assert!(network.is_publishing("main", &uid, MediaKind::Video));
        assert!(network.is_publishing("main", &uid, MediaKind::Audio));
    }

    #[tokio::test]
    async fn second_start_does_not_join_again() {
        let network = LoopbackNetwork::new();
        let c = controller(&network, config());
        c.start().await.unwrap();
        assert!(matches!(
            c.start().await,
            Err(MeetError::InvalidTransition { .. })
        ));
        assert_eq!(network.join_calls(), 1);
        assert_eq!(network.members("main").len(), 1);
    }

    #[tokio::test]
    async fn join_media_guard_rejects_second_join() {
        let network = LoopbackNetwork::new();
        let c = controller(&network, config());
        c.start().await.unwrap();
        assert!(matches!(c.join_media().await, Err(MeetError::AlreadyJoined)));
        assert_eq!(network.join_calls(), 1);
    }

    #[tokio::test]
    async fn devices_off_on_join() {
        let network = LoopbackNetwork::new();
        let c = controller(
            &network,
            MeetingConfig {
                camera_on_join: false,
                ..config()
            },
        );
        c.start().await.unwrap();
        assert!(!local_track(&c, TrackSource::Camera).await.is_enabled());
        assert!(local_track(&c, TrackSource::Microphone).await.is_enabled());
    }

    #[tokio::test]
    async fn denied_camera_fails_without_joining() {
        let network = LoopbackNetwork::with_faults(LoopbackFaults {
            deny_camera: true,
            ..Default::default()
        });
        let c = controller(&network, config());
        assert!(matches!(
            c.start().await,
            Err(MeetError::DeviceAcquisition(_))
        ));
        assert!(matches!(c.session().status().await, SurfaceStatus::Failed(_)));
        assert_eq!(network.join_calls(), 0);

        c.end_call().await.unwrap();
        let mic = network
            .tracks()
            .into_iter()
            .find(|t| t.source() == TrackSource::Microphone)
            .unwrap();
        assert_eq!(mic.close_count(), 1);
    }

    #[tokio::test]
    async fn bad_token_surfaces_failure() {
        let network = LoopbackNetwork::with_faults(LoopbackFaults {
            required_token: Some("secret".into()),
            ..Default::default()
        });
        let c = controller(&network, config());
        assert!(matches!(c.start().await, Err(MeetError::Join(_))));
        let s = c.session();
        assert_eq!(s.state().await, CallState::Idle);
        assert_eq!(s.media_link().await, LinkState::Left);
        assert!(matches!(s.status().await, SurfaceStatus::Failed(_)));
    }

    #[tokio::test]
    async fn publish_failure_keeps_membership() {
        let network = LoopbackNetwork::with_faults(LoopbackFaults {
            reject_publish: true,
            ..Default::default()
        });
        let c = controller(&network, config());
        assert!(matches!(c.start().await, Err(MeetError::Publish(_))));
        assert_eq!(c.session().state().await, CallState::Joined);
        assert!(matches!(c.session().status().await, SurfaceStatus::Failed(_)));
    }

    #[tokio::test]
    async fn join_timeout_resets_client() {
        let network = LoopbackNetwork::with_faults(LoopbackFaults {
            join_latency: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let c = controller(
            &network,
            MeetingConfig {
                join_timeout_ms: Some(10),
                ..config()
            },
        );
        assert!(matches!(c.start().await, Err(MeetError::JoinTimeout(_))));
        assert!(matches!(c.session().status().await, SurfaceStatus::Failed(_)));
        assert!(network.members("main").is_empty());
        assert_eq!(c.session().state().await, CallState::Idle);
    }

    #[tokio::test]
    async fn end_call_releases_devices_and_leaves() {
        let network = LoopbackNetwork::new();
        let c = controller(&network, config());
        c.start().await.unwrap();
        let camera = local_track(&c, TrackSource::Camera).await;

        c.end_call().await.unwrap();

        assert_eq!(c.session().state().await, CallState::Ended);
        assert!(network.members("main").is_empty());
        let camera = network.track(camera.id()).unwrap();
        assert_eq!(camera.stop_count(), 1);
        assert_eq!(camera.close_count(), 1);
    }

    #[tokio::test]
    async fn end_call_twice_is_noop() {
        let network = LoopbackNetwork::new();
        let c = controller(&network, config());
        c.start().await.unwrap();
        c.end_call().await.unwrap();
        c.end_call().await.unwrap();
        for track in network.tracks() {
            assert_eq!(track.close_count(), 1);
        }
        assert!(matches!(c.start().await, Err(MeetError::SessionEnded)));
    }

    #[tokio::test]
    async fn end_during_join_cancels_and_releases() {
        let network = LoopbackNetwork::with_faults(LoopbackFaults {
            join_latency: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let c = controller(&network, config());
        c.launch();
        for _ in 0..100 {
            if c.session().media_link().await == LinkState::Joining {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(c.session().media_link().await, LinkState::Joining);

        c.end_call().await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(c.session().state().await, CallState::Ended);
        assert!(network.members("main").is_empty());
        assert_eq!(network.tracks().len(), 2);
        for track in network.tracks() {
            assert_eq!(track.close_count(), 1);
        }
    }

    #[tokio::test]
    async fn remote_publishers_become_tiles() {
        let network = LoopbackNetwork::new();
        let c = controller(&network, config());
        c.start().await.unwrap();

        let peer = network.client(ClientConfig::default());
        let peer_uid = peer.join("test-app", "main", None).await.unwrap();
        let devices = crate::rtc::RtcProvider::devices(&network);
        let camera = devices.create_camera_track().await.unwrap();
        peer.publish(&[camera]).await.unwrap();

        for _ in 0..100 {
            if !c.session().participants.lock().await.video_tiles().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(
            c.session().participants.lock().await.video_tiles(),
            vec![peer_uid]
        );
    }

    #[tokio::test]
    async fn end_while_camera_prompt_pending_releases_microphone() {
        let provider = StalledProvider::new(true);
        let c = CallController::new(SessionHandle::new(config(), "main".into(), &provider));
        c.launch();
        for _ in 0..100 {
            if c.session().local.lock().await.is_held(TrackSource::Microphone) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(c.session().state().await, CallState::JoiningMedia);

        c.end_call().await.unwrap();

        let devices = &provider.devices;
        assert_eq!(c.session().state().await, CallState::Ended);
        assert_eq!(devices.microphone.stop_count(), 1);
        assert_eq!(devices.microphone.close_count(), 1);
        assert_eq!(devices.camera.close_count(), 0);
        assert_eq!(provider.network.join_calls(), 0);
    }

    #[tokio::test]
    async fn end_while_screen_picker_open_does_not_wait() {
        let provider = StalledProvider::new(false);
        let c = CallController::new(SessionHandle::new(config(), "main".into(), &provider));
        c.start().await.unwrap();

        let surface = CallSurface::new(c.session().clone());
        let picker = tokio::spawn(async move { surface.start_screen_share().await });
        for _ in 0..100 {
            if c.session().toggles().await.screen_share_on {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(c.session().toggles().await.screen_share_on);

        tokio::time::timeout(Duration::from_millis(500), c.end_call())
            .await
            .expect("end_call waited on the screen picker")
            .unwrap();

        let devices = &provider.devices;
        assert_eq!(devices.microphone.close_count(), 1);
        assert_eq!(devices.camera.close_count(), 1);
        assert!(provider.network.members("main").is_empty());
        assert!(!c.session().toggles().await.screen_share_on);
        picker.abort();
    }
}
