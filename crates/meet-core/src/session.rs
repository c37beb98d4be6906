use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::config::{MeetingConfig, ScreenShareMode};
use crate::errors::MeetError;
use crate::events::{EventEmitter, MeetEvent, MeetEventListener};
use crate::participants::RemoteParticipants;
use crate::rtc::{MediaDevices, RtcClient, RtcProvider, TrackSource, UserId};
use crate::tracks::LocalMedia;

/// Lifecycle of a call.
///
/// `Idle → JoiningMedia → Joined → (ScreenSharing ⇄ Joined) → Leaving → Ended`,
/// with `JoiningMedia → Idle` when the join fails. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    JoiningMedia,
    Joined,
    ScreenSharing,
    Leaving,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTrigger {
    Start,
    MediaJoined,
    JoinFailed,
    ScreenShareStarted,
    ScreenShareStopped,
    EndRequested,
    LeaveCompleted,
}

impl CallState {
    pub fn next(self, trigger: CallTrigger) -> Result<CallState, MeetError> {
        use CallState::*;
        use CallTrigger::*;

        let next = match (self, trigger) {
            (Ended, _) => return Err(MeetError::SessionEnded),
            (Idle, Start) => JoiningMedia,
            (JoiningMedia, MediaJoined) => Joined,
            (JoiningMedia, JoinFailed) => Idle,
            (Joined, ScreenShareStarted) => ScreenSharing,
            (ScreenSharing, ScreenShareStopped) => Joined,
            (Idle | JoiningMedia | Joined | ScreenSharing, EndRequested) => Leaving,
            (Leaving, LeaveCompleted) => Ended,
            (from, trigger) => return Err(MeetError::InvalidTransition { from, trigger }),
        };
        Ok(next)
    }

    /// Whether local media may be toggled or published.
    pub fn is_live(self) -> bool {
        matches!(self, CallState::Joined | CallState::ScreenSharing)
    }

    pub fn is_over(self) -> bool {
        matches!(self, CallState::Leaving | CallState::Ended)
    }
}

/// Membership of one client in the channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Left,
    Joining,
    Joined(UserId),
    Leaving,
}

impl LinkState {
    pub fn begin_join(&mut self) -> Result<(), MeetError> {
        match self {
            LinkState::Left => {
                *self = LinkState::Joining;
                Ok(())
            }
            _ => Err(MeetError::AlreadyJoined),
        }
    }

    pub fn complete_join(&mut self, uid: UserId) {
        *self = LinkState::Joined(uid);
    }

    pub fn abort_join(&mut self) {
        *self = LinkState::Left;
    }

    /// Returns false when there is nothing to leave.
    pub fn begin_leave(&mut self) -> bool {
        match self {
            LinkState::Left | LinkState::Leaving => false,
            LinkState::Joining | LinkState::Joined(_) => {
                *self = LinkState::Leaving;
                true
            }
        }
    }

    pub fn complete_leave(&mut self) {
        *self = LinkState::Left;
    }

    pub fn uid(&self) -> Option<&UserId> {
        match self {
            LinkState::Joined(uid) => Some(uid),
            _ => None,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, LinkState::Joined(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaToggles {
    pub camera_on: bool,
    pub mic_on: bool,
    pub screen_share_on: bool,
}

impl MediaToggles {
    pub fn get(&self, source: TrackSource) -> bool {
        match source {
            TrackSource::Camera => self.camera_on,
            TrackSource::Microphone => self.mic_on,
            TrackSource::ScreenVideo | TrackSource::ScreenAudio => self.screen_share_on,
        }
    }

    pub fn set(&mut self, source: TrackSource, on: bool) {
        match source {
            TrackSource::Camera => self.camera_on = on,
            TrackSource::Microphone => self.mic_on = on,
            TrackSource::ScreenVideo | TrackSource::ScreenAudio => self.screen_share_on = on,
        }
    }
}

/// What the user currently sees in place of the call surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceStatus {
    LoadingDevices,
    Ready,
    Failed(String),
}

#[derive(Default)]
pub(crate) struct SessionTasks {
    pub(crate) start: Option<JoinHandle<()>>,
    pub(crate) remote_events: Option<JoinHandle<()>>,
    /// Dropping the sender stops the screen capture watcher.
    pub(crate) screen_watch: Option<oneshot::Sender<()>>,
}

/// Explicitly owned state of one meeting session.
///
/// Created when a meeting view mounts and shared by reference between the
/// controller and the call surface until it unmounts.
pub struct SessionHandle {
    pub(crate) config: MeetingConfig,
    pub(crate) channel: String,
    pub(crate) media_client: Arc<dyn RtcClient>,
    pub(crate) screen_client: Option<Arc<dyn RtcClient>>,
    pub(crate) devices: Arc<dyn MediaDevices>,
    pub(crate) emitter: EventEmitter,
    pub(crate) state: Mutex<CallState>,
    pub(crate) status: Mutex<SurfaceStatus>,
    pub(crate) toggles: Mutex<MediaToggles>,
    pub(crate) media_link: Mutex<LinkState>,
    pub(crate) screen_link: Mutex<LinkState>,
    pub(crate) local: Mutex<LocalMedia>,
    pub(crate) participants: Mutex<RemoteParticipants>,
    /// Serializes screen share start/stop.
    pub(crate) screen_op: Mutex<()>,
    pub(crate) tasks: StdMutex<SessionTasks>,
}

impl SessionHandle {
    pub fn new(config: MeetingConfig, channel: String, provider: &dyn RtcProvider) -> Arc<Self> {
        let media_client = provider.create_client(config.client);
        let screen_client = match config.screen_share {
            ScreenShareMode::DedicatedClient => Some(provider.create_client(config.client)),
            ScreenShareMode::SharedClient => None,
        };
        let toggles = MediaToggles {
            camera_on: config.camera_on_join,
            mic_on: config.mic_on_join,
            screen_share_on: false,
        };
        Arc::new(Self {
            channel,
            media_client,
            screen_client,
            devices: provider.devices(),
            emitter: EventEmitter::new(),
            state: Mutex::new(CallState::Idle),
            status: Mutex::new(SurfaceStatus::LoadingDevices),
            toggles: Mutex::new(toggles),
            media_link: Mutex::new(LinkState::Left),
            screen_link: Mutex::new(LinkState::Left),
            local: Mutex::new(LocalMedia::new()),
            participants: Mutex::new(RemoteParticipants::new()),
            screen_op: Mutex::new(()),
            tasks: StdMutex::new(SessionTasks::default()),
            config,
        })
    }

    pub fn config(&self) -> &MeetingConfig {
        &self.config
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn add_listener(&self, listener: Arc<dyn MeetEventListener>) {
        self.emitter.add_listener(listener);
    }

    pub async fn state(&self) -> CallState {
        *self.state.lock().await
    }

    pub async fn status(&self) -> SurfaceStatus {
        self.status.lock().await.clone()
    }

    pub async fn toggles(&self) -> MediaToggles {
        *self.toggles.lock().await
    }

    pub async fn media_link(&self) -> LinkState {
        self.media_link.lock().await.clone()
    }

    pub async fn screen_link(&self) -> LinkState {
        self.screen_link.lock().await.clone()
    }

    /// Apply a guarded transition and announce the new state.
    pub(crate) async fn transition(&self, trigger: CallTrigger) -> Result<CallState, MeetError> {
        let next = {
            let mut state = self.state.lock().await;
            let next = state.next(trigger)?;
            tracing::debug!("call state {:?} -> {next:?} on {trigger:?}", *state);
            *state = next;
            next
        };
        self.emitter.emit(MeetEvent::CallStateChanged(next));
        Ok(next)
    }

    pub(crate) async fn set_status(&self, status: SurfaceStatus) {
        *self.status.lock().await = status.clone();
        self.emitter.emit(MeetEvent::StatusChanged(status));
    }

    pub(crate) async fn fail(&self, error: &MeetError) {
        tracing::error!("{error}");
        self.set_status(SurfaceStatus::Failed(error.to_string())).await;
    }

    pub(crate) async fn set_screen_share_flag(&self, on: bool) {
        let changed = {
            let mut toggles = self.toggles.lock().await;
            let changed = toggles.screen_share_on != on;
            toggles.screen_share_on = on;
            changed
        };
        if changed {
            self.emitter.emit(MeetEvent::ScreenShareChanged(on));
        }
    }

    pub(crate) fn tasks(&self) -> std::sync::MutexGuard<'_, SessionTasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
