//! The meeting view: owns one session from mount to unmount.

use std::sync::Arc;

use crate::config::MeetingConfig;
use crate::controller::CallController;
use crate::errors::MeetError;
use crate::events::MeetEventListener;
use crate::router::MeetingId;
use crate::rtc::RtcProvider;
use crate::session::{CallState, SessionHandle};
use crate::surface::{CallSurface, SurfaceLayout};

pub const CALL_ENDED_MESSAGE: &str = "Cuộc gọi đã kết thúc. Cảm ơn bạn!";

/// What the meeting view renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingScreen {
    InCall(SurfaceLayout),
    Ended { message: &'static str },
}

pub struct MeetingView {
    meeting_id: MeetingId,
    controller: CallController,
    surface: CallSurface,
    in_call: bool,
}

impl MeetingView {
    /// Create the session for `meeting_id` and start joining in the
    /// background. Must be called inside a tokio runtime.
    pub fn mount(
        meeting_id: MeetingId,
        config: &MeetingConfig,
        provider: &dyn RtcProvider,
    ) -> Result<Self, MeetError> {
        config.validate()?;
        let channel = config.channel_for(&meeting_id);
        tracing::info!("mounting meeting {meeting_id} on channel {channel}");

        let session = SessionHandle::new(config.clone(), channel, provider);
        let controller = CallController::new(session.clone());
        controller.launch();

        Ok(Self {
            meeting_id,
            controller,
            surface: CallSurface::new(session),
            in_call: true,
        })
    }

    pub fn meeting_id(&self) -> &MeetingId {
        &self.meeting_id
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        self.controller.session()
    }

    pub fn controller(&self) -> &CallController {
        &self.controller
    }

    pub fn surface(&self) -> &CallSurface {
        &self.surface
    }

    pub fn in_call(&self) -> bool {
        self.in_call
    }

    pub fn add_listener(&self, listener: Arc<dyn MeetEventListener>) {
        self.session().add_listener(listener);
    }

    pub async fn screen(&self) -> MeetingScreen {
        if !self.in_call || self.session().state().await == CallState::Ended {
            return MeetingScreen::Ended {
                message: CALL_ENDED_MESSAGE,
            };
        }
        MeetingScreen::InCall(self.surface.layout().await)
    }

    /// The End Call button. Teardown errors are logged; the view always
    /// switches to the ended screen.
    pub async fn end_call(&mut self) {
        if let Err(e) = self.controller.end_call().await {
            tracing::warn!("ending call for meeting {} failed: {e}", self.meeting_id);
        }
        self.in_call = false;
    }

    /// Tear the session down before the view goes away.
    pub async fn unmount(mut self) {
        self.end_call().await;
        tracing::info!("unmounted meeting {}", self.meeting_id);
    }
}

impl Drop for MeetingView {
    fn drop(&mut self) {
        if !self.in_call {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "meeting {} dropped outside a runtime, local tracks released on drop only",
                self.meeting_id
            );
            return;
        };
        let controller = self.controller.clone();
        runtime.spawn(async move {
            if let Err(e) = controller.end_call().await {
                tracing::warn!("ending dropped meeting failed: {e}");
            }
        });
    }
}
