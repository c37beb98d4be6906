use crate::router::{MeetingId, Route};

pub const HEADLINE: &str = "Tính năng họp và gọi video dành cho tất cả mọi người";
pub const TAGLINE: &str = "Kết nối, cộng tác và ăn mừng ở mọi nơi với Google Meet";
pub const NEW_MEETING_LABEL: &str = "Cuộc họp mới";

/// The landing view: a call to action that starts a new meeting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Landing;

impl Landing {
    pub fn new() -> Self {
        Self
    }

    /// Route to a brand new meeting with a random id.
    pub fn create_meeting(&self) -> Route {
        let id = MeetingId::generate();
        tracing::info!("creating meeting {id}");
        Route::Meeting { id }
    }
}
