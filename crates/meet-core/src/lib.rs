//! Meet core: routing, call session control and the call surface model.
//!
//! Pure Rust crate with no platform dependencies. The RTC provider sits
//! behind the traits in [`rtc`]; [`loopback`] is an in-process provider
//! used offline and in tests.

pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod landing;
pub mod loopback;
pub mod meeting;
pub mod participants;
pub mod router;
pub mod rtc;
pub mod session;
pub mod surface;
pub mod tracks;

pub use config::{MeetingConfig, ScreenShareMode};
pub use controller::CallController;
pub use errors::{MeetError, RtcError};
pub use events::{EventEmitter, MeetEvent, MeetEventListener};
pub use landing::Landing;
pub use loopback::LoopbackNetwork;
pub use meeting::{MeetingScreen, MeetingView};
pub use participants::{RemoteParticipant, RemoteParticipants};
pub use router::{MeetingId, Route};
pub use rtc::{RtcClient, RtcProvider, UserId};
pub use session::{CallState, SessionHandle};
pub use surface::{CallSurface, SurfaceLayout};
