use std::sync::{Arc, PoisonError, RwLock};

use crate::rtc::{MediaKind, TrackSource, UserId};
use crate::session::{CallState, SurfaceStatus};

/// Events emitted by a meeting session to UI listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetEvent {
    CallStateChanged(CallState),
    StatusChanged(SurfaceStatus),
    LocalMediaToggled { source: TrackSource, enabled: bool },
    ScreenShareChanged(bool),
    RemoteUserJoined(UserId),
    RemoteUserPublished { uid: UserId, kind: MediaKind },
    RemoteUserUnpublished { uid: UserId, kind: MediaKind },
    RemoteUserLeft(UserId),
    CallEnded,
}

/// Trait for receiving events from a session.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait MeetEventListener: Send + Sync {
    fn on_event(&self, event: MeetEvent);
}

/// Dispatches events to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn MeetEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn MeetEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn emit(&self, event: MeetEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}
