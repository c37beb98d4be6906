use std::time::Duration;

use thiserror::Error;

use crate::rtc::TrackSource;
use crate::session::{CallState, CallTrigger};

/// Errors reported by an RTC provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtcError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MeetError {
    #[error("device acquisition failed: {0}")]
    DeviceAcquisition(RtcError),
    #[error("join failed: {0}")]
    Join(RtcError),
    #[error("join timed out after {0:?}")]
    JoinTimeout(Duration),
    #[error("publish failed: {0}")]
    Publish(RtcError),
    #[error("teardown failed: {0}")]
    Teardown(RtcError),
    #[error("track error: {0}")]
    Track(RtcError),
    #[error("client already joined")]
    AlreadyJoined,
    #[error("invalid transition from {from:?} on {trigger:?}")]
    InvalidTransition { from: CallState, trigger: CallTrigger },
    #[error("session has ended")]
    SessionEnded,
    #[error("{0} track not available")]
    TrackUnavailable(TrackSource),
    #[error("configuration error: {0}")]
    Config(String),
}
