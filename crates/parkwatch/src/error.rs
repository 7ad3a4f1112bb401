//! Error types for the reconciliation engine.

use thiserror::Error;

use crate::slot::SlotId;

/// Failure talking to the remote channel.
///
/// Every variant belongs to the same class: the remote is unavailable for now.
/// Callers log it, record it in the sync status and keep operating on local state.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("remote channel unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote channel returned HTTP {0}")]
    Status(u16),

    #[error("malformed remote channel response: {0}")]
    Malformed(String),

    #[error("remote channel rejected the update")]
    Rejected,
}

/// Caller error from the command surface. Never mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown slot {0}")]
    UnknownSlot(SlotId),

    #[error("invalid reservation duration: {0} minutes")]
    InvalidDuration(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("slot count must be between 1 and {max}, got {got}")]
    SlotCount { got: u32, max: u32 },

    #[error("poll window must be at least 2 samples, got {0}")]
    PollWindow(u32),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("default reservation of {0:?} is out of range")]
    ReservationTooLong(std::time::Duration),

    #[error("occupied value must differ from free value ({0})")]
    SentinelCollision(u32),

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),
}
