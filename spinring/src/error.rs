//! Error types for spinring.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RingError>;

/// Which side of the ring an operation was waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Read,
    Write,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Read => f.write_str("reading"),
            Side::Write => f.write_str("writing"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Busy wait exhausted after {ticks} ticks while {side}")]
    BusyWaitExhausted { side: Side, ticks: u64 },

    #[error("Unsupported operation: {operation} is not available on {variant}")]
    Unsupported { operation: &'static str, variant: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl RingError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    pub fn exhausted(side: Side, ticks: u64) -> Self {
        Self::BusyWaitExhausted { side, ticks }
    }

    pub fn unsupported(operation: &'static str, variant: impl Into<String>) -> Self {
        Self::Unsupported { operation, variant: variant.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// True for errors that signal a mismatch between the caller and the
    /// configured variant rather than a runtime condition.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::InvalidArgument { .. })
    }

    /// Side the failed wait was on, if this is an exhaustion error.
    pub fn side(&self) -> Option<Side> {
        match self {
            Self::BusyWaitExhausted { side, .. } => Some(*side),
            _ => None,
        }
    }
}
