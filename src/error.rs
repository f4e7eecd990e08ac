//! Error types for accel-datalog

use crate::types::{ControlEvent, RecordingState};
use thiserror::Error;

/// Failure reported by the logging transport for a single write.
///
/// None of these are fatal: the controller shows the message, counts the
/// dropped records and keeps recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteFailure {
    #[error("Logging busy. Samples dropped.")]
    Busy,

    #[error("Logging storage full. Sync with phone.")]
    Full,

    #[error("Logging session not found.")]
    NotFound,

    #[error("Logging session closed.")]
    Closed,

    #[error("Logging rejected invalid parameters.")]
    InvalidParams,

    #[error("Logging internal error.")]
    InternalError,
}

impl WriteFailure {
    /// Numeric code, in the order the device logging API reports them.
    /// `0` is reserved for success.
    pub fn code(&self) -> u8 {
        match self {
            WriteFailure::Busy => 1,
            WriteFailure::Full => 2,
            WriteFailure::NotFound => 3,
            WriteFailure::Closed => 4,
            WriteFailure::InvalidParams => 5,
            WriteFailure::InternalError => 6,
        }
    }

    /// Map a numeric result code back to a write result.
    ///
    /// Unknown codes are treated as internal errors.
    pub fn from_code(code: u8) -> WriteResult {
        match code {
            0 => Ok(()),
            1 => Err(WriteFailure::Busy),
            2 => Err(WriteFailure::Full),
            3 => Err(WriteFailure::NotFound),
            4 => Err(WriteFailure::Closed),
            5 => Err(WriteFailure::InvalidParams),
            _ => Err(WriteFailure::InternalError),
        }
    }
}

/// Outcome of one transport write
pub type WriteResult = Result<(), WriteFailure>;

/// Errors that can occur outside a single transport write
#[derive(Debug, Error)]
pub enum DatalogError {
    #[error("Event {event:?} is not valid while {state:?}")]
    InvalidTransition {
        state: RecordingState,
        event: ControlEvent,
    },

    #[error("Logging session {0} is already open")]
    SessionAlreadyOpen(u8),

    #[error("No logging session is open")]
    SessionClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Record stream length {0} is not a multiple of the record size")]
    TruncatedStream(usize),

    #[error("Record stream out of sync: reading at record {0} precedes any timestamp")]
    StreamOutOfSync(usize),

    #[error("Failed to parse sample: {0}")]
    SampleParse(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failure_codes_round_trip() {
        let all = [
            WriteFailure::Busy,
            WriteFailure::Full,
            WriteFailure::NotFound,
            WriteFailure::Closed,
            WriteFailure::InvalidParams,
            WriteFailure::InternalError,
        ];
        for failure in all {
            assert_eq!(WriteFailure::from_code(failure.code()), Err(failure));
        }
        assert_eq!(WriteFailure::from_code(0), Ok(()));
        assert_eq!(WriteFailure::from_code(42), Err(WriteFailure::InternalError));
    }

    #[test]
    fn test_write_failure_messages_are_distinct() {
        let messages: std::collections::HashSet<String> = (1..=6u8)
            .filter_map(|code| WriteFailure::from_code(code).err())
            .map(|f| f.to_string())
            .collect();
        assert_eq!(messages.len(), 6);
    }
}
