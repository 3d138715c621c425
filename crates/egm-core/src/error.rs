use crate::types::ReportId;
use thiserror::Error;

/// Protocol-level errors.
///
/// Every variant except [`Error::InvalidStateTransition`] and
/// [`Error::Config`] is a *format error*: the frame that produced it is
/// dropped and the device state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Format errors
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown report id: {0}")]
    UnknownReportId(ReportId),

    #[error("Report id mismatch: expected {expected}, got {actual}")]
    ReportIdMismatch {
        expected: ReportId,
        actual: ReportId,
    },

    #[error("Truncated {report} frame: need {needed} bytes, got {available}")]
    Truncated {
        report: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Invalid value {value} for field {field}")]
    InvalidFieldValue { field: &'static str, value: u64 },

    #[error("Field count mismatch for {report}: layout declares {expected}, got {actual}")]
    FieldCountMismatch {
        report: &'static str,
        expected: usize,
        actual: usize,
    },

    // State errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for malformed or undecodable frames.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        !matches!(
            self,
            Error::InvalidStateTransition { .. } | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
