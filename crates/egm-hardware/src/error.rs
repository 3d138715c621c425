//! Error types for peripheral operations.
//!
//! Hardware faults are not errors: they are persistent state held by the
//! fault aggregator. The variants here cover call failures only, such as a
//! lost transport, a bounded write that timed out, or a command the device
//! cannot perform.

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Failure of a call on a peripheral or its transport.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The link is down; `device` names the device or transport.
    #[error("{device} is disconnected")]
    Disconnected { device: String },

    /// A bounded write did not complete. The device is now disconnected.
    #[error("Write did not complete within {duration_ms} ms")]
    Timeout { duration_ms: u64 },

    /// The device lacks the capability. Never retried.
    #[error("Device does not support {operation}")]
    Unsupported { operation: String },

    /// The device is in a state that does not accept the operation.
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    #[error("Transport failure: {message}")]
    CommunicationError { message: String },

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    /// A command could not be encoded.
    #[error("Report codec: {0}")]
    Protocol(#[from] egm_core::Error),

    /// Port I/O from a transport implementation.
    #[error("Port I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn invalid_state(operation: impl Into<String>, state: impl ToString) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Returns `true` if the failure took the transport down.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. }
                | Self::Timeout { .. }
                | Self::CommunicationError { .. }
                | Self::Io(_)
        )
    }
}
