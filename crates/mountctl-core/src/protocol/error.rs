//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the mount controller
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Timed out waiting for the controller")]
    Timeout,

    #[error("Not connected to mount controller")]
    NotConnected,

    #[error("Unexpected reply to '{command}': {reply:?}")]
    InvalidResponse { command: String, reply: String },

    #[error("Malformed field {text:?}: {reason}")]
    Malformed { text: String, reason: String },

    #[error("Controller did not acknowledge '{command}' after {attempts} attempts")]
    Hardware { command: String, attempts: u32 },

    #[error("Reply overflow: more than {0} bytes without terminator")]
    BufferOverflow(usize),

    #[error("Command body too long ({len} bytes, max {max})")]
    CommandTooLong { len: usize, max: usize },

    #[error("Invalid command argument: {0}")]
    InvalidArgument(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(text: &str, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    /// Reply content did not match the expected framing; the input buffer
    /// must be flushed before the next command.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidResponse { .. }
                | ProtocolError::Malformed { .. }
                | ProtocolError::BufferOverflow(_)
        )
    }

    /// Retry budget exhausted, or the link itself is unusable
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            ProtocolError::Hardware { .. }
                | ProtocolError::SerialError(_)
                | ProtocolError::NotConnected
                | ProtocolError::IoError(_)
        )
    }
}
