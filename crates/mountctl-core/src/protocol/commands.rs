//! Protocol commands
//!
//! A [`Command`] is built per call and discarded once its reply has been
//! consumed. It owns its text, knows how its reply is framed, and how many
//! times the channel may retry it.

use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Longest command body accepted (between `#:` and the closing `#`)
pub const MAX_COMMAND_LEN: usize = 32;

/// Reply terminator used by the LX200 family
pub const TERMINATOR: u8 = b'#';

/// Positive acknowledgement byte
pub const ACK_OK: u8 = b'1';

/// How the controller answers a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyFormat {
    /// Nothing comes back
    None,
    /// A single `'1'`/`'0'` acknowledgement byte
    Ack,
    /// Bytes up to (not including) the given terminator
    Terminated(u8),
    /// Exactly this many bytes
    Fixed(usize),
}

impl ReplyFormat {
    pub fn expects_reply(&self) -> bool {
        !matches!(self, ReplyFormat::None)
    }
}

/// One outgoing command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    body: String,
    reply: ReplyFormat,
    retries: u32,
}

impl Command {
    /// Create a command from its body (e.g. `"GR"` or `"Sr08:00:00"`).
    ///
    /// The body must be printable ASCII without `#` and at most
    /// [`MAX_COMMAND_LEN`] bytes.
    pub fn new(body: impl Into<String>, reply: ReplyFormat) -> Result<Self, ProtocolError> {
        let body = body.into();
        if body.is_empty() {
            return Err(ProtocolError::InvalidArgument("empty command".to_string()));
        }
        if body.len() > MAX_COMMAND_LEN {
            return Err(ProtocolError::CommandTooLong {
                len: body.len(),
                max: MAX_COMMAND_LEN,
            });
        }
        if let Some(bad) = body
            .chars()
            .find(|c| !c.is_ascii() || c.is_ascii_control() || *c == '#')
        {
            return Err(ProtocolError::InvalidArgument(format!(
                "illegal character {bad:?} in command {body:?}"
            )));
        }
        Ok(Self {
            body,
            reply,
            retries: 0,
        })
    }

    /// Allow the channel to retry this command up to `retries` extra times
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn reply(&self) -> ReplyFormat {
        self.reply
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// True for "set" commands answered by a single acknowledgement byte
    pub fn requires_ack(&self) -> bool {
        self.reply == ReplyFormat::Ack
    }

    /// Wire bytes: `#:<body>#`. The leading `#` clears any partial command
    /// sitting in the controller's input buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.body.len() + 3);
        bytes.extend_from_slice(b"#:");
        bytes.extend_from_slice(self.body.as_bytes());
        bytes.push(TERMINATOR);
        bytes
    }
}
