//! Serial Protocol Communication
//!
//! Implements the LX200 ASCII command protocol spoken by Meade and
//! Astro-Physics GTO mount controllers.
//!
//! Commands are framed as `#:<body>#`. Replies are a single acknowledgement
//! byte, a `#`-terminated string, or a fixed-length field depending on the
//! command.

pub mod channel;
pub mod codec;
pub mod command_builder;
pub mod commands;
mod error;
pub mod serial;

pub use channel::{ChannelConfig, ChannelCounters, CommandChannel};
pub use command_builder::{
    ApFirmware, CommandBuilder, FlavorTable, JogDirection, MoveRate, ProtocolFlavor, TrackingRate,
    UtcOffsetEncoding,
};
pub use commands::{Command, ReplyFormat, MAX_COMMAND_LEN, TERMINATOR};
pub use error::ProtocolError;
pub use serial::{list_ports, open_port, PortInfo, SerialLink, SerialPortLink};

/// Default baud rate for LX200 controllers
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default timeout for replies in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Pause between retries of a failed command
pub const DEFAULT_RETRY_PAUSE_MS: u64 = 50;

/// Longest reply accepted before the terminator
pub const MAX_REPLY_LEN: usize = 128;
