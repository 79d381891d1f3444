//! Command channel
//!
//! Frames commands onto a [`SerialLink`], reads terminator- or
//! length-delimited replies, and retries commands that time out or are not
//! acknowledged. Any framing error marks the channel for resynchronisation:
//! the input buffer is flushed before the next command goes out.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{
    commands::ACK_OK, Command, ProtocolError, ReplyFormat, SerialLink, DEFAULT_RETRY_PAUSE_MS,
    DEFAULT_TIMEOUT_MS, MAX_REPLY_LEN,
};
use crate::logging::LogContext;

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Deadline for a complete reply
    pub reply_timeout: Duration,
    /// Deadline for transmitting one command
    pub write_timeout: Duration,
    /// Retry budget for commands built without an explicit one
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_pause: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: 2,
            retry_pause: Duration::from_millis(DEFAULT_RETRY_PAUSE_MS),
        }
    }
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCounters {
    /// Bytes written, framing included
    pub tx_bytes: u64,
    /// Bytes read
    pub rx_bytes: u64,
    /// Commands written, retries included
    pub tx_commands: u64,
    /// Retried attempts
    pub retries: u64,
    /// Input flushes
    pub flushes: u64,
}

/// Framed command/reply exchange over one serial link
pub struct CommandChannel {
    link: Box<dyn SerialLink>,
    config: ChannelConfig,
    needs_resync: bool,
    counters: ChannelCounters,
    log: LogContext,
}

/// Decode reply bytes as Latin-1 so every byte maps to one char
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

impl CommandChannel {
    /// Wrap a link. Nothing is written until the first command.
    pub fn new(link: Box<dyn SerialLink>, config: ChannelConfig, log: &LogContext) -> Self {
        Self {
            link,
            config,
            needs_resync: false,
            counters: ChannelCounters::default(),
            log: log.child("channel"),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn counters(&self) -> ChannelCounters {
        self.counters
    }

    /// True when the next command will be preceded by an input flush
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Port name or description of the underlying link
    pub fn link_name(&self) -> String {
        self.link.describe()
    }

    /// Flush pending input so the next reply starts on a frame boundary
    pub fn resync(&mut self) -> Result<(), ProtocolError> {
        let _span = self.log.enter();
        self.link.clear_input()?;
        self.needs_resync = false;
        self.counters.flushes = self.counters.flushes.saturating_add(1);
        debug!("input flushed");
        Ok(())
    }

    fn note_error(&mut self, err: &ProtocolError) {
        if err.is_framing() {
            self.needs_resync = true;
        }
    }

    /// Frame and transmit a command
    pub fn write_command(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        if self.needs_resync {
            self.resync()?;
        }
        let _span = self.log.enter();
        let bytes = cmd.to_bytes();
        debug!(command = cmd.body(), "tx");
        self.link.write_bytes(&bytes, self.config.write_timeout)?;
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(bytes.len() as u64);
        self.counters.tx_commands = self.counters.tx_commands.saturating_add(1);
        Ok(())
    }

    /// Blocking read of one reply. The terminator is not included.
    pub fn read_reply(&mut self, format: ReplyFormat) -> Result<String, ProtocolError> {
        let result = self.read_reply_inner(format);
        if let Err(e) = &result {
            self.note_error(e);
        }
        result
    }

    fn read_reply_inner(&mut self, format: ReplyFormat) -> Result<String, ProtocolError> {
        let deadline = Instant::now() + self.config.reply_timeout;
        let mut reply = Vec::new();

        match format {
            ReplyFormat::None => return Ok(String::new()),
            ReplyFormat::Ack => {
                reply.push(self.next_byte(deadline)?);
            }
            ReplyFormat::Fixed(len) => {
                if len > MAX_REPLY_LEN {
                    return Err(ProtocolError::BufferOverflow(MAX_REPLY_LEN));
                }
                while reply.len() < len {
                    reply.push(self.next_byte(deadline)?);
                }
            }
            ReplyFormat::Terminated(terminator) => loop {
                let byte = self.next_byte(deadline)?;
                if byte == terminator {
                    break;
                }
                if reply.len() >= MAX_REPLY_LEN {
                    return Err(ProtocolError::BufferOverflow(MAX_REPLY_LEN));
                }
                reply.push(byte);
            },
        }

        let text = latin1(&reply);
        let _span = self.log.enter();
        debug!(reply = %text, "rx");
        Ok(text)
    }

    fn next_byte(&mut self, deadline: Instant) -> Result<u8, ProtocolError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.link.read_byte(remaining)? {
            Some(byte) => {
                self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(1);
                Ok(byte)
            }
            None => Err(ProtocolError::Timeout),
        }
    }

    fn pause(&self) {
        if !self.config.retry_pause.is_zero() {
            std::thread::sleep(self.config.retry_pause);
        }
    }

    /// Send a command and return its reply.
    ///
    /// Timeouts and, for acknowledged commands, negative or garbled
    /// acknowledgements are retried up to `cmd.retries()` times; an exhausted
    /// budget surfaces as [`ProtocolError::Hardware`]. Framing errors on
    /// other replies are returned immediately so the caller can decide
    /// whether to resend.
    ///
    /// A timed-out attempt may still be answered late, so input is flushed
    /// before the retry and again before the next command.
    pub fn transact(&mut self, cmd: &Command) -> Result<String, ProtocolError> {
        let attempts = cmd.retries().saturating_add(1);
        let mut timed_out = false;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.counters.retries = self.counters.retries.saturating_add(1);
                self.pause();
            }

            let outcome = self
                .write_command(cmd)
                .and_then(|_| self.read_reply(cmd.reply()));

            let _span = self.log.enter();
            match outcome {
                Ok(reply) if cmd.requires_ack() => {
                    if reply.len() == 1 && reply.as_bytes()[0] == ACK_OK {
                        self.needs_resync |= timed_out;
                        return Ok(reply);
                    }
                    if reply != "0" {
                        self.needs_resync = true;
                    }
                    warn!(command = cmd.body(), reply = %reply, attempt, "not acknowledged");
                }
                Ok(reply) => {
                    self.needs_resync |= timed_out;
                    return Ok(reply);
                }
                Err(ProtocolError::Timeout) => {
                    timed_out = true;
                    self.needs_resync = true;
                    warn!(command = cmd.body(), attempt, "timeout");
                }
                Err(e) if e.is_framing() && cmd.requires_ack() => {
                    warn!(command = cmd.body(), attempt, error = %e, "garbled acknowledgement");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProtocolError::Hardware {
            command: cmd.body().to_string(),
            attempts,
        })
    }

    /// Send a query and decode its reply. A reply that does not decode counts
    /// as a framing error and the input is flushed before the next command.
    pub fn query<T>(
        &mut self,
        cmd: &Command,
        decode: impl FnOnce(&str) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let reply = self.transact(cmd)?;
        let decoded = decode(&reply);
        if let Err(e) = &decoded {
            self.note_error(e);
            let _span = self.log.enter();
            warn!(command = cmd.body(), reply = %reply, error = %e, "undecodable reply");
        }
        decoded
    }

    /// Send a "set" command that must be acknowledged with `'1'`
    pub fn write_and_expect_ack(&mut self, body: &str, max_retries: u32) -> Result<(), ProtocolError> {
        let cmd = Command::new(body, ReplyFormat::Ack)?.with_retries(max_retries);
        self.transact(&cmd).map(|_| ())
    }

    /// Send a command that has no reply
    pub fn send(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        let attempts = cmd.retries().saturating_add(1);
        let mut last = ProtocolError::Timeout;
        for attempt in 1..=attempts {
            if attempt > 1 {
                self.counters.retries = self.counters.retries.saturating_add(1);
                self.pause();
            }
            match self.write_command(cmd) {
                Ok(()) => return Ok(()),
                Err(ProtocolError::Timeout) => last = ProtocolError::Timeout,
                Err(e) => return Err(e),
            }
        }
        let _span = self.log.enter();
        warn!(command = cmd.body(), error = %last, "write failed");
        Err(ProtocolError::Hardware {
            command: cmd.body().to_string(),
            attempts,
        })
    }
}
