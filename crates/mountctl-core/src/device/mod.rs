//! Device capability interface
//!
//! A [`Device`] is driven by an owner that holds the [`DeviceRuntime`]: the
//! command channel, the published value table and the log context. The
//! owner applies options, initialises the device once, then polls it on
//! every scheduling cycle and forwards named writes through
//! [`Device::set_value`].

mod gem;
mod values;

pub use gem::GemDriver;
pub use values::{Value, ValueTable};

use crate::astro::Position;
use crate::config::MountConfig;
use crate::logging::LogContext;
use crate::mount::{MountError, MountEvent};
use crate::protocol::{
    codec, CommandChannel, JogDirection, MoveRate, ProtocolError, SerialLink, SerialPortLink,
    TrackingRate,
};

/// Everything a driver needs from its owner
pub struct DeviceRuntime {
    pub channel: CommandChannel,
    pub values: ValueTable,
    pub log: LogContext,
}

impl DeviceRuntime {
    pub fn new(link: Box<dyn SerialLink>, config: &MountConfig, log: LogContext) -> Self {
        Self {
            channel: CommandChannel::new(link, config.connection.channel_config(), &log),
            values: ValueTable::new(),
            log,
        }
    }

    /// Open the configured serial port
    pub fn open(config: &MountConfig, log: LogContext) -> Result<Self, ProtocolError> {
        let port = config
            .connection
            .port
            .as_deref()
            .ok_or(ProtocolError::NotConnected)?;
        let link = SerialPortLink::open(port, config.connection.baud_rate)?;
        Ok(Self::new(Box::new(link), config, log))
    }
}

pub trait Device {
    /// Apply a named option before [`Device::init`]
    fn process_option(&mut self, name: &str, value: &str) -> Result<(), MountError>;

    /// Bring the controller into a known state
    fn init(&mut self, rt: &mut DeviceRuntime) -> Result<(), MountError>;

    /// One scheduling cycle
    fn poll(&mut self, rt: &mut DeviceRuntime) -> Result<Vec<MountEvent>, MountError>;

    /// Handle a named write from the owner
    fn set_value(&mut self, rt: &mut DeviceRuntime, name: &str, value: &str)
        -> Result<(), MountError>;
}

/// Caller-facing operations
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Slew(Position),
    Sync(Position),
    SyncHa { hour_angle: f64, declination: f64 },
    Track(TrackingRate),
    Rot(JogDirection),
    StopRot,
    MoveRate(MoveRate),
    Home,
    Park,
    Abort,
    AcknowledgeBlock,
    SafetyOverride(bool),
}

fn invalid(name: &str, value: &str) -> MountError {
    MountError::InvalidArgument(format!("bad value {value:?} for {name}"))
}

fn parse_f64(name: &str, text: &str) -> Result<f64, MountError> {
    text.trim().parse().map_err(|_| invalid(name, text))
}

pub(crate) fn parse_bool(name: &str, text: &str) -> Result<bool, MountError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(invalid(name, text)),
    }
}

/// Split "a b" into two fields
fn pair<'a>(name: &str, text: &'a str) -> Result<(&'a str, &'a str), MountError> {
    let mut parts = text.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(invalid(name, text)),
    }
}

/// RA as `HH:MM:SS` or decimal degrees, Dec as `sDD*MM:SS` or decimal
/// degrees
fn parse_position(name: &str, text: &str) -> Result<Position, MountError> {
    let (ra, dec) = pair(name, text)?;
    let ra = codec::decode_ra(ra).or_else(|_| parse_f64(name, ra))?;
    let dec = codec::decode_dec(dec).or_else(|_| parse_f64(name, dec))?;
    if dec.abs() > 90.0 {
        return Err(invalid(name, text));
    }
    Ok(Position::new(ra, dec))
}

impl Operation {
    /// Parse a named write such as `("slew", "08:00:00 +45*00:00")`
    pub fn parse(name: &str, value: &str) -> Result<Self, MountError> {
        let op = match name {
            "slew" => Operation::Slew(parse_position(name, value)?),
            "sync" => Operation::Sync(parse_position(name, value)?),
            "sync_ha" => {
                let (ha, dec) = pair(name, value)?;
                let hour_angle = parse_f64(name, ha)?;
                let declination = codec::decode_dec(dec).or_else(|_| parse_f64(name, dec))?;
                Operation::SyncHa {
                    hour_angle,
                    declination,
                }
            }
            "track" => Operation::Track(
                TrackingRate::from_name(value.trim()).ok_or_else(|| invalid(name, value))?,
            ),
            "rot" => Operation::Rot(
                JogDirection::from_name(value.trim()).ok_or_else(|| invalid(name, value))?,
            ),
            "stop_rot" => Operation::StopRot,
            "move_rate" => Operation::MoveRate(match value.trim() {
                "guide" => MoveRate::Guide,
                "center" => MoveRate::Center,
                "slew" => MoveRate::Slew,
                _ => return Err(invalid(name, value)),
            }),
            "home" => Operation::Home,
            "park" => Operation::Park,
            "abort" => Operation::Abort,
            "acknowledge_block" => Operation::AcknowledgeBlock,
            "safety_override" => Operation::SafetyOverride(parse_bool(name, value)?),
            _ => return Err(MountError::Unsupported(format!("no writable value {name:?}"))),
        };
        Ok(op)
    }
}
