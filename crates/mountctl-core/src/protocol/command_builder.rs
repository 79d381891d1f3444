//! Command Builder
//!
//! Builds LX200 commands for a given protocol flavor. Flavor differences are
//! data, not behaviour: each [`ProtocolFlavor`] resolves to a static
//! [`FlavorTable`] holding the command spellings that differ between
//! controllers.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::codec::{encode_date, encode_dec, encode_latitude, encode_longitude, encode_ra, encode_time};
use super::{Command, ProtocolError, ReplyFormat, TERMINATOR};

/// Astro-Physics GTO firmware generations that matter on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApFirmware {
    /// Reports negative UTC offsets through the keypad character table
    Legacy,
    /// Reports UTC offsets as plain signed numbers
    #[default]
    Modern,
}

/// LX200 protocol flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolFlavor {
    Lx200Classic,
    AstroPhysics {
        #[serde(default)]
        firmware: ApFirmware,
    },
}

impl Default for ProtocolFlavor {
    fn default() -> Self {
        ProtocolFlavor::AstroPhysics {
            firmware: ApFirmware::Modern,
        }
    }
}

impl ProtocolFlavor {
    pub fn table(&self) -> &'static FlavorTable {
        match self {
            ProtocolFlavor::Lx200Classic => &CLASSIC_TABLE,
            ProtocolFlavor::AstroPhysics {
                firmware: ApFirmware::Modern,
            } => &ASTRO_PHYSICS_TABLE,
            ProtocolFlavor::AstroPhysics {
                firmware: ApFirmware::Legacy,
            } => &ASTRO_PHYSICS_LEGACY_TABLE,
        }
    }

    /// Firmware revision whose UTC-offset quirks apply, if any
    pub fn ap_firmware(&self) -> Option<ApFirmware> {
        match self {
            ProtocolFlavor::AstroPhysics { firmware } => Some(*firmware),
            ProtocolFlavor::Lx200Classic => None,
        }
    }

    /// Parse a flavor name as given on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lx200" | "classic" | "lx200-classic" => Some(ProtocolFlavor::Lx200Classic),
            "ap" | "astro-physics" | "apgto" => Some(ProtocolFlavor::AstroPhysics {
                firmware: ApFirmware::Modern,
            }),
            "ap-legacy" | "apgto-legacy" => Some(ProtocolFlavor::AstroPhysics {
                firmware: ApFirmware::Legacy,
            }),
            _ => None,
        }
    }
}

/// Tracking rates selectable on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingRate {
    Sidereal,
    Lunar,
    Solar,
    None,
}

impl TrackingRate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sidereal" => Some(TrackingRate::Sidereal),
            "lunar" => Some(TrackingRate::Lunar),
            "solar" => Some(TrackingRate::Solar),
            "none" | "off" => Some(TrackingRate::None),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrackingRate::Sidereal => "sidereal",
            TrackingRate::Lunar => "lunar",
            TrackingRate::Solar => "solar",
            TrackingRate::None => "none",
        }
    }

    pub fn is_tracking(&self) -> bool {
        *self != TrackingRate::None
    }
}

/// Manual jog direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JogDirection {
    North,
    South,
    East,
    West,
}

impl JogDirection {
    fn letter(&self) -> char {
        match self {
            JogDirection::North => 'n',
            JogDirection::South => 's',
            JogDirection::East => 'e',
            JogDirection::West => 'w',
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "n" | "north" => Some(JogDirection::North),
            "s" | "south" => Some(JogDirection::South),
            "e" | "east" => Some(JogDirection::East),
            "w" | "west" => Some(JogDirection::West),
            _ => None,
        }
    }
}

/// Speed used by jog and centering moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveRate {
    Guide,
    Center,
    Slew,
}

/// How the `SG`/`GG` UTC-offset field is written on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtcOffsetEncoding {
    /// `sHH` or `sHH.H`
    Decimal,
    /// Negative offsets use the legacy keypad character table
    KeypadNegative,
}

/// Command spellings that differ between flavors
#[derive(Debug)]
pub struct FlavorTable {
    pub name: &'static str,
    pub track_sidereal: &'static str,
    pub track_lunar: &'static str,
    pub track_solar: &'static str,
    pub track_none: &'static str,
    /// Query answering `East#`/`West#`, when the controller has one
    pub pier_side_query: Option<&'static str>,
    /// `#`-terminated lines that follow the acknowledgement of a date set
    pub date_trailer_lines: usize,
    pub utc_offset: UtcOffsetEncoding,
    pub move_guide: &'static str,
    pub move_center: &'static str,
    pub move_slew: &'static str,
}

const CLASSIC_TABLE: FlavorTable = FlavorTable {
    name: "LX200",
    track_sidereal: "TQ",
    track_lunar: "TL",
    track_solar: "TS",
    track_none: "AL",
    pier_side_query: None,
    date_trailer_lines: 2,
    utc_offset: UtcOffsetEncoding::Decimal,
    move_guide: "RG",
    move_center: "RC",
    move_slew: "RS",
};

const ASTRO_PHYSICS_TABLE: FlavorTable = FlavorTable {
    name: "Astro-Physics GTO",
    track_sidereal: "RT2",
    track_lunar: "RT0",
    track_solar: "RT1",
    track_none: "RT9",
    pier_side_query: Some("pS"),
    date_trailer_lines: 1,
    utc_offset: UtcOffsetEncoding::Decimal,
    move_guide: "RG",
    move_center: "RC1",
    move_slew: "RS",
};

const ASTRO_PHYSICS_LEGACY_TABLE: FlavorTable = FlavorTable {
    name: "Astro-Physics GTO (legacy firmware)",
    utc_offset: UtcOffsetEncoding::KeypadNegative,
    ..ASTRO_PHYSICS_TABLE
};

/// Builds commands for one flavor with a default retry budget
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    flavor: ProtocolFlavor,
    retries: u32,
}

impl CommandBuilder {
    pub fn new(flavor: ProtocolFlavor, retries: u32) -> Self {
        Self { flavor, retries }
    }

    pub fn flavor(&self) -> ProtocolFlavor {
        self.flavor
    }

    pub fn table(&self) -> &'static FlavorTable {
        self.flavor.table()
    }

    fn query(&self, body: &str) -> Result<Command, ProtocolError> {
        Ok(Command::new(body, ReplyFormat::Terminated(TERMINATOR))?.with_retries(self.retries))
    }

    fn set(&self, body: String) -> Result<Command, ProtocolError> {
        Ok(Command::new(body, ReplyFormat::Ack)?.with_retries(self.retries))
    }

    fn fire(&self, body: &str) -> Result<Command, ProtocolError> {
        Ok(Command::new(body, ReplyFormat::None)?.with_retries(self.retries))
    }

    pub fn get_ra(&self) -> Result<Command, ProtocolError> {
        self.query("GR")
    }

    pub fn get_dec(&self) -> Result<Command, ProtocolError> {
        self.query("GD")
    }

    pub fn set_target_ra(&self, ra_deg: f64) -> Result<Command, ProtocolError> {
        self.set(format!("Sr{}", encode_ra(ra_deg)))
    }

    pub fn set_target_dec(&self, dec_deg: f64) -> Result<Command, ProtocolError> {
        self.set(format!("Sd{}", encode_dec(dec_deg)))
    }

    /// `MS` answers a single `'0'` when accepted, otherwise a non-zero byte
    /// followed by a `#`-terminated message. Never resent automatically.
    pub fn start_slew(&self) -> Result<Command, ProtocolError> {
        Command::new("MS", ReplyFormat::Fixed(1))
    }

    /// Sync to the last target; replies with a `#`-terminated string
    pub fn sync(&self) -> Result<Command, ProtocolError> {
        Command::new("CM", ReplyFormat::Terminated(TERMINATOR))
    }

    pub fn stop(&self) -> Result<Command, ProtocolError> {
        self.fire("Q")
    }

    pub fn tracking(&self, rate: TrackingRate) -> Result<Command, ProtocolError> {
        let table = self.table();
        let body = match rate {
            TrackingRate::Sidereal => table.track_sidereal,
            TrackingRate::Lunar => table.track_lunar,
            TrackingRate::Solar => table.track_solar,
            TrackingRate::None => table.track_none,
        };
        self.fire(body)
    }

    pub fn get_sidereal_time(&self) -> Result<Command, ProtocolError> {
        self.query("GS")
    }

    pub fn set_local_time(&self, time: NaiveTime) -> Result<Command, ProtocolError> {
        self.set(format!("SL{}", encode_time(time)))
    }

    pub fn set_date(&self, date: NaiveDate) -> Result<Command, ProtocolError> {
        self.set(format!("SC{}", encode_date(date)))
    }

    /// `wire` is the already-encoded offset field (see `vendor::utc_offset`)
    pub fn set_utc_offset(&self, wire: &str) -> Result<Command, ProtocolError> {
        self.set(format!("SG{wire}"))
    }

    pub fn get_utc_offset(&self) -> Result<Command, ProtocolError> {
        self.query("GG")
    }

    pub fn set_latitude(&self, lat_deg: f64) -> Result<Command, ProtocolError> {
        self.set(format!("St{}", encode_latitude(lat_deg)))
    }

    pub fn set_longitude(&self, east_lon_deg: f64) -> Result<Command, ProtocolError> {
        self.set(format!("Sg{}", encode_longitude(east_lon_deg)))
    }

    pub fn pier_side(&self) -> Result<Option<Command>, ProtocolError> {
        self.table().pier_side_query.map(|q| self.query(q)).transpose()
    }

    pub fn jog(&self, direction: JogDirection) -> Result<Command, ProtocolError> {
        self.fire(&format!("M{}", direction.letter()))
    }

    pub fn stop_jog(&self, direction: JogDirection) -> Result<Command, ProtocolError> {
        self.fire(&format!("Q{}", direction.letter()))
    }

    pub fn move_rate(&self, rate: MoveRate) -> Result<Command, ProtocolError> {
        let table = self.table();
        self.fire(match rate {
            MoveRate::Guide => table.move_guide,
            MoveRate::Center => table.move_center,
            MoveRate::Slew => table.move_slew,
        })
    }

    /// Toggle between short and long coordinate precision
    pub fn toggle_precision(&self) -> Result<Command, ProtocolError> {
        Command::new("U", ReplyFormat::None)
    }
}
