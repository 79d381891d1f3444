//! Mount state and meridian side

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::astro::normalize_degrees;

/// Motion state owned by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    Idle,
    Slewing,
    Tracking,
    Parking,
    Aborting,
    Blocked,
}

impl MountState {
    pub fn name(&self) -> &'static str {
        match self {
            MountState::Idle => "idle",
            MountState::Slewing => "slewing",
            MountState::Tracking => "tracking",
            MountState::Parking => "parking",
            MountState::Aborting => "aborting",
            MountState::Blocked => "blocked",
        }
    }

    /// True while a commanded slew (including park and home) is in progress
    pub fn is_moving(&self) -> bool {
        matches!(self, MountState::Slewing | MountState::Parking)
    }
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Side of the meridian the declination axis points to.
///
/// Always derived from an hour angle with [`AxisSide::from_hour_angle`];
/// nothing stores a side independently of the hour angle it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisSide {
    West,
    East,
}

impl AxisSide {
    /// Resolve the side for an hour angle in degrees.
    ///
    /// Hour angles in (0, 180) give `East`, (180, 360) give `West`. Exactly on
    /// the meridian (0 or 180) the `previous` side is kept so a mount sitting
    /// on the line does not flip back and forth; without history it resolves
    /// to `West`.
    pub fn from_hour_angle(ha_deg: f64, previous: Option<AxisSide>) -> AxisSide {
        let ha = normalize_degrees(ha_deg);
        if ha > 0.0 && ha < 180.0 {
            AxisSide::East
        } else if ha > 180.0 {
            AxisSide::West
        } else {
            previous.unwrap_or(AxisSide::West)
        }
    }

    pub fn opposite(&self) -> AxisSide {
        match self {
            AxisSide::West => AxisSide::East,
            AxisSide::East => AxisSide::West,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AxisSide::West => "West",
            AxisSide::East => "East",
        }
    }

    /// Parse the `East`/`West` reply of a pier-side query
    pub fn from_reply(reply: &str) -> Option<AxisSide> {
        match reply.trim().to_ascii_lowercase().as_str() {
            "east" | "e" => Some(AxisSide::East),
            "west" | "w" => Some(AxisSide::West),
            _ => None,
        }
    }
}

impl fmt::Display for AxisSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Degrees between `ha_deg` and the nearest meridian crossing (0 or 180)
pub fn meridian_distance(ha_deg: f64) -> f64 {
    let ha = normalize_degrees(ha_deg) % 180.0;
    ha.min(180.0 - ha)
}
