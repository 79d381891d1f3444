//! Tick outcomes

use serde::Serialize;

use crate::astro::Position;
use crate::collision::CollisionVerdict;
use crate::mount::AxisSide;

/// Something that happened during a tick and that the owner may want to
/// publish or act on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MountEvent {
    /// A slew arrived and tracking was re-enabled
    SlewCompleted { position: Position, side: AxisSide },
    Parked,
    Homed,
    /// Motion was stopped because the live position would strike the pier
    CollisionAbort { verdict: CollisionVerdict },
    /// The hour angle crossed the meridian while tracking without a flip
    MeridianTransition { from: AxisSide, to: AxisSide },
    /// The hour angle moved while tracking was off
    AxisDrift { drift_deg: f64 },
    /// Controller date, time and UTC offset were resent
    ClockResynchronised { difference_hours: f64 },
    /// A stop that failed earlier finally reached the controller
    AbortRetried,
}
