//! Motion errors

use thiserror::Error;

use crate::collision::CollisionVerdict;
use crate::mount::AxisSide;
use crate::protocol::ProtocolError;

/// Errors surfaced by the motion state machine and the vendor layer
#[derive(Error, Debug)]
pub enum MountError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Refusing to move: predicted {verdict} on the {side} side")]
    Collision {
        verdict: CollisionVerdict,
        side: AxisSide,
    },

    #[error(
        "Controller clock still off after resynchronising (local LST {local_hours:.4}h, controller {controller_hours:.4}h)"
    )]
    ClockDrift {
        local_hours: f64,
        controller_hours: f64,
    },

    #[error("Target is below the horizon limit (altitude {altitude:.2}°)")]
    BelowHorizon { altitude: f64 },

    #[error("A slew is already in progress")]
    AlreadySlewing,

    #[error("Mount is blocked: {0}")]
    Blocked(String),

    #[error("Sync is disabled after an axis consistency failure")]
    SyncDisabled,

    #[error("Controller rejected the slew: {0}")]
    SlewRejected(String),

    #[error("Slew did not arrive before the timeout")]
    SlewTimeout,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl MountError {
    /// Safety refusals are never retried automatically
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            MountError::Collision { .. } | MountError::Blocked(_) | MountError::SyncDisabled
        )
    }
}
