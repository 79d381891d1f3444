//! Pier collision prediction for German-equatorial mounts
//!
//! Maps a target position, the observer and the mount geometry to a
//! [`CollisionVerdict`]. See [`geometry`] for the frame and the intersection
//! math, [`predictor`] for the side selection and verdict combination.

pub mod geometry;
pub mod predictor;

pub use geometry::{intersect_tube_line, AxisPose, Intersection, MountGeometry, TubeLine};
pub use predictor::{
    classify, Branch, CollisionPredictor, CollisionReport, SideReport,
    DEFAULT_MERIDIAN_MARGIN_DEG,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a collision check, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionVerdict {
    NoCollision,
    WithinDangerZoneBelow,
    WithinDangerZoneAbove,
    Colliding,
}

impl CollisionVerdict {
    pub fn name(&self) -> &'static str {
        match self {
            CollisionVerdict::NoCollision => "no collision",
            CollisionVerdict::WithinDangerZoneBelow => "within danger zone below",
            CollisionVerdict::WithinDangerZoneAbove => "within danger zone above",
            CollisionVerdict::Colliding => "colliding",
        }
    }

    /// Danger-zone verdicts are reported but do not stop motion
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            CollisionVerdict::WithinDangerZoneBelow | CollisionVerdict::WithinDangerZoneAbove
        )
    }
}

impl fmt::Display for CollisionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
