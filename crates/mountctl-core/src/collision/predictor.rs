//! Collision predictor
//!
//! Pure function of (target, sidereal time, observer, geometry). No I/O and
//! no mutable state; the state machine calls it before every slew and on
//! every tick while the mount moves or tracks.

use serde::Serialize;

use super::geometry::{intersect_tube_line, AxisPose, Intersection, MountGeometry, TubeLine};
use super::CollisionVerdict;
use crate::astro::{hour_angle, Observer, Position};
use crate::mount::{meridian_distance, AxisSide};

/// Default width of the band around the meridian where both sides are checked
pub const DEFAULT_MERIDIAN_MARGIN_DEG: f64 = 5.0;

/// Verdict for one intersection of one tube line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Branch {
    pub line: TubeLine,
    pub t: f64,
    pub height: f64,
    pub verdict: CollisionVerdict,
}

/// Evaluation of one axis side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideReport {
    pub side: AxisSide,
    pub verdict: CollisionVerdict,
    pub branches: Vec<Branch>,
}

/// Full result of a prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionReport {
    /// Hour angle of the target in degrees, [0, 360)
    pub hour_angle: f64,
    /// Side the mount will be on for this target
    pub side: AxisSide,
    /// Worst verdict over every evaluated side
    pub verdict: CollisionVerdict,
    pub sides: Vec<SideReport>,
}

impl CollisionReport {
    pub fn is_colliding(&self) -> bool {
        self.verdict == CollisionVerdict::Colliding
    }
}

#[derive(Debug, Clone)]
pub struct CollisionPredictor {
    geometry: MountGeometry,
    observer: Observer,
    meridian_margin_deg: f64,
}

impl CollisionPredictor {
    pub fn new(geometry: MountGeometry, observer: Observer) -> Self {
        Self {
            geometry,
            observer,
            meridian_margin_deg: DEFAULT_MERIDIAN_MARGIN_DEG,
        }
    }

    pub fn with_meridian_margin(mut self, margin_deg: f64) -> Self {
        self.meridian_margin_deg = margin_deg.max(0.0);
        self
    }

    pub fn geometry(&self) -> &MountGeometry {
        &self.geometry
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn meridian_margin(&self) -> f64 {
        self.meridian_margin_deg
    }

    /// Predict the verdict for `target` at local sidereal time `lst_deg`.
    ///
    /// `previous` is the side the mount is currently on; it only matters
    /// when the target sits exactly on the meridian.
    pub fn predict(
        &self,
        target: &Position,
        lst_deg: f64,
        previous: Option<AxisSide>,
    ) -> CollisionReport {
        let ha = hour_angle(lst_deg, target.ra());
        self.predict_hour_angle(ha, target.dec(), previous)
    }

    /// Same as [`predict`](Self::predict) for a position given by hour angle
    pub fn predict_hour_angle(
        &self,
        ha_deg: f64,
        dec_deg: f64,
        previous: Option<AxisSide>,
    ) -> CollisionReport {
        let side = AxisSide::from_hour_angle(ha_deg, previous);
        self.predict_on_side(side, ha_deg, dec_deg)
    }

    /// Predict for a mount known to be on `side`, e.g. while tracking past
    /// the meridian without a flip
    pub fn predict_on_side(&self, side: AxisSide, ha_deg: f64, dec_deg: f64) -> CollisionReport {
        let mut sides = vec![self.evaluate_side(side, ha_deg, dec_deg)];
        if meridian_distance(ha_deg) <= self.meridian_margin_deg {
            sides.push(self.evaluate_side(side.opposite(), ha_deg, dec_deg));
        }
        let verdict = sides
            .iter()
            .map(|s| s.verdict)
            .max()
            .unwrap_or(CollisionVerdict::NoCollision);

        CollisionReport {
            hour_angle: ha_deg,
            side,
            verdict,
            sides,
        }
    }

    /// Evaluate one side for a pointing given as hour angle and declination.
    /// `dec_deg` is not clamped, so flipped declinations beyond ±90° are
    /// accepted.
    pub fn evaluate_side(&self, side: AxisSide, ha_deg: f64, dec_deg: f64) -> SideReport {
        let pose = AxisPose::for_side(side, ha_deg, dec_deg);
        self.evaluate_pose(side, &pose)
    }

    fn evaluate_pose(&self, side: AxisSide, pose: &AxisPose) -> SideReport {
        let branches: Vec<Branch> = TubeLine::ALL
            .iter()
            .flat_map(|&line| {
                intersect_tube_line(&self.geometry, self.observer.latitude, pose, line)
                    .into_iter()
                    .map(move |hit| Branch {
                        line,
                        t: hit.t,
                        height: hit.height,
                        verdict: classify(&self.geometry, &hit),
                    })
            })
            .collect();
        let verdict = branches
            .iter()
            .map(|b| b.verdict)
            .max()
            .unwrap_or(CollisionVerdict::NoCollision);
        SideReport {
            side,
            verdict,
            branches,
        }
    }
}

/// Classify one intersection against the tube length and the height bands
pub fn classify(geometry: &MountGeometry, hit: &Intersection) -> CollisionVerdict {
    if !hit.t.is_finite() || !hit.height.is_finite() {
        return CollisionVerdict::NoCollision;
    }
    if hit.t > 0.0 || hit.t < -geometry.tube_rear_length {
        return CollisionVerdict::NoCollision;
    }
    let h = hit.height;
    if h >= geometry.floor && h <= geometry.wedge {
        CollisionVerdict::Colliding
    } else if h > geometry.wedge && h <= geometry.danger_zone_above {
        CollisionVerdict::WithinDangerZoneAbove
    } else if h < geometry.floor && h >= geometry.danger_zone_below {
        CollisionVerdict::WithinDangerZoneBelow
    } else {
        CollisionVerdict::NoCollision
    }
}
