//! Mount geometry and the tube/pier intersection
//!
//! All vectors live in the equatorial frame of the mount: `x` points at the
//! intersection of meridian and celestial equator, `y` points west along the
//! equator, `z` along the polar axis. The pier is modelled as a vertical
//! cylinder whose axis passes through the origin, where the polar and
//! declination axes meet.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::mount::AxisSide;

/// Roots of the quadratic closer than this to degenerate are ignored
const EPSILON: f64 = 1e-12;

/// Fixed per-mount constants, loaded once at startup.
///
/// Lengths share one arbitrary unit (usually metres). Heights are measured
/// along the local vertical from the axis intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountGeometry {
    /// Offset of the tube's optical axis from the axis intersection:
    /// `x` along the declination axis, `y` radially away from the polar axis
    /// in the plane of the declination axis, `z` along the polar axis.
    pub dec_axis_offset: Vector3<f64>,
    pub pier_radius: f64,
    /// Half-width of the tube; the front and rear tube lines sit this far
    /// either side of the optical axis
    pub tube_radius: f64,
    /// How far the tube extends behind the declination axis
    pub tube_rear_length: f64,
    /// Lowest height at which the pier can be struck
    pub floor: f64,
    /// Highest height at which the pier can be struck
    pub wedge: f64,
    /// Upper end of the warning band above the wedge
    pub danger_zone_above: f64,
    /// Lower end of the warning band below the floor
    pub danger_zone_below: f64,
}

impl Default for MountGeometry {
    fn default() -> Self {
        Self {
            dec_axis_offset: Vector3::new(0.25, 0.0, 0.0),
            pier_radius: 0.15,
            tube_radius: 0.1,
            tube_rear_length: 0.6,
            floor: -1.5,
            wedge: -0.3,
            danger_zone_above: -0.2,
            danger_zone_below: -1.6,
        }
    }
}

impl MountGeometry {
    /// Check the constants for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        let scalars = [
            ("pier_radius", self.pier_radius),
            ("tube_radius", self.tube_radius),
            ("tube_rear_length", self.tube_rear_length),
            ("floor", self.floor),
            ("wedge", self.wedge),
            ("danger_zone_above", self.danger_zone_above),
            ("danger_zone_below", self.danger_zone_below),
        ];
        if let Some((name, _)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("{name} is not a finite number"));
        }
        if self.dec_axis_offset.iter().any(|v| !v.is_finite()) {
            return Err("dec_axis_offset is not finite".to_string());
        }
        if self.pier_radius <= 0.0 {
            return Err("pier_radius must be positive".to_string());
        }
        if self.tube_radius < 0.0 {
            return Err("tube_radius must not be negative".to_string());
        }
        if self.tube_rear_length < 0.0 {
            return Err("tube_rear_length must not be negative".to_string());
        }
        if self.floor > self.wedge {
            return Err(format!(
                "floor ({}) lies above wedge ({})",
                self.floor, self.wedge
            ));
        }
        if self.danger_zone_below > self.floor {
            return Err("danger_zone_below lies above floor".to_string());
        }
        if self.danger_zone_above < self.wedge {
            return Err("danger_zone_above lies below wedge".to_string());
        }
        Ok(())
    }
}

/// Which edge of the tube a line represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TubeLine {
    Front,
    Rear,
}

impl TubeLine {
    pub const ALL: [TubeLine; 2] = [TubeLine::Front, TubeLine::Rear];

    fn sign(&self) -> f64 {
        match self {
            TubeLine::Front => 1.0,
            TubeLine::Rear => -1.0,
        }
    }
}

/// Mechanical orientation of the two axes, in degrees.
///
/// `alpha` is the rotation of the declination axis about the polar axis and
/// `theta` the tube's angle from the equator measured through the pole, so a
/// flipped pose has `theta` beyond 90°.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisPose {
    pub alpha: f64,
    pub theta: f64,
}

impl AxisPose {
    /// Pose that points at (`ha_deg`, `dec_deg`) with the declination axis on
    /// `side`. West keeps the sky angles as they are; East rotates the polar
    /// axis half a turn and reflects the declination through the pole.
    pub fn for_side(side: AxisSide, ha_deg: f64, dec_deg: f64) -> Self {
        match side {
            AxisSide::West => Self {
                alpha: ha_deg,
                theta: dec_deg,
            },
            AxisSide::East => Self {
                alpha: ha_deg + 180.0,
                theta: 180.0 - dec_deg,
            },
        }
    }

    /// Unit vector along the optical axis
    pub fn pointing(&self) -> Vector3<f64> {
        let (sa, ca) = self.alpha.to_radians().sin_cos();
        let (st, ct) = self.theta.to_radians().sin_cos();
        Vector3::new(ct * ca, ct * sa, st)
    }

    /// Unit vector along the declination axis
    pub fn dec_axis(&self) -> Vector3<f64> {
        let (sa, ca) = self.alpha.to_radians().sin_cos();
        Vector3::new(-sa, ca, 0.0)
    }

    /// Unit vector in the equatorial plane, perpendicular to the declination axis
    pub fn radial(&self) -> Vector3<f64> {
        let (sa, ca) = self.alpha.to_radians().sin_cos();
        Vector3::new(ca, sa, 0.0)
    }
}

/// Local vertical for an observer at `latitude_deg`
pub fn zenith(latitude_deg: f64) -> Vector3<f64> {
    let (s, c) = latitude_deg.to_radians().sin_cos();
    Vector3::new(c, 0.0, s)
}

/// One point where a tube line meets the pier surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Distance along the optical axis from the declination axis;
    /// negative values lie behind it
    pub t: f64,
    /// Height of the point along the local vertical
    pub height: f64,
}

/// Intersect one tube line with the lateral surface of the pier cylinder.
///
/// Returns every real, finite root regardless of whether it lies on the
/// physical tube; callers filter by `t`. A line parallel to the pier or one
/// that misses it yields no intersections.
pub fn intersect_tube_line(
    geometry: &MountGeometry,
    latitude_deg: f64,
    pose: &AxisPose,
    line: TubeLine,
) -> Vec<Intersection> {
    let up = zenith(latitude_deg);
    let s = pose.pointing();
    let a = pose.dec_axis();
    let r = pose.radial();
    let z = Vector3::<f64>::z();

    let offset = &geometry.dec_axis_offset;
    let origin = a * (offset.x + line.sign() * geometry.tube_radius) + r * offset.y + z * offset.z;

    let perp = |v: &Vector3<f64>| v - up * v.dot(&up);
    let w0 = perp(&origin);
    let d = perp(&s);

    let qa = d.norm_squared();
    if qa < EPSILON {
        return Vec::new();
    }
    let qb = 2.0 * w0.dot(&d);
    let qc = w0.norm_squared() - geometry.pier_radius * geometry.pier_radius;
    let discriminant = qb * qb - 4.0 * qa * qc;
    if !discriminant.is_finite() || discriminant < 0.0 {
        return Vec::new();
    }

    let root = discriminant.sqrt();
    let mut roots = vec![(-qb - root) / (2.0 * qa)];
    if root > 0.0 {
        roots.push((-qb + root) / (2.0 * qa));
    }

    roots
        .into_iter()
        .filter(|t| t.is_finite())
        .map(|t| Intersection {
            t,
            height: (origin + s * t).dot(&up),
        })
        .collect()
}
