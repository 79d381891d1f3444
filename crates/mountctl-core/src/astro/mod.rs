//! Astronomical coordinates and time
//!
//! Equatorial positions, the horizontal transform used for horizon checks,
//! and local sidereal time.

mod clock;
mod sidereal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sidereal::{gmst_degrees, hour_angle, julian_day, local_sidereal_degrees, local_sidereal_hours};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wrap an angle into [0, 360)
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle into [-180, 180)
pub fn signed_degrees(deg: f64) -> f64 {
    normalize_degrees(deg + 180.0) - 180.0
}

/// Smallest absolute difference between two angles, in degrees
pub fn angular_difference(a: f64, b: f64) -> f64 {
    signed_degrees(a - b).abs()
}

/// Equatorial position. Always normalized: RA in [0, 360), Dec in [-90, 90].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    ra: f64,
    dec: f64,
}

impl Position {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra: normalize_degrees(ra_deg),
            dec: dec_deg.clamp(-90.0, 90.0),
        }
    }

    /// Right ascension in degrees
    pub fn ra(&self) -> f64 {
        self.ra
    }

    /// Declination in degrees
    pub fn dec(&self) -> f64 {
        self.dec
    }

    pub fn set_ra(&mut self, ra_deg: f64) {
        self.ra = normalize_degrees(ra_deg);
    }

    pub fn set_dec(&mut self, dec_deg: f64) {
        self.dec = dec_deg.clamp(-90.0, 90.0);
    }

    /// Great-circle separation from `other` in degrees (haversine form,
    /// stable for small angles and at the poles)
    pub fn separation(&self, other: &Position) -> f64 {
        let (d1, d2) = (self.dec.to_radians(), other.dec.to_radians());
        let half_dd = (d2 - d1) / 2.0;
        let half_da = (other.ra - self.ra).to_radians() / 2.0;
        let h = half_dd.sin().powi(2) + d1.cos() * d2.cos() * half_da.sin().powi(2);
        (2.0 * h.sqrt().clamp(0.0, 1.0).asin()).to_degrees()
    }

    /// True when `other` lies within `tolerance` degrees on the sky
    pub fn within(&self, other: &Position, tolerance: f64) -> bool {
        self.separation(other) <= tolerance
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA {:.4}° Dec {:+.4}°", self.ra, self.dec)
    }
}

/// Observatory location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    /// Longitude in degrees, east positive
    pub longitude: f64,
    /// Latitude in degrees, north positive
    pub latitude: f64,
    /// Altitude above sea level in metres
    #[serde(default)]
    pub altitude: f64,
}

/// Altitude/azimuth. Azimuth is measured from north through east.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalPosition {
    pub altitude: f64,
    pub azimuth: f64,
}

impl HorizontalPosition {
    /// Transform an equatorial position at the given local sidereal time
    pub fn from_equatorial(position: &Position, observer: &Observer, lst_deg: f64) -> Self {
        let ha = hour_angle(lst_deg, position.ra()).to_radians();
        let dec = position.dec().to_radians();
        let lat = observer.latitude.to_radians();

        let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos();
        let altitude = sin_alt.clamp(-1.0, 1.0).asin();
        let azimuth = (-dec.cos() * ha.sin())
            .atan2(dec.sin() * lat.cos() - dec.cos() * ha.cos() * lat.sin());

        Self {
            altitude: altitude.to_degrees(),
            azimuth: normalize_degrees(azimuth.to_degrees()),
        }
    }

    pub fn is_above(&self, limit_deg: f64) -> bool {
        self.altitude >= limit_deg
    }
}
