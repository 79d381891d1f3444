//! Sidereal time

use chrono::{DateTime, Utc};

use super::normalize_degrees;

const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const J2000_JD: f64 = 2_451_545.0;

/// Julian day for a UTC instant
pub fn julian_day(utc: DateTime<Utc>) -> f64 {
    let seconds = utc.timestamp() as f64 + utc.timestamp_subsec_nanos() as f64 * 1e-9;
    UNIX_EPOCH_JD + seconds / 86_400.0
}

/// Greenwich mean sidereal time in degrees (IAU 1982 expression)
pub fn gmst_degrees(utc: DateTime<Utc>) -> f64 {
    let jd = julian_day(utc);
    let d = jd - J2000_JD;
    let t = d / 36_525.0;
    let gmst = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    normalize_degrees(gmst)
}

/// Local sidereal time in degrees for an east-positive longitude
pub fn local_sidereal_degrees(utc: DateTime<Utc>, longitude_deg: f64) -> f64 {
    normalize_degrees(gmst_degrees(utc) + longitude_deg)
}

/// Local sidereal time in hours
pub fn local_sidereal_hours(utc: DateTime<Utc>, longitude_deg: f64) -> f64 {
    local_sidereal_degrees(utc, longitude_deg) / 15.0
}

/// Hour angle in [0, 360): LST minus RA, measured westward
pub fn hour_angle(lst_deg: f64, ra_deg: f64) -> f64 {
    normalize_degrees(lst_deg - ra_deg)
}
