//! Wire codec
//!
//! Fixed-width sexagesimal text forms used by the LX200 command set:
//!
//! - right ascension `HH:MM:SS`
//! - declination `sDD*MM:SS`
//! - generic signed degrees `sDDD*MM:SS`
//! - site latitude `sDD*MM`, site longitude `DDD*MM` (west positive)
//! - local time `HH:MM:SS`, date `MM/DD/YY`
//!
//! Decoders reject anything that is not exactly one of these shapes with
//! [`ProtocolError::Malformed`]; a partial value is never returned.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use regex::Regex;
use std::sync::OnceLock;

use super::ProtocolError;
use crate::astro::normalize_degrees;

fn hms_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)$").expect("valid regex"))
}

fn dms_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([+-])?(\d{1,3})[*:'°ß](\d{2})(?:[:'](\d{2}(?:\.\d+)?))?$")
            .expect("valid regex")
    })
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})/(\d{2})/(\d{2})$").expect("valid regex"))
}

/// Split a magnitude into whole units, minutes and seconds, rounded to the
/// nearest second. Carries are resolved so seconds and minutes stay below 60.
fn split_seconds(magnitude: f64) -> (u64, u64, u64) {
    let total = (magnitude * 3600.0).round() as u64;
    (total / 3600, (total / 60) % 60, total % 60)
}

fn split_minutes(magnitude: f64) -> (u64, u64) {
    let total = (magnitude * 60.0).round() as u64;
    (total / 60, total % 60)
}

fn parse_field<T: std::str::FromStr>(text: &str, field: &str) -> Result<T, ProtocolError> {
    field
        .parse::<T>()
        .map_err(|_| ProtocolError::malformed(text, format!("non-numeric field {field:?}")))
}

/// Parse `HH:MM:SS` into decimal units (hours)
pub fn decode_hms(text: &str) -> Result<f64, ProtocolError> {
    let text = text.trim();
    let caps = hms_regex()
        .captures(text)
        .ok_or_else(|| ProtocolError::malformed(text, "expected HH:MM:SS"))?;
    let h: u32 = parse_field(text, &caps[1])?;
    let m: u32 = parse_field(text, &caps[2])?;
    let s: f64 = parse_field(text, &caps[3])?;
    if m >= 60 || s >= 60.0 {
        return Err(ProtocolError::malformed(text, "minutes/seconds out of range"));
    }
    Ok(h as f64 + m as f64 / 60.0 + s / 3600.0)
}

/// Format decimal hours as `HH:MM:SS`, wrapping at 24h
pub fn encode_hms(hours: f64) -> String {
    let hours = hours.rem_euclid(24.0);
    let (mut h, m, s) = split_seconds(hours);
    if h >= 24 {
        h -= 24;
    }
    format!("{h:02}:{m:02}:{s:02}")
}

/// Encode right ascension (degrees) as `HH:MM:SS`
pub fn encode_ra(ra_deg: f64) -> String {
    encode_hms(normalize_degrees(ra_deg) / 15.0)
}

/// Decode `HH:MM:SS` right ascension into degrees
pub fn decode_ra(text: &str) -> Result<f64, ProtocolError> {
    let hours = decode_hms(text)?;
    if hours >= 24.0 {
        return Err(ProtocolError::malformed(text, "hours out of range"));
    }
    Ok(hours * 15.0)
}

/// Encode a signed angle as `sD*MM:SS` with `width` zero-padded degree digits
pub fn encode_signed_dms(deg: f64, width: usize) -> String {
    let sign = if deg < 0.0 { '-' } else { '+' };
    let (d, m, s) = split_seconds(deg.abs());
    format!("{sign}{d:0width$}*{m:02}:{s:02}")
}

/// Decode a signed sexagesimal angle. The sign character is mandatory; with
/// `require_seconds` the seconds field must be present too (long precision
/// replies).
pub fn decode_signed_dms(text: &str, require_seconds: bool) -> Result<f64, ProtocolError> {
    decode_dms(text, true, require_seconds)
}

fn decode_dms(text: &str, require_sign: bool, require_seconds: bool) -> Result<f64, ProtocolError> {
    let text = text.trim();
    let caps = dms_regex()
        .captures(text)
        .ok_or_else(|| ProtocolError::malformed(text, "expected sDD*MM:SS"))?;
    if require_sign && caps.get(1).is_none() {
        return Err(ProtocolError::malformed(text, "missing sign"));
    }
    let negative = caps.get(1).map(|m| m.as_str() == "-").unwrap_or(false);
    let d: u32 = parse_field(text, &caps[2])?;
    let m: u32 = parse_field(text, &caps[3])?;
    let s: f64 = match caps.get(4) {
        Some(sec) => parse_field(text, sec.as_str())?,
        None if require_seconds => {
            return Err(ProtocolError::malformed(text, "missing seconds field"))
        }
        None => 0.0,
    };
    if m >= 60 || s >= 60.0 {
        return Err(ProtocolError::malformed(text, "minutes/seconds out of range"));
    }
    let magnitude = d as f64 + m as f64 / 60.0 + s / 3600.0;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Encode declination as `sDD*MM:SS`, clamped to ±90°
pub fn encode_dec(dec_deg: f64) -> String {
    encode_signed_dms(dec_deg.clamp(-90.0, 90.0), 2)
}

/// Decode declination `sDD*MM:SS`
pub fn decode_dec(text: &str) -> Result<f64, ProtocolError> {
    let dec = decode_signed_dms(text, true)?;
    if dec.abs() > 90.0 {
        return Err(ProtocolError::malformed(text, "declination out of range"));
    }
    Ok(dec)
}

/// Encode an arbitrary signed angle as `sDDD*MM:SS`
pub fn encode_degrees(deg: f64) -> String {
    encode_signed_dms(deg, 3)
}

/// Decode `sDDD*MM:SS`
pub fn decode_degrees(text: &str) -> Result<f64, ProtocolError> {
    decode_signed_dms(text, true)
}

/// Encode site latitude as `sDD*MM`
pub fn encode_latitude(lat_deg: f64) -> String {
    let sign = if lat_deg < 0.0 { '-' } else { '+' };
    let (d, m) = split_minutes(lat_deg.abs().min(90.0));
    format!("{sign}{d:02}*{m:02}")
}

pub fn decode_latitude(text: &str) -> Result<f64, ProtocolError> {
    let lat = decode_dms(text, false, false)?;
    if lat.abs() > 90.0 {
        return Err(ProtocolError::malformed(text, "latitude out of range"));
    }
    Ok(lat)
}

/// Encode an east-positive longitude in the LX200 west-positive `DDD*MM` form
pub fn encode_longitude(east_lon_deg: f64) -> String {
    let west = normalize_degrees(-east_lon_deg);
    let (mut d, m) = split_minutes(west);
    if d >= 360 {
        d -= 360;
    }
    format!("{d:03}*{m:02}")
}

/// Decode LX200 `DDD*MM` (west positive) into an east-positive longitude in
/// (-180, 180]
pub fn decode_longitude(text: &str) -> Result<f64, ProtocolError> {
    let west = decode_dms(text, false, false)?;
    if !(0.0..360.0).contains(&west) {
        return Err(ProtocolError::malformed(text, "longitude out of range"));
    }
    let east = -west;
    Ok(if east <= -180.0 { east + 360.0 } else { east })
}

/// Encode local time of day as `HH:MM:SS`
pub fn encode_time(time: NaiveTime) -> String {
    format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second())
}

pub fn decode_time(text: &str) -> Result<NaiveTime, ProtocolError> {
    let text = text.trim();
    let caps = hms_regex()
        .captures(text)
        .ok_or_else(|| ProtocolError::malformed(text, "expected HH:MM:SS"))?;
    let h: u32 = parse_field(text, &caps[1])?;
    let m: u32 = parse_field(text, &caps[2])?;
    let s: f64 = parse_field(text, &caps[3])?;
    NaiveTime::from_hms_opt(h, m, s.trunc() as u32)
        .ok_or_else(|| ProtocolError::malformed(text, "invalid time of day"))
}

/// Encode a calendar date as `MM/DD/YY`
pub fn encode_date(date: NaiveDate) -> String {
    format!(
        "{:02}/{:02}/{:02}",
        date.month(),
        date.day(),
        date.year().rem_euclid(100)
    )
}

/// Decode `MM/DD/YY`. Two-digit years map onto 2000-2099.
pub fn decode_date(text: &str) -> Result<NaiveDate, ProtocolError> {
    let text = text.trim();
    let caps = date_regex()
        .captures(text)
        .ok_or_else(|| ProtocolError::malformed(text, "expected MM/DD/YY"))?;
    let month: u32 = parse_field(text, &caps[1])?;
    let day: u32 = parse_field(text, &caps[2])?;
    let year: i32 = parse_field(text, &caps[3])?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
        .ok_or_else(|| ProtocolError::malformed(text, "invalid calendar date"))
}
