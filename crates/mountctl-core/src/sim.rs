//! Simulated LX200 controller
//!
//! [`SimulatedMount`] implements [`SerialLink`] and answers LX200 frames the
//! way a controller would, so the whole stack can run without hardware.
//! It models slews that settle over a number of position polls, tracking
//! and the sidereal drift of an untracked mount, jogging, the controller's
//! own clock (which can be skewed), firmware UTC-offset quirks and the
//! reported pier side.
//!
//! Every transmitted byte and every parsed command is recorded, and faults
//! can be injected through the [`SimHandle`]: a silent link, rejected
//! acknowledgements, garbage replies, failing writes and rejected slews.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;
use tracing::trace;

use crate::astro::{hour_angle, local_sidereal_degrees, normalize_degrees, Clock, Position};
use crate::mount::AxisSide;
use crate::protocol::codec::{
    decode_date, decode_dec, decode_latitude, decode_longitude, decode_ra, decode_time,
    encode_dec, encode_hms, encode_ra,
};
use crate::protocol::{JogDirection, ProtocolError, ProtocolFlavor, SerialLink, TrackingRate};
use crate::vendor::utc_offset;

/// Starting conditions of the simulated controller
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub flavor: ProtocolFlavor,
    /// East positive
    pub longitude: f64,
    pub latitude: f64,
    /// Initial pointing, as hour angle and declination
    pub start_ha: f64,
    pub start_dec: f64,
    /// Where a slew actually ends relative to its target (RA, Dec)
    pub settle_offset: (f64, f64),
    /// Position polls a slew takes to arrive
    pub slew_polls: u32,
    /// Degrees moved per position poll while jogging
    pub jog_step: f64,
    /// Error of the controller's clock
    pub clock_error: Duration,
    /// UTC offset field the controller starts with
    pub utc_wire: f64,
    pub long_precision: bool,
    /// Noise added to reported positions
    pub jitter_deg: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            flavor: ProtocolFlavor::default(),
            longitude: 0.0,
            latitude: 50.0,
            start_ha: 270.0,
            start_dec: 60.0,
            settle_offset: (0.0, 0.0),
            slew_polls: 2,
            jog_step: 0.5,
            clock_error: Duration::zero(),
            utc_wire: 0.0,
            long_precision: true,
            jitter_deg: 0.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slew {
    from: Position,
    to: Position,
    polls: u32,
    remaining: u32,
}

/// Where the optics point. Untracked mounts hold their hour angle, tracked
/// mounts hold their right ascension.
#[derive(Debug, Clone, Copy)]
enum Pointing {
    Fixed { ha: f64, dec: f64 },
    Tracked { ra: f64, dec: f64 },
}

#[derive(Debug)]
pub struct SimState {
    flavor: ProtocolFlavor,
    longitude: f64,
    latitude: f64,
    pointing: Pointing,
    tracking: TrackingRate,
    slew: Option<Slew>,
    jog: Option<JogDirection>,
    jog_step: f64,
    settle_offset: (f64, f64),
    slew_polls: u32,
    target_ra: Option<f64>,
    target_dec: Option<f64>,
    pier_side: AxisSide,
    clock_error: Duration,
    utc_wire: f64,
    local_time: Option<NaiveTime>,
    long_precision: bool,
    jitter_deg: f64,
    rng: StdRng,

    input: VecDeque<u8>,
    partial: Vec<u8>,
    tx: Vec<u8>,
    commands: Vec<String>,
    resyncs: usize,

    silent: bool,
    nack_next: u32,
    garbage_next: Option<Vec<u8>>,
    fail_writes: u32,
    reject_next_slew: Option<String>,
    pier_side_override: Option<AxisSide>,
    clock_locked: bool,
}

impl SimState {
    fn lst(&self, now: DateTime<Utc>) -> f64 {
        local_sidereal_degrees(now, self.longitude)
    }

    fn sky(&self, now: DateTime<Utc>) -> Position {
        match self.pointing {
            Pointing::Fixed { ha, dec } => Position::new(self.lst(now) - ha, dec),
            Pointing::Tracked { ra, dec } => Position::new(ra, dec),
        }
    }

    fn point_at(&mut self, position: Position, now: DateTime<Utc>) {
        self.pointing = if self.tracking.is_tracking() {
            Pointing::Tracked {
                ra: position.ra(),
                dec: position.dec(),
            }
        } else {
            Pointing::Fixed {
                ha: hour_angle(self.lst(now), position.ra()),
                dec: position.dec(),
            }
        };
    }

    fn set_tracking(&mut self, rate: TrackingRate, now: DateTime<Utc>) {
        let sky = self.sky(now);
        self.tracking = rate;
        self.point_at(sky, now);
    }

    fn stop(&mut self, now: DateTime<Utc>) {
        if let Some(slew) = self.slew.take() {
            let done = slew.polls - slew.remaining;
            let at = interpolate(&slew.from, &slew.to, done as f64 / slew.polls.max(1) as f64);
            self.point_at(at, now);
        }
        self.jog = None;
    }

    /// Advance motion by one position poll
    fn step(&mut self, now: DateTime<Utc>) {
        if let Some(mut slew) = self.slew.take() {
            slew.remaining = slew.remaining.saturating_sub(1);
            if slew.remaining == 0 {
                self.point_at(slew.to, now);
                let ha = hour_angle(self.lst(now), slew.to.ra());
                self.pier_side = AxisSide::from_hour_angle(ha, Some(self.pier_side));
            } else {
                let done = slew.polls - slew.remaining;
                let at = interpolate(&slew.from, &slew.to, done as f64 / slew.polls as f64);
                self.point_at(at, now);
                self.slew = Some(slew);
            }
            return;
        }
        if let Some(direction) = self.jog {
            let sky = self.sky(now);
            let (dra, ddec) = match direction {
                JogDirection::North => (0.0, self.jog_step),
                JogDirection::South => (0.0, -self.jog_step),
                JogDirection::East => (self.jog_step, 0.0),
                JogDirection::West => (-self.jog_step, 0.0),
            };
            self.point_at(Position::new(sky.ra() + dra, sky.dec() + ddec), now);
        }
    }

    fn jitter(&mut self) -> f64 {
        if self.jitter_deg > 0.0 {
            self.rng.gen_range(-self.jitter_deg..=self.jitter_deg)
        } else {
            0.0
        }
    }

    fn ack(&mut self) -> Vec<u8> {
        if self.nack_next > 0 {
            self.nack_next -= 1;
            b"0".to_vec()
        } else {
            b"1".to_vec()
        }
    }

    fn respond(&mut self, body: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let table = self.flavor.table();
        let code = body.get(..2).unwrap_or(body);
        let arg = body.get(code.len()..).unwrap_or("");

        match code {
            "GR" => {
                self.step(now);
                let ra = self.sky(now).ra() + self.jitter();
                let text = if self.long_precision {
                    encode_ra(ra)
                } else {
                    let minutes = (normalize_degrees(ra) / 15.0 * 60.0 * 10.0).round() / 10.0;
                    format!("{:02}:{:04.1}", (minutes / 60.0) as u32, minutes % 60.0)
                };
                Some(format!("{text}#").into_bytes())
            }
            "GD" => {
                let dec = self.sky(now).dec() + self.jitter();
                let text = if self.long_precision {
                    encode_dec(dec)
                } else {
                    encode_dec(dec)[..6].to_string()
                };
                Some(format!("{text}#").into_bytes())
            }
            "GS" => {
                let lst = self.lst(now + self.clock_error);
                Some(format!("{}#", encode_hms(lst / 15.0)).into_bytes())
            }
            "GG" => {
                let text = utc_offset::encode(self.utc_wire, table.utc_offset)
                    .unwrap_or_else(|_| "00".to_string());
                Some(format!("{text}#").into_bytes())
            }
            "Sr" => match decode_ra(arg) {
                Ok(ra) => {
                    self.target_ra = Some(ra);
                    Some(self.ack())
                }
                Err(_) => Some(b"0".to_vec()),
            },
            "Sd" => match decode_dec(arg) {
                Ok(dec) => {
                    self.target_dec = Some(dec);
                    Some(self.ack())
                }
                Err(_) => Some(b"0".to_vec()),
            },
            "St" => match decode_latitude(arg) {
                Ok(lat) => {
                    self.latitude = lat;
                    Some(self.ack())
                }
                Err(_) => Some(b"0".to_vec()),
            },
            "Sg" => match decode_longitude(arg) {
                Ok(lon) => {
                    let sky = self.sky(now);
                    self.longitude = lon;
                    self.point_at(sky, now);
                    Some(self.ack())
                }
                Err(_) => Some(b"0".to_vec()),
            },
            "SG" => match utc_offset::decode(arg, table.utc_offset) {
                Ok(wire) => {
                    self.utc_wire = wire;
                    Some(self.ack())
                }
                Err(_) => Some(b"0".to_vec()),
            },
            "SL" => match decode_time(arg) {
                Ok(time) => {
                    self.local_time = Some(time);
                    Some(self.ack())
                }
                Err(_) => Some(b"0".to_vec()),
            },
            "SC" => match decode_date(arg) {
                Ok(date) => {
                    if !self.clock_locked {
                        self.set_clock(date, now);
                    }
                    let mut reply = self.ack();
                    if table.date_trailer_lines >= 2 {
                        reply.extend_from_slice(b"Updating Planetary Data#");
                    }
                    if table.date_trailer_lines >= 1 {
                        reply.extend_from_slice(&[b' '; 30]);
                        reply.push(b'#');
                    }
                    Some(reply)
                }
                Err(_) => Some(b"0".to_vec()),
            },
            "MS" => {
                if let Some(message) = self.reject_next_slew.take() {
                    // empty reason: the code alone, with no message line
                    if message.is_empty() {
                        return Some(b"1".to_vec());
                    }
                    return Some(format!("1{message}#").into_bytes());
                }
                let (Some(ra), Some(dec)) = (self.target_ra, self.target_dec) else {
                    return Some(b"2No target#".to_vec());
                };
                let to = Position::new(ra + self.settle_offset.0, dec + self.settle_offset.1);
                self.jog = None;
                self.slew = Some(Slew {
                    from: self.sky(now),
                    to,
                    polls: self.slew_polls.max(1),
                    remaining: self.slew_polls.max(1),
                });
                Some(b"0".to_vec())
            }
            "CM" => {
                if let (Some(ra), Some(dec)) = (self.target_ra, self.target_dec) {
                    self.point_at(Position::new(ra, dec), now);
                }
                Some(b"Coordinates matched#".to_vec())
            }
            "pS" if table.pier_side_query.is_some() => {
                let side = self.pier_side_override.unwrap_or(self.pier_side);
                Some(format!("{}#", side.name()).into_bytes())
            }
            "Q" => {
                self.stop(now);
                None
            }
            "Qn" | "Qs" | "Qe" | "Qw" => {
                self.jog = None;
                None
            }
            "Mn" | "Ms" | "Me" | "Mw" => {
                self.jog = JogDirection::from_name(&code[1..]);
                None
            }
            "U" => {
                self.long_precision = !self.long_precision;
                None
            }
            _ => {
                if let Some(rate) = tracking_command(table, body) {
                    self.set_tracking(rate, now);
                }
                None
            }
        }
    }

    fn set_clock(&mut self, date: NaiveDate, now: DateTime<Utc>) {
        let time = self.local_time.unwrap_or_else(|| now.time());
        let local = date.and_time(time).and_utc();
        let utc = local + Duration::seconds((self.utc_wire * 3600.0).round() as i64);
        self.clock_error = utc - now;
    }
}

fn tracking_command(table: &crate::protocol::FlavorTable, body: &str) -> Option<TrackingRate> {
    [
        (table.track_sidereal, TrackingRate::Sidereal),
        (table.track_lunar, TrackingRate::Lunar),
        (table.track_solar, TrackingRate::Solar),
        (table.track_none, TrackingRate::None),
    ]
    .into_iter()
    .find(|(cmd, _)| *cmd == body)
    .map(|(_, rate)| rate)
}

fn interpolate(from: &Position, to: &Position, fraction: f64) -> Position {
    let dra = crate::astro::signed_degrees(to.ra() - from.ra());
    Position::new(
        from.ra() + dra * fraction,
        from.dec() + (to.dec() - from.dec()) * fraction,
    )
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The simulated controller, used as the serial link
pub struct SimulatedMount {
    state: Arc<Mutex<SimState>>,
    clock: Arc<dyn Clock>,
}

impl SimulatedMount {
    pub fn new(config: SimConfig, clock: Arc<dyn Clock>) -> Self {
        let state = SimState {
            flavor: config.flavor,
            longitude: config.longitude,
            latitude: config.latitude,
            pointing: Pointing::Fixed {
                ha: config.start_ha,
                dec: config.start_dec,
            },
            tracking: TrackingRate::None,
            slew: None,
            jog: None,
            jog_step: config.jog_step,
            settle_offset: config.settle_offset,
            slew_polls: config.slew_polls,
            target_ra: None,
            target_dec: None,
            pier_side: AxisSide::from_hour_angle(config.start_ha, None),
            clock_error: config.clock_error,
            utc_wire: config.utc_wire,
            local_time: None,
            long_precision: config.long_precision,
            jitter_deg: config.jitter_deg,
            rng: StdRng::seed_from_u64(config.seed),
            input: VecDeque::new(),
            partial: Vec::new(),
            tx: Vec::new(),
            commands: Vec::new(),
            resyncs: 0,
            silent: false,
            nack_next: 0,
            garbage_next: None,
            fail_writes: 0,
            reject_next_slew: None,
            pier_side_override: None,
            clock_locked: false,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
        }
    }

    /// Shared handle for inspecting and steering the simulation
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl SerialLink for SimulatedMount {
    fn write_bytes(&mut self, data: &[u8], _deadline: StdDuration) -> Result<(), ProtocolError> {
        let now = self.clock.now();
        let mut s = lock(&self.state);
        if s.fail_writes > 0 {
            s.fail_writes -= 1;
            return Err(ProtocolError::Timeout);
        }
        s.tx.extend_from_slice(data);

        for &byte in data {
            if byte != b'#' {
                s.partial.push(byte);
                continue;
            }
            let frame = std::mem::take(&mut s.partial);
            let Some(body) = frame.strip_prefix(b":") else {
                continue;
            };
            let body = String::from_utf8_lossy(body).into_owned();
            trace!(command = %body, "sim rx");
            s.commands.push(body.clone());
            let reply = s.respond(&body, now);
            if s.silent {
                continue;
            }
            let reply = match (s.garbage_next.take(), reply) {
                (Some(garbage), _) => Some(garbage),
                (None, reply) => reply,
            };
            if let Some(reply) = reply {
                s.input.extend(reply);
            }
        }
        Ok(())
    }

    fn read_byte(&mut self, _deadline: StdDuration) -> Result<Option<u8>, ProtocolError> {
        Ok(lock(&self.state).input.pop_front())
    }

    fn clear_input(&mut self) -> Result<(), ProtocolError> {
        let mut s = lock(&self.state);
        s.input.clear();
        s.resyncs += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "simulator".to_string()
    }
}

/// Inspection and fault-injection handle
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
    clock: Arc<dyn Clock>,
}

impl SimHandle {
    /// Bytes written to the controller so far
    pub fn tx_len(&self) -> usize {
        lock(&self.state).tx.len()
    }

    pub fn tx(&self) -> Vec<u8> {
        lock(&self.state).tx.clone()
    }

    /// Command bodies received so far, in order
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state).commands.clone()
    }

    pub fn clear_log(&self) {
        let mut s = lock(&self.state);
        s.tx.clear();
        s.commands.clear();
    }

    pub fn resyncs(&self) -> usize {
        lock(&self.state).resyncs
    }

    pub fn tracking(&self) -> TrackingRate {
        lock(&self.state).tracking
    }

    pub fn is_slewing(&self) -> bool {
        lock(&self.state).slew.is_some()
    }

    pub fn jog(&self) -> Option<JogDirection> {
        lock(&self.state).jog
    }

    /// True sky position at the current instant
    pub fn sky_position(&self) -> Position {
        lock(&self.state).sky(self.clock.now())
    }

    pub fn hour_angle(&self) -> f64 {
        let s = lock(&self.state);
        let now = self.clock.now();
        hour_angle(s.lst(now), s.sky(now).ra())
    }

    /// Place the mount at an hour angle and declination without a slew
    pub fn place(&self, ha: f64, dec: f64) {
        let mut s = lock(&self.state);
        s.slew = None;
        s.pointing = Pointing::Fixed { ha, dec };
        s.tracking = TrackingRate::None;
        s.pier_side = AxisSide::from_hour_angle(ha, None);
    }

    /// Longitude (east positive) the controller believes it is at
    pub fn longitude(&self) -> f64 {
        lock(&self.state).longitude
    }

    pub fn latitude(&self) -> f64 {
        lock(&self.state).latitude
    }

    pub fn utc_wire(&self) -> f64 {
        lock(&self.state).utc_wire
    }

    pub fn set_utc_wire(&self, wire: f64) {
        lock(&self.state).utc_wire = wire;
    }

    pub fn clock_error(&self) -> Duration {
        lock(&self.state).clock_error
    }

    pub fn set_clock_error(&self, error: Duration) {
        lock(&self.state).clock_error = error;
    }

    pub fn long_precision(&self) -> bool {
        lock(&self.state).long_precision
    }

    pub fn set_long_precision(&self, long: bool) {
        lock(&self.state).long_precision = long;
    }

    /// Stop answering, as if the cable were pulled
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    /// Answer the next `count` acknowledged commands with `'0'`
    pub fn nack_next(&self, count: u32) {
        lock(&self.state).nack_next = count;
    }

    /// Replace the next reply with `bytes`
    pub fn garbage_next(&self, bytes: &[u8]) {
        lock(&self.state).garbage_next = Some(bytes.to_vec());
    }

    /// Fail the next `count` writes with a timeout
    pub fn fail_writes(&self, count: u32) {
        lock(&self.state).fail_writes = count;
    }

    pub fn reject_next_slew(&self, message: &str) {
        lock(&self.state).reject_next_slew = Some(message.to_string());
    }

    /// Report this pier side regardless of the pose
    pub fn override_pier_side(&self, side: Option<AxisSide>) {
        lock(&self.state).pier_side_override = side;
    }

    /// Acknowledge date and time sets without applying them
    pub fn lock_clock(&self, locked: bool) {
        lock(&self.state).clock_locked = locked;
    }

    pub fn pier_side(&self) -> AxisSide {
        let s = lock(&self.state);
        s.pier_side_override.unwrap_or(s.pier_side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::ManualClock;

    fn sim() -> (SimulatedMount, SimHandle) {
        let clock = ManualClock::new(
            DateTime::parse_from_rfc3339("2026-03-01T22:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let mount = SimulatedMount::new(SimConfig::default(), Arc::new(clock));
        let handle = mount.handle();
        (mount, handle)
    }

    fn exchange(mount: &mut SimulatedMount, frame: &[u8]) -> Vec<u8> {
        mount.write_bytes(frame, StdDuration::ZERO).unwrap();
        let mut out = Vec::new();
        while let Some(b) = mount.read_byte(StdDuration::ZERO).unwrap() {
            out.push(b);
        }
        out
    }

    #[test]
    fn test_set_and_slew() {
        let (mut mount, handle) = sim();
        assert_eq!(exchange(&mut mount, b"#:Sr08:00:00#"), b"1");
        assert_eq!(exchange(&mut mount, b"#:Sd+45*00:00#"), b"1");
        assert_eq!(exchange(&mut mount, b"#:MS#"), b"0");
        assert!(handle.is_slewing());
        exchange(&mut mount, b"#:GR#");
        assert_eq!(exchange(&mut mount, b"#:GR#"), b"08:00:00#");
        assert!(!handle.is_slewing());
        assert_eq!(handle.commands(), vec!["Sr08:00:00", "Sd+45*00:00", "MS", "GR", "GR"]);
    }

    #[test]
    fn test_fault_injection() {
        let (mut mount, handle) = sim();
        handle.nack_next(1);
        assert_eq!(exchange(&mut mount, b"#:St+50*00#"), b"0");
        assert_eq!(exchange(&mut mount, b"#:St+50*00#"), b"1");

        handle.garbage_next(b"??#");
        assert_eq!(exchange(&mut mount, b"#:GD#"), b"??#");

        handle.set_silent(true);
        assert!(exchange(&mut mount, b"#:GR#").is_empty());
    }

    #[test]
    fn test_date_set_trailer() {
        let (mut mount, _handle) = sim();
        let reply = exchange(&mut mount, b"#:SC03/01/26#");
        assert_eq!(reply[0], b'1');
        assert_eq!(reply.iter().filter(|b| **b == b'#').count(), 1);
    }

    #[test]
    fn test_untracked_mount_holds_hour_angle() {
        let clock = ManualClock::new(Utc::now());
        let mount = SimulatedMount::new(SimConfig::default(), Arc::new(clock.clone()));
        let handle = mount.handle();
        let before = handle.sky_position();
        clock.advance(Duration::minutes(10));
        let after = handle.sky_position();
        assert!((handle.hour_angle() - 270.0).abs() < 1e-6);
        assert!(crate::astro::angular_difference(after.ra(), before.ra()) > 2.0);
    }
}
