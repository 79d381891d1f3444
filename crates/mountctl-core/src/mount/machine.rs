//! Motion state machine
//!
//! Owns the mount's position and state. Every transition that moves the
//! mount goes through here: slews, park, home, jogs and aborts. Progress is
//! driven by [`MotionStateMachine::tick`], called once per scheduling cycle
//! by the owner; nothing in here blocks for the duration of a slew.
//!
//! The collision predictor is consulted before any slew command reaches the
//! wire and again on every tick while the mount moves or tracks.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{AxisSide, MountError, MountEvent, MountState};
use crate::astro::{
    angular_difference, hour_angle, local_sidereal_degrees, Clock, HorizontalPosition, Position,
};
use crate::collision::{CollisionPredictor, CollisionReport, CollisionVerdict};
use crate::config::{AxisTarget, MotionConfig, MountConfig};
use crate::logging::LogContext;
use crate::protocol::{
    codec, CommandBuilder, CommandChannel, JogDirection, MoveRate, ProtocolError, ReplyFormat,
    TrackingRate, TERMINATOR,
};

/// What a slew ends in once it arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlewGoal {
    Track,
    Park,
    Home,
}

/// Non-blocking slew, park, home and jog control for one mount.
///
/// Nothing here waits on the controller beyond a single reply; callers drive
/// progress with [`MotionStateMachine::tick`].
pub struct MotionStateMachine {
    commands: CommandBuilder,
    predictor: CollisionPredictor,
    clock: Arc<dyn Clock>,
    motion: MotionConfig,
    park: AxisTarget,
    home: AxisTarget,

    state: MountState,
    position: Position,
    target: Option<Position>,
    goal: Option<SlewGoal>,
    deadline: Option<DateTime<Utc>>,

    tracking: TrackingRate,
    preferred_rate: TrackingRate,
    /// Hour angle where the mount came to rest; the physical axis side is
    /// derived from it
    settled_ha: Option<f64>,
    /// Hour angle recorded when tracking stopped, for drift detection
    reference_ha: Option<f64>,
    jogging: Option<JogDirection>,

    last_verdict: CollisionVerdict,
    transition_while_tracking: bool,
    safety_override: bool,
    abort_pending: bool,
    consecutive_failures: u32,
    block_reason: Option<String>,
    sync_disabled: bool,
    parked: bool,
    last_error: Option<String>,

    log: LogContext,
}

impl MotionStateMachine {
    pub fn new(config: &MountConfig, clock: Arc<dyn Clock>, log: &LogContext) -> Self {
        let predictor =
            CollisionPredictor::new(config.geometry.clone(), config.observatory.observer())
                .with_meridian_margin(config.motion.meridian_margin_deg);
        Self {
            commands: CommandBuilder::new(config.flavor, config.connection.max_retries),
            predictor,
            clock,
            motion: config.motion.clone(),
            park: config.park,
            home: config.home,
            state: MountState::Idle,
            position: Position::new(0.0, 0.0),
            target: None,
            goal: None,
            deadline: None,
            tracking: TrackingRate::None,
            preferred_rate: TrackingRate::Sidereal,
            settled_ha: None,
            reference_ha: None,
            jogging: None,
            last_verdict: CollisionVerdict::NoCollision,
            transition_while_tracking: false,
            safety_override: false,
            abort_pending: false,
            consecutive_failures: 0,
            block_reason: None,
            sync_disabled: false,
            parked: false,
            last_error: None,
            log: log.child("motion"),
        }
    }

    /// Current motion state
    pub fn state(&self) -> MountState {
        self.state
    }

    /// Last position read from the controller
    pub fn position(&self) -> Position {
        self.position
    }

    /// Target of the slew in progress, if any
    pub fn target(&self) -> Option<Position> {
        self.target
    }

    /// Tracking rate last commanded
    pub fn tracking(&self) -> TrackingRate {
        self.tracking
    }

    /// Direction of the jog in progress
    pub fn jogging(&self) -> Option<JogDirection> {
        self.jogging
    }

    /// Command builder for the configured flavor
    pub fn commands(&self) -> &CommandBuilder {
        &self.commands
    }

    pub fn predictor(&self) -> &CollisionPredictor {
        &self.predictor
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Local sidereal time in degrees
    pub fn lst(&self) -> f64 {
        local_sidereal_degrees(self.clock.now(), self.predictor.observer().longitude)
    }

    /// Hour angle of the last read position, in degrees
    pub fn hour_angle(&self) -> f64 {
        hour_angle(self.lst(), self.position.ra())
    }

    /// Altitude and azimuth of the last read position
    pub fn horizontal(&self) -> HorizontalPosition {
        HorizontalPosition::from_equatorial(&self.position, self.predictor.observer(), self.lst())
    }

    /// Side the declination axis is physically on.
    ///
    /// Derived from the hour angle where the mount last came to rest, so a
    /// mount that tracks across the meridian keeps its side until it slews.
    pub fn axis_side(&self) -> AxisSide {
        let ha = self.settled_ha.unwrap_or_else(|| self.hour_angle());
        AxisSide::from_hour_angle(ha, None)
    }

    /// Verdict of the most recent live collision check
    pub fn last_verdict(&self) -> CollisionVerdict {
        self.last_verdict
    }

    /// True once tracking has carried the mount across the meridian
    pub fn transition_while_tracking(&self) -> bool {
        self.transition_while_tracking
    }

    /// Operator has seen the meridian transition
    pub fn clear_transition_flag(&mut self) {
        self.transition_while_tracking = false;
    }

    pub fn safety_override(&self) -> bool {
        self.safety_override
    }

    /// True while a stop command is waiting to be resent
    pub fn abort_pending(&self) -> bool {
        self.abort_pending
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_blocked(&self) -> bool {
        self.state == MountState::Blocked
    }

    /// Why motion is blocked
    pub fn block_reason(&self) -> Option<&str> {
        self.block_reason.as_deref()
    }

    /// True after a sync landed on the wrong pier side
    pub fn sync_disabled(&self) -> bool {
        self.sync_disabled
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    /// Message of the last failed operation
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Configured park pointing
    pub fn park_target(&self) -> AxisTarget {
        self.park
    }

    /// Read RA and Dec from the controller
    pub fn read_position(&mut self, channel: &mut CommandChannel) -> Result<Position, MountError> {
        let ra = channel.query(&self.commands.get_ra()?, codec::decode_ra)?;
        let dec = channel.query(&self.commands.get_dec()?, codec::decode_dec)?;
        self.position = Position::new(ra, dec);
        Ok(self.position)
    }

    fn check_can_move(&self) -> Result<(), MountError> {
        if self.state == MountState::Blocked {
            return Err(MountError::Blocked(
                self.block_reason
                    .clone()
                    .unwrap_or_else(|| "operator acknowledgement required".to_string()),
            ));
        }
        if self.state.is_moving() {
            return Err(MountError::AlreadySlewing);
        }
        Ok(())
    }

    /// Horizon and collision checks. Performs no I/O.
    fn check_target(&mut self, target: &Position, lst: f64) -> Result<CollisionReport, MountError> {
        let horizontal =
            HorizontalPosition::from_equatorial(target, self.predictor.observer(), lst);
        if !horizontal.is_above(self.motion.horizon_limit_deg) {
            warn!(target = %target, altitude = horizontal.altitude, "target below horizon limit");
            return Err(MountError::BelowHorizon {
                altitude: horizontal.altitude,
            });
        }

        let ha = hour_angle(lst, target.ra());
        let report = self
            .predictor
            .predict_hour_angle(ha, target.dec(), Some(self.axis_side()));
        self.last_verdict = report.verdict;

        match report.verdict {
            CollisionVerdict::Colliding if self.safety_override => {
                error!(target = %target, side = %report.side, "collision predicted, safety override active");
            }
            CollisionVerdict::Colliding => {
                warn!(target = %target, side = %report.side, ha, "slew refused: pier collision predicted");
                let err = MountError::Collision {
                    verdict: report.verdict,
                    side: report.side,
                };
                self.last_error = Some(err.to_string());
                return Err(err);
            }
            verdict if verdict.is_warning() => {
                warn!(target = %target, %verdict, "target inside pier danger zone");
            }
            _ => debug!(target = %target, side = %report.side, "collision check passed"),
        }
        Ok(report)
    }

    /// Start a slew that ends tracking at `target`
    pub fn start_slew(
        &mut self,
        channel: &mut CommandChannel,
        target: Position,
    ) -> Result<(), MountError> {
        let _span = self.log.enter();
        self.check_can_move()?;
        let lst = self.lst();
        self.check_target(&target, lst)?;
        self.begin_slew(channel, target, SlewGoal::Track)
    }

    /// Slew to the configured park position, then stop
    pub fn start_park(&mut self, channel: &mut CommandChannel) -> Result<(), MountError> {
        let _span = self.log.enter();
        self.check_can_move()?;
        let lst = self.lst();
        let target = Position::new(lst - self.park.hour_angle, self.park.declination);
        self.check_target(&target, lst)?;
        info!(target = %target, "parking");
        self.begin_slew(channel, target, SlewGoal::Park)
    }

    /// Slew to the configured home position, then stop
    pub fn home(&mut self, channel: &mut CommandChannel) -> Result<(), MountError> {
        let _span = self.log.enter();
        self.check_can_move()?;
        let lst = self.lst();
        let target = Position::new(lst - self.home.hour_angle, self.home.declination);
        self.check_target(&target, lst)?;
        info!(target = %target, "homing");
        self.begin_slew(channel, target, SlewGoal::Home)
    }

    fn begin_slew(
        &mut self,
        channel: &mut CommandChannel,
        target: Position,
        goal: SlewGoal,
    ) -> Result<(), MountError> {
        if let Some(direction) = self.jogging.take() {
            channel.send(&self.commands.stop_jog(direction)?)?;
        }

        if let Err(e) = self.send_slew(channel, &target) {
            self.note_failure(channel, &e);
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        self.target = Some(target);
        self.goal = Some(goal);
        self.deadline = Some(self.clock.now() + Duration::seconds(self.motion.slew_timeout_secs as i64));
        self.state = if goal == SlewGoal::Park {
            MountState::Parking
        } else {
            MountState::Slewing
        };
        self.parked = false;
        self.settled_ha = None;
        self.reference_ha = None;
        self.transition_while_tracking = false;
        self.consecutive_failures = 0;
        info!(target = %target, ?goal, "slew started");
        Ok(())
    }

    fn send_slew(&mut self, channel: &mut CommandChannel, target: &Position) -> Result<(), MountError> {
        channel.transact(&self.commands.set_target_ra(target.ra())?)?;
        channel.transact(&self.commands.set_target_dec(target.dec())?)?;
        let reply = channel.transact(&self.commands.start_slew()?)?;
        if reply != "0" {
            let message = match channel.read_reply(ReplyFormat::Terminated(TERMINATOR)) {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "slew rejection message missing");
                    String::new()
                }
            };
            let message = message.trim().to_string();
            warn!(reply = %reply, message = %message, "controller rejected slew");
            return Err(MountError::SlewRejected(if message.is_empty() {
                format!("code {reply}")
            } else {
                message
            }));
        }
        Ok(())
    }

    /// Stop everything. Always succeeds from the caller's point of view: a
    /// failed write is logged and retried on the following ticks.
    pub fn abort_any_motion(&mut self, channel: &mut CommandChannel) {
        let _span = self.log.enter();
        let previous = self.state;
        if previous != MountState::Blocked {
            self.state = MountState::Aborting;
        }
        warn!(state = %previous, "aborting all motion");

        match self.send_stop(channel) {
            Ok(()) => self.abort_pending = false,
            Err(e) => {
                error!(error = %e, "stop not delivered, will retry");
                self.abort_pending = true;
            }
        }

        self.jogging = None;
        self.target = None;
        self.goal = None;
        self.deadline = None;
        self.tracking = TrackingRate::None;
        self.reference_ha = None;
        if previous != MountState::Blocked {
            self.state = MountState::Idle;
        }
    }

    fn send_stop(&mut self, channel: &mut CommandChannel) -> Result<(), ProtocolError> {
        let stop = self.commands.stop()?;
        let tracking_off = self.commands.tracking(TrackingRate::None)?;
        let halted = channel.send(&stop);
        let untracked = channel.send(&tracking_off);
        halted.and(untracked)
    }

    /// Start a manual move in `direction` at the current move rate
    pub fn jog(
        &mut self,
        channel: &mut CommandChannel,
        direction: JogDirection,
    ) -> Result<(), MountError> {
        let _span = self.log.enter();
        self.check_can_move()?;
        if let Some(active) = self.jogging {
            if active != direction {
                channel.send(&self.commands.stop_jog(active)?)?;
            }
        }
        channel.send(&self.commands.jog(direction)?)?;
        self.jogging = Some(direction);
        self.parked = false;
        debug!(?direction, "jog started");
        Ok(())
    }

    /// End a manual move. A failed stop escalates to a full abort.
    pub fn stop_jog(&mut self, channel: &mut CommandChannel) -> Result<(), MountError> {
        let _span = self.log.enter();
        let Some(direction) = self.jogging else {
            return Ok(());
        };
        let sent = self
            .commands
            .stop_jog(direction)
            .and_then(|cmd| channel.send(&cmd));
        if let Err(e) = sent {
            self.abort_any_motion(channel);
            return Err(e.into());
        }
        self.jogging = None;
        self.reference_ha = None;
        Ok(())
    }

    /// Select the speed used by subsequent jogs
    pub fn set_move_rate(
        &mut self,
        channel: &mut CommandChannel,
        rate: MoveRate,
    ) -> Result<(), MountError> {
        channel.send(&self.commands.move_rate(rate)?)?;
        Ok(())
    }

    /// Let `Colliding` verdicts through. Operator use only.
    pub fn set_safety_override(&mut self, enabled: bool) {
        let _span = self.log.enter();
        if enabled {
            warn!("collision safety override enabled");
        } else {
            info!("collision safety override disabled");
        }
        self.safety_override = enabled;
    }

    /// Operator acknowledgement that clears `Blocked`
    pub fn acknowledge_block(&mut self) {
        let _span = self.log.enter();
        if self.state == MountState::Blocked {
            info!(reason = ?self.block_reason, "block acknowledged");
            self.state = MountState::Idle;
        }
        self.block_reason = None;
        self.sync_disabled = false;
        self.consecutive_failures = 0;
    }

    pub(crate) fn block(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(reason = %reason, "mount blocked");
        self.state = MountState::Blocked;
        self.last_error = Some(reason.clone());
        self.block_reason = Some(reason);
    }

    pub(crate) fn disable_sync(&mut self, reason: impl Into<String>) {
        self.sync_disabled = true;
        self.block(reason);
    }

    pub(crate) fn set_last_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// The controller now believes it points at `position`
    pub(crate) fn record_sync(&mut self, position: Position) {
        self.position = position;
        self.settled_ha = Some(self.hour_angle());
        self.reference_ha = None;
        self.transition_while_tracking = false;
        self.parked = false;
    }

    /// The controller's tracking rate was changed to `rate`
    pub(crate) fn record_tracking(&mut self, rate: TrackingRate) {
        self.tracking = rate;
        if rate.is_tracking() {
            self.preferred_rate = rate;
            self.reference_ha = None;
            if self.settled_ha.is_none() {
                self.settled_ha = Some(self.hour_angle());
            }
            if self.state == MountState::Idle {
                self.state = MountState::Tracking;
            }
            self.parked = false;
        } else {
            self.reference_ha = Some(self.hour_angle());
            if self.state == MountState::Tracking {
                self.state = MountState::Idle;
            }
        }
    }

    /// Record a verified park position found at startup
    pub(crate) fn record_parked(&mut self) {
        self.parked = true;
        self.settled_ha = Some(self.hour_angle());
        self.tracking = TrackingRate::None;
        self.reference_ha = self.settled_ha;
    }

    /// Guard for operations that must not interrupt motion
    pub(crate) fn ensure_not_moving(&self) -> Result<(), MountError> {
        self.check_can_move()
    }

    fn note_failure(&mut self, channel: &mut CommandChannel, err: &MountError) {
        let MountError::Protocol(e) = err else {
            return;
        };
        if !(e.is_hardware() || e.is_framing() || matches!(e, ProtocolError::Timeout)) {
            return;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        warn!(
            failures = self.consecutive_failures,
            limit = self.motion.max_consecutive_failures,
            error = %e,
            "communication failure"
        );
        if self.consecutive_failures >= self.motion.max_consecutive_failures
            && self.state != MountState::Blocked
        {
            self.abort_any_motion(channel);
            self.block(format!(
                "{} consecutive communication failures, last: {e}",
                self.consecutive_failures
            ));
        }
    }

    /// Advance the state machine by one polling cycle
    pub fn tick(&mut self, channel: &mut CommandChannel) -> Result<Vec<MountEvent>, MountError> {
        let _span = self.log.enter();
        let mut events = Vec::new();

        if self.abort_pending {
            match self.send_stop(channel) {
                Ok(()) => {
                    info!("pending stop delivered");
                    self.abort_pending = false;
                    events.push(MountEvent::AbortRetried);
                }
                Err(e) => warn!(error = %e, "pending stop still not delivered"),
            }
        }

        let position = match self.read_position(channel) {
            Ok(position) => {
                self.consecutive_failures = 0;
                position
            }
            Err(e) => {
                self.note_failure(channel, &e);
                return Err(e);
            }
        };
        let ha = self.hour_angle();

        match self.state {
            MountState::Slewing | MountState::Parking => {
                self.poll_slew(channel, position, ha, &mut events)?
            }
            MountState::Tracking => self.poll_tracking(channel, position, ha, &mut events),
            MountState::Idle => self.poll_idle(channel, position, ha, &mut events),
            MountState::Aborting | MountState::Blocked => {}
        }
        Ok(events)
    }

    /// Re-run the predictor for the live position; aborts on `Colliding`
    fn live_check(
        &mut self,
        channel: &mut CommandChannel,
        report: CollisionReport,
        events: &mut Vec<MountEvent>,
    ) -> bool {
        if report.verdict != self.last_verdict {
            if report.verdict.is_warning() {
                warn!(verdict = %report.verdict, ha = report.hour_angle, "entered pier danger zone");
            } else {
                debug!(verdict = %report.verdict, "collision verdict changed");
            }
        }
        self.last_verdict = report.verdict;

        if !report.is_colliding() {
            return false;
        }
        if self.safety_override {
            error!(ha = report.hour_angle, "collision predicted, safety override active");
            return false;
        }
        error!(ha = report.hour_angle, side = %report.side, "pier collision imminent, stopping");
        self.abort_any_motion(channel);
        self.last_error = Some(format!(
            "motion stopped: {} on the {} side",
            report.verdict, report.side
        ));
        events.push(MountEvent::CollisionAbort {
            verdict: report.verdict,
        });
        true
    }

    fn poll_slew(
        &mut self,
        channel: &mut CommandChannel,
        position: Position,
        ha: f64,
        events: &mut Vec<MountEvent>,
    ) -> Result<(), MountError> {
        let Some(target) = self.target else {
            self.state = MountState::Idle;
            return Ok(());
        };

        let report = self
            .predictor
            .predict_hour_angle(ha, position.dec(), Some(self.axis_side()));
        if self.live_check(channel, report, events) {
            return Ok(());
        }

        if position.within(&target, self.motion.arrival_tolerance_deg) {
            return self.arrive(channel, position, ha, events);
        }

        let expired = self.deadline.is_some_and(|d| self.clock.now() > d);
        if expired {
            warn!(target = %target, position = %position, "slew timed out");
            self.abort_any_motion(channel);
            let err = MountError::SlewTimeout;
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        debug!(position = %position, target = %target, "slewing");
        Ok(())
    }

    fn arrive(
        &mut self,
        channel: &mut CommandChannel,
        position: Position,
        ha: f64,
        events: &mut Vec<MountEvent>,
    ) -> Result<(), MountError> {
        let goal = self.goal.take().unwrap_or(SlewGoal::Track);
        self.target = None;
        self.deadline = None;
        self.settled_ha = Some(ha);
        self.transition_while_tracking = false;

        match goal {
            SlewGoal::Track => {
                let rate = self.preferred_rate;
                if let Err(e) = self
                    .commands
                    .tracking(rate)
                    .and_then(|cmd| channel.send(&cmd))
                {
                    let err = MountError::from(e);
                    self.note_failure(channel, &err);
                    self.state = MountState::Idle;
                    self.tracking = TrackingRate::None;
                    return Err(err);
                }
                self.tracking = rate;
                self.state = MountState::Tracking;
                let side = self.axis_side();
                info!(position = %position, %side, rate = rate.name(), "slew complete, tracking");
                events.push(MountEvent::SlewCompleted { position, side });
            }
            SlewGoal::Park | SlewGoal::Home => {
                if let Err(e) = self.send_stop(channel) {
                    error!(error = %e, "stop after park not delivered, will retry");
                    self.abort_pending = true;
                }
                self.tracking = TrackingRate::None;
                self.reference_ha = Some(ha);
                self.state = MountState::Idle;
                if goal == SlewGoal::Park {
                    self.parked = true;
                    info!(position = %position, "parked");
                    events.push(MountEvent::Parked);
                } else {
                    info!(position = %position, "homed");
                    events.push(MountEvent::Homed);
                }
            }
        }
        Ok(())
    }

    fn poll_tracking(
        &mut self,
        channel: &mut CommandChannel,
        position: Position,
        ha: f64,
        events: &mut Vec<MountEvent>,
    ) {
        let side = self.axis_side();
        let report = self.predictor.predict_on_side(side, ha, position.dec());
        if self.live_check(channel, report, events) {
            return;
        }

        let derived = AxisSide::from_hour_angle(ha, Some(side));
        if derived != side && !self.transition_while_tracking {
            warn!(from = %side, to = %derived, ha, "meridian crossed while tracking");
            self.transition_while_tracking = true;
            events.push(MountEvent::MeridianTransition {
                from: side,
                to: derived,
            });
        }
    }

    fn poll_idle(
        &mut self,
        channel: &mut CommandChannel,
        position: Position,
        ha: f64,
        events: &mut Vec<MountEvent>,
    ) {
        if self.jogging.is_some() {
            let report = self
                .predictor
                .predict_on_side(self.axis_side(), ha, position.dec());
            self.live_check(channel, report, events);
            return;
        }
        if self.tracking.is_tracking() {
            return;
        }

        match self.reference_ha {
            None => self.reference_ha = Some(ha),
            Some(reference) => {
                let drift = angular_difference(ha, reference);
                if drift > self.motion.drift_tolerance_deg {
                    warn!(drift_deg = drift, "axis moved while tracking is off");
                    events.push(MountEvent::AxisDrift { drift_deg: drift });
                    self.abort_any_motion(channel);
                    self.last_error = Some(format!("axis drift of {drift:.3}° while idle"));
                    self.reference_ha = Some(ha);
                }
            }
        }
    }

    /// Check that the mount sits where a parked mount should, blocking
    /// motion otherwise
    pub fn verify_parked_orientation(
        &mut self,
        channel: &mut CommandChannel,
        tolerance_deg: f64,
    ) -> Result<(), MountError> {
        let _span = self.log.enter();
        let position = self.read_position(channel)?;
        let ha = self.hour_angle();

        let ha_error = angular_difference(ha, self.park.hour_angle);
        let dec_error = (position.dec() - self.park.declination).abs();
        // hour angle is meaningless at the pole
        let ha_matters = self.park.declination.abs() < 90.0 - tolerance_deg;
        if dec_error > tolerance_deg || (ha_matters && ha_error > tolerance_deg) {
            let reason = format!(
                "mount at HA {ha:.2}° Dec {:.2}° is not in its park position (HA {:.2}° Dec {:.2}°)",
                position.dec(),
                self.park.hour_angle,
                self.park.declination
            );
            self.block(reason.clone());
            return Err(MountError::Blocked(reason));
        }

        if let Some(query) = self.commands.pier_side()? {
            let reported = channel.query(&query, |reply| {
                AxisSide::from_reply(reply)
                    .ok_or_else(|| ProtocolError::malformed(reply, "expected East or West"))
            })?;
            let expected = AxisSide::from_hour_angle(self.park.hour_angle, None);
            if ha_matters && reported != expected {
                let reason = format!(
                    "controller reports pier side {reported}, park position implies {expected}"
                );
                self.block(reason.clone());
                return Err(MountError::Blocked(reason));
            }
        }

        self.record_parked();
        info!(position = %position, "park orientation verified");
        Ok(())
    }
}
