//! German equatorial mount driver
//!
//! Glues the motion state machine and the vendor layer to the capability
//! interface: option handling, the startup sequence, periodic polling and
//! the named operations.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{parse_bool, Device, DeviceRuntime, Operation, ValueTable};
use crate::astro::Clock;
use crate::config::MountConfig;
use crate::mount::{MotionStateMachine, MountError, MountEvent};
use crate::protocol::{codec, CommandChannel, ProtocolError, ProtocolFlavor, TrackingRate};
use crate::vendor::VendorLayer;

pub struct GemDriver {
    config: MountConfig,
    clock: Arc<dyn Clock>,
    machine: MotionStateMachine,
    vendor: VendorLayer,
    initialised: bool,
    /// Events raised during init, handed out by the first poll
    pending: Vec<MountEvent>,
}

fn option_error(name: &str, value: &str) -> MountError {
    MountError::InvalidArgument(format!("bad value {value:?} for option {name}"))
}

impl GemDriver {
    pub fn new(config: MountConfig, clock: Arc<dyn Clock>) -> Self {
        let log = crate::logging::LogContext::disabled();
        let machine = MotionStateMachine::new(&config, Arc::clone(&clock), &log);
        let vendor = VendorLayer::new(&config, &log);
        Self {
            config,
            clock,
            machine,
            vendor,
            initialised: false,
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn machine(&self) -> &MotionStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut MotionStateMachine {
        &mut self.machine
    }

    pub fn vendor(&self) -> &VendorLayer {
        &self.vendor
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Make sure positions come back as `HH:MM:SS` / `sDD*MM:SS`. The
    /// controller toggles between short and long formats on `U`, so it is
    /// sent at most once.
    fn ensure_long_precision(&self, channel: &mut CommandChannel) -> Result<(), MountError> {
        let commands = self.machine.commands();
        let get_ra = commands.get_ra()?;
        match channel.query(&get_ra, codec::decode_ra) {
            Ok(_) => return Ok(()),
            Err(e) if e.is_framing() => debug!(error = %e, "short position format"),
            Err(e) => return Err(e.into()),
        }
        channel.send(&commands.toggle_precision()?)?;
        channel.query(&get_ra, codec::decode_ra)?;
        info!("controller switched to long precision");
        Ok(())
    }

    /// Run one caller-facing operation
    pub fn execute(
        &mut self,
        channel: &mut CommandChannel,
        op: Operation,
    ) -> Result<(), MountError> {
        debug!(?op, "operation");
        let machine = &mut self.machine;
        match op {
            Operation::Slew(target) => machine.start_slew(channel, target),
            Operation::Sync(position) => self.vendor.sync(machine, channel, position),
            Operation::SyncHa {
                hour_angle,
                declination,
            } => self.vendor.sync_ha(machine, channel, hour_angle, declination),
            Operation::Track(rate) => self.vendor.set_tracking_rate(machine, channel, rate),
            Operation::Rot(direction) => machine.jog(channel, direction),
            Operation::StopRot => machine.stop_jog(channel),
            Operation::MoveRate(rate) => machine.set_move_rate(channel, rate),
            Operation::Home => machine.home(channel),
            Operation::Park => machine.start_park(channel),
            Operation::Abort => {
                machine.abort_any_motion(channel);
                Ok(())
            }
            Operation::AcknowledgeBlock => {
                machine.acknowledge_block();
                Ok(())
            }
            Operation::SafetyOverride(enabled) => {
                machine.set_safety_override(enabled);
                Ok(())
            }
        }
    }

    /// Refresh the published values from the state machine
    pub fn publish(&self, values: &mut ValueTable) {
        let m = &self.machine;
        let position = m.position();
        let horizontal = m.horizontal();
        values.set("ra", position.ra());
        values.set("dec", position.dec());
        values.set("lst", m.lst() / 15.0);
        values.set("ha", m.hour_angle());
        values.set("alt", horizontal.altitude);
        values.set("az", horizontal.azimuth);
        values.set("state", m.state().name());
        values.set("axis_side", m.axis_side().name());
        values.set("tracking", m.tracking().is_tracking());
        values.set("tracking_rate", m.tracking().name());
        values.set("collision", m.last_verdict().name());
        values.set("transition_while_tracking", m.transition_while_tracking());
        values.set("blocked", m.is_blocked());
        values.set("sync_disabled", m.sync_disabled());
        values.set("parked", m.is_parked());
        values.set("last_error", m.last_error().unwrap_or_default().to_string());
    }
}

impl Device for GemDriver {
    fn process_option(&mut self, name: &str, value: &str) -> Result<(), MountError> {
        let value = value.trim();
        let number = || value.parse::<f64>().map_err(|_| option_error(name, value));
        match name {
            "port" => self.config.connection.port = Some(value.to_string()),
            "baud" => {
                self.config.connection.baud_rate =
                    value.parse().map_err(|_| option_error(name, value))?
            }
            "flavor" => {
                self.config.flavor =
                    ProtocolFlavor::from_name(value).ok_or_else(|| option_error(name, value))?
            }
            "latitude" => self.config.observatory.latitude = number()?,
            "longitude" => self.config.observatory.longitude = number()?,
            "utc-offset" => self.config.clock.utc_offset_hours = number()?,
            "assume-parked" => self.config.startup.assume_parked = parse_bool(name, value)?,
            _ => return Err(MountError::Unsupported(format!("unknown option {name:?}"))),
        }
        debug!(name, value, "option applied");
        Ok(())
    }

    fn init(&mut self, rt: &mut DeviceRuntime) -> Result<(), MountError> {
        self.config
            .validate()
            .map_err(|e| MountError::InvalidArgument(e.to_string()))?;
        self.machine = MotionStateMachine::new(&self.config, Arc::clone(&self.clock), &rt.log);
        self.vendor = VendorLayer::new(&self.config, &rt.log);
        self.pending.clear();

        let _span = rt.log.enter();
        info!(
            link = %rt.channel.link_name(),
            flavor = self.config.flavor.table().name,
            "initialising mount"
        );
        let channel = &mut rt.channel;
        channel.resync()?;
        self.ensure_long_precision(channel)?;
        self.vendor.push_site(&self.machine, channel)?;
        self.vendor.negotiate_utc_offset(&self.machine, channel)?;
        if let Some(event) = self.vendor.force_clock_check(&self.machine, channel)? {
            self.pending.push(event);
        }

        // start untracked so that axis drift is measured from here
        channel.send(&self.machine.commands().tracking(TrackingRate::None)?)?;
        self.machine.read_position(channel)?;
        self.machine.record_tracking(TrackingRate::None);

        let verified = if self.config.startup.assume_parked {
            self.machine
                .verify_parked_orientation(channel, self.config.startup.tolerance_deg)
        } else {
            Ok(())
        };
        self.initialised = true;
        self.publish(&mut rt.values);
        info!(state = %self.machine.state(), "mount initialised");
        verified
    }

    fn poll(&mut self, rt: &mut DeviceRuntime) -> Result<Vec<MountEvent>, MountError> {
        if !self.initialised {
            return Err(ProtocolError::NotConnected.into());
        }
        let _span = rt.log.enter();
        let channel = &mut rt.channel;

        let ticked = self.machine.tick(channel);
        let idle = !self.machine.state().is_moving() && !self.machine.is_blocked();
        let clock_event = if idle && ticked.is_ok() {
            self.vendor.check_clock(&self.machine, channel)
        } else {
            Ok(None)
        };
        let result = ticked.and_then(|mut events| {
            events.extend(clock_event?);
            Ok(events)
        });

        let result = match result {
            Ok(mut events) => {
                let mut all = std::mem::take(&mut self.pending);
                all.append(&mut events);
                Ok(all)
            }
            Err(e) => {
                warn!(error = %e, "poll failed");
                self.machine.set_last_error(e.to_string());
                Err(e)
            }
        };
        self.publish(&mut rt.values);
        result
    }

    fn set_value(
        &mut self,
        rt: &mut DeviceRuntime,
        name: &str,
        value: &str,
    ) -> Result<(), MountError> {
        let op = Operation::parse(name, value)?;
        let _span = rt.log.enter();
        let result = self.execute(&mut rt.channel, op);
        if let Err(e) = &result {
            warn!(name, error = %e, "operation failed");
            self.machine.set_last_error(e.to_string());
        }
        self.publish(&mut rt.values);
        result
    }
}
