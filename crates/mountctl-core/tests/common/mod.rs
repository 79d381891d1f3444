//! Shared fixtures: a motion state machine wired to the simulated controller

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use mountctl_core::astro::{gmst_degrees, signed_degrees, Clock, ManualClock};
use mountctl_core::collision::MountGeometry;
use mountctl_core::config::MountConfig;
use mountctl_core::logging::LogContext;
use mountctl_core::mount::{MotionStateMachine, MountEvent};
use mountctl_core::protocol::{ChannelConfig, CommandChannel};
use mountctl_core::sim::{SimConfig, SimHandle, SimulatedMount};
use nalgebra::Vector3;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 22, 0, 0).unwrap()
}

/// East longitude, rounded to whole arcminutes, that puts local sidereal
/// time at `lst_deg` at `start_time()`
pub fn longitude_for_lst(lst_deg: f64) -> f64 {
    let lon = signed_degrees(lst_deg - gmst_degrees(start_time()));
    (lon * 60.0).round() / 60.0
}

/// Geometry whose pier never reaches the tube
pub fn clear_geometry() -> MountGeometry {
    MountGeometry {
        dec_axis_offset: Vector3::new(0.3, 0.0, 0.1),
        pier_radius: 1.0,
        tube_radius: 0.1,
        tube_rear_length: 5.0,
        floor: -100.0,
        wedge: -99.0,
        danger_zone_above: -98.0,
        danger_zone_below: -101.0,
    }
}

/// Same mount with the floor/wedge band placed at `floor..wedge`
pub fn banded_geometry(floor: f64, wedge: f64) -> MountGeometry {
    MountGeometry {
        floor,
        wedge,
        danger_zone_above: wedge + 0.01,
        danger_zone_below: floor - 0.01,
        ..clear_geometry()
    }
}

pub fn config(lst_deg: f64) -> MountConfig {
    let mut config = MountConfig::default();
    config.observatory.longitude = longitude_for_lst(lst_deg);
    config.observatory.latitude = 50.0;
    config.geometry = clear_geometry();
    config
}

pub fn sim_config(config: &MountConfig) -> SimConfig {
    SimConfig {
        flavor: config.flavor,
        longitude: config.observatory.longitude,
        latitude: config.observatory.latitude,
        ..SimConfig::default()
    }
}

pub struct Rig {
    pub clock: ManualClock,
    pub sim: SimHandle,
    pub channel: CommandChannel,
    pub machine: MotionStateMachine,
    pub config: MountConfig,
}

pub fn rig(config: MountConfig, sim: SimConfig) -> Rig {
    init_tracing();
    let clock = ManualClock::new(start_time());
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let mount = SimulatedMount::new(sim, Arc::clone(&shared));
    let handle = mount.handle();
    let channel_config = ChannelConfig {
        retry_pause: std::time::Duration::ZERO,
        ..config.connection.channel_config()
    };
    let log = LogContext::new("test");
    let channel = CommandChannel::new(Box::new(mount), channel_config, &log);
    let machine = MotionStateMachine::new(&config, shared, &log);
    Rig {
        clock,
        sim: handle,
        channel,
        machine,
        config,
    }
}

impl Rig {
    pub fn tick(&mut self) -> Vec<MountEvent> {
        self.machine.tick(&mut self.channel).unwrap()
    }

    /// Tick until `done` matches an event, up to `limit` ticks
    pub fn tick_until(&mut self, limit: usize, done: impl Fn(&MountEvent) -> bool) -> MountEvent {
        for _ in 0..limit {
            if let Some(event) = self.tick().into_iter().find(|e| done(e)) {
                return event;
            }
        }
        panic!("no matching event after {limit} ticks");
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
