mod common;

use common::{config, init_tracing, sim_config, start_time};
use mountctl_core::astro::{Clock, ManualClock};
use mountctl_core::config::MountConfig;
use mountctl_core::device::{Device, DeviceRuntime, GemDriver};
use mountctl_core::logging::LogContext;
use mountctl_core::mount::{MountError, MountEvent};
use mountctl_core::protocol::{ProtocolError, TrackingRate};
use mountctl_core::sim::{SimConfig, SimHandle, SimulatedMount};
use std::sync::Arc;

struct Harness {
    driver: GemDriver,
    rt: DeviceRuntime,
    sim: SimHandle,
}

fn harness_with(mut config: MountConfig, sim: SimConfig) -> Harness {
    init_tracing();
    config.connection.retry_pause_ms = 0;
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start_time()));
    let mount = SimulatedMount::new(sim, Arc::clone(&clock));
    let handle = mount.handle();
    let rt = DeviceRuntime::new(Box::new(mount), &config, LogContext::new("gem"));
    Harness {
        driver: GemDriver::new(config, clock),
        rt,
        sim: handle,
    }
}

fn harness() -> Harness {
    let config = config(150.0);
    let sim = sim_config(&config);
    harness_with(config, sim)
}

#[test]
fn test_init_publishes_values() {
    let mut h = harness();
    h.driver.init(&mut h.rt).unwrap();
    assert!(h.driver.is_initialised());

    let values = &h.rt.values;
    assert_eq!(values.text("state"), Some("idle"));
    assert_eq!(values.flag("tracking"), Some(false));
    assert_eq!(values.flag("blocked"), Some(false));
    assert_eq!(values.text("axis_side"), Some("West"));
    assert!((values.scalar("ha").unwrap() - 270.0).abs() < 0.01);
    assert!((values.scalar("dec").unwrap() - 60.0).abs() < 0.01);
    assert!((values.scalar("lst").unwrap() - 10.0).abs() < 0.01);

    // tracking is switched off during init
    assert!(h.sim.commands().iter().any(|c| c == "RT9"));
    assert_eq!(h.sim.tracking(), TrackingRate::None);
}

#[test]
fn test_init_switches_to_long_precision_once() {
    let config = config(150.0);
    let sim = SimConfig {
        long_precision: false,
        ..sim_config(&config)
    };
    let mut h = harness_with(config, sim);
    h.driver.init(&mut h.rt).unwrap();
    assert!(h.sim.long_precision());
    assert_eq!(h.sim.commands().iter().filter(|c| *c == "U").count(), 1);
}

#[test]
fn test_init_verifies_park_position() {
    let mut config = config(150.0);
    config.startup.assume_parked = true;
    let sim = sim_config(&config);
    let mut h = harness_with(config, sim);
    h.driver.init(&mut h.rt).unwrap();
    assert_eq!(h.rt.values.flag("parked"), Some(true));
}

#[test]
fn test_init_blocks_when_not_parked() {
    let mut config = config(150.0);
    config.startup.assume_parked = true;
    let sim = sim_config(&config);
    let mut h = harness_with(config, sim);
    h.sim.place(200.0, 30.0);

    let err = h.driver.init(&mut h.rt).unwrap_err();
    assert!(matches!(err, MountError::Blocked(_)));
    assert_eq!(h.rt.values.flag("blocked"), Some(true));
    assert_eq!(h.rt.values.text("state"), Some("blocked"));
    assert!(!h.rt.values.text("last_error").unwrap_or_default().is_empty());

    // every motion request is refused until acknowledged
    assert!(h.driver.set_value(&mut h.rt, "home", "").is_err());
    h.driver
        .set_value(&mut h.rt, "acknowledge_block", "")
        .unwrap();
    assert_eq!(h.rt.values.flag("blocked"), Some(false));
}

#[test]
fn test_poll_before_init_fails() {
    let mut h = harness();
    let err = h.driver.poll(&mut h.rt).unwrap_err();
    assert!(matches!(
        err,
        MountError::Protocol(ProtocolError::NotConnected)
    ));
}

#[test]
fn test_slew_through_named_write() {
    let mut h = harness();
    h.driver.init(&mut h.rt).unwrap();
    h.driver
        .set_value(&mut h.rt, "slew", "08:00:00 +45*00:00")
        .unwrap();
    assert_eq!(h.rt.values.text("state"), Some("slewing"));

    let mut completed = false;
    for _ in 0..5 {
        let events = h.driver.poll(&mut h.rt).unwrap();
        if events
            .iter()
            .any(|e| matches!(e, MountEvent::SlewCompleted { .. }))
        {
            completed = true;
            break;
        }
    }
    assert!(completed);
    assert_eq!(h.rt.values.text("state"), Some("tracking"));
    assert_eq!(h.rt.values.text("tracking_rate"), Some("sidereal"));
    assert!(h.rt.values.is_changed("ra"));
}

#[test]
fn test_abort_through_named_write() {
    let mut h = harness();
    h.driver.init(&mut h.rt).unwrap();
    h.driver
        .set_value(&mut h.rt, "slew", "08:00:00 +45*00:00")
        .unwrap();
    h.sim.clear_log();

    h.driver.set_value(&mut h.rt, "abort", "").unwrap();
    assert_eq!(h.sim.commands(), vec!["Q", "RT9"]);
    assert!(!h.sim.is_slewing());
    assert_eq!(h.rt.values.text("state"), Some("idle"));
}

#[test]
fn test_failed_write_reports_last_error() {
    let mut h = harness();
    h.driver.init(&mut h.rt).unwrap();
    let err = h
        .driver
        .set_value(&mut h.rt, "slew", "not a position")
        .unwrap_err();
    assert!(matches!(err, MountError::InvalidArgument(_)));

    h.sim.reject_next_slew("Object below horizon");
    let err = h
        .driver
        .set_value(&mut h.rt, "slew", "08:00:00 +45*00:00")
        .unwrap_err();
    assert!(matches!(err, MountError::SlewRejected(_)));
    assert!(h
        .rt
        .values
        .text("last_error")
        .unwrap_or_default()
        .contains("Object below horizon"));
}
