mod common;

use chrono::Duration;
use common::{config, rig, sim_config, Rig};
use mountctl_core::astro::Position;
use mountctl_core::config::MountConfig;
use mountctl_core::logging::LogContext;
use mountctl_core::mount::{AxisSide, MountError, MountEvent, MountState};
use mountctl_core::protocol::{ApFirmware, ProtocolFlavor, TrackingRate};
use mountctl_core::vendor::{ClockManager, VendorLayer};
use pretty_assertions::assert_eq;

fn vendor_rig(config: MountConfig) -> (Rig, VendorLayer) {
    let sim = sim_config(&config);
    let rig = rig(config, sim);
    let vendor = VendorLayer::new(&rig.config, &LogContext::new("test"));
    (rig, vendor)
}

#[test]
fn test_clock_within_tolerance_is_left_alone() {
    let manager = ClockManager::new(&MountConfig::default().clock);
    assert!(!manager.check(10.000, 9.995).needs_resync());
    assert!(manager.check(10.0, 9.4).needs_resync());
}

#[test]
fn test_drifted_controller_clock_is_resynchronised() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    rig.sim.set_clock_error(Duration::minutes(36));

    let event = vendor
        .force_clock_check(&rig.machine, &mut rig.channel)
        .unwrap();
    match event {
        Some(MountEvent::ClockResynchronised { difference_hours }) => {
            assert!((difference_hours - 0.6).abs() < 0.01, "{difference_hours}");
        }
        other => panic!("expected a resynchronisation, got {other:?}"),
    }
    assert_eq!(
        rig.sim.commands(),
        vec!["GS", "SG+00", "SL22:00:00", "SC03/01/26", "GS"]
    );
    assert_eq!(rig.sim.clock_error(), Duration::zero());
}

#[test]
fn test_in_sync_clock_sends_nothing_else() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    let event = vendor
        .force_clock_check(&rig.machine, &mut rig.channel)
        .unwrap();
    assert!(event.is_none());
    assert_eq!(rig.sim.commands(), vec!["GS"]);

    // not due again until the interval has passed
    assert!(vendor
        .check_clock(&rig.machine, &mut rig.channel)
        .unwrap()
        .is_none());
    assert_eq!(rig.sim.commands().len(), 1);
}

#[test]
fn test_clock_that_ignores_the_update_is_an_error() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    rig.sim.set_clock_error(Duration::minutes(36));
    rig.sim.lock_clock(true);

    let err = vendor
        .force_clock_check(&rig.machine, &mut rig.channel)
        .unwrap_err();
    assert!(matches!(err, MountError::ClockDrift { .. }));
}

#[test]
fn test_classic_date_set_reads_two_status_lines() {
    let mut cfg = config(150.0);
    cfg.flavor = ProtocolFlavor::Lx200Classic;
    let (mut rig, mut vendor) = vendor_rig(cfg);
    rig.sim.set_clock_error(Duration::minutes(-20));

    let event = vendor
        .force_clock_check(&rig.machine, &mut rig.channel)
        .unwrap();
    assert!(event.is_some());
    // both trailer lines were consumed, so the final GS decoded cleanly
    assert!(!rig.channel.needs_resync());
}

#[test]
fn test_legacy_firmware_utc_offset() {
    let mut cfg = config(150.0);
    cfg.flavor = ProtocolFlavor::AstroPhysics {
        firmware: ApFirmware::Legacy,
    };
    cfg.clock.utc_offset_hours = 2.0;
    let (mut rig, mut vendor) = vendor_rig(cfg);

    assert!(vendor
        .negotiate_utc_offset(&rig.machine, &mut rig.channel)
        .unwrap());
    assert_eq!(rig.sim.commands(), vec!["GG", "SGA4"]);
    assert_eq!(rig.sim.utc_wire(), -2.0);

    // second negotiation finds the value already in place
    assert!(!vendor
        .negotiate_utc_offset(&rig.machine, &mut rig.channel)
        .unwrap());
}

#[test]
fn test_push_site() {
    let (mut rig, vendor) = vendor_rig(config(150.0));
    rig.sim.clear_log();
    vendor.push_site(&rig.machine, &mut rig.channel).unwrap();
    let commands = rig.sim.commands();
    assert_eq!(commands[0], "St+50*00");
    assert!(commands[1].starts_with("Sg"));
    assert!((rig.sim.latitude() - 50.0).abs() < 1e-9);
    assert!((rig.sim.longitude() - rig.config.observatory.longitude).abs() < 1.0 / 60.0);
}

#[test]
fn test_sync_with_consistent_pier_side() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    vendor
        .sync_ha(&mut rig.machine, &mut rig.channel, 300.0, 60.0)
        .unwrap();

    assert!((rig.machine.hour_angle() - 300.0).abs() < 1e-6);
    assert!((rig.sim.hour_angle() - 300.0).abs() < 0.01);
    assert_eq!(rig.machine.axis_side(), AxisSide::West);
    let commands = rig.sim.commands();
    assert_eq!(&commands[2..], ["CM", "pS"]);
}

#[test]
fn test_sync_pier_side_mismatch_disables_sync() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    rig.sim.override_pier_side(Some(AxisSide::East));

    let err = vendor
        .sync_ha(&mut rig.machine, &mut rig.channel, 300.0, 60.0)
        .unwrap_err();
    assert!(matches!(err, MountError::Blocked(_)));
    assert!(err.is_safety());
    assert!(rig.machine.sync_disabled());
    assert_eq!(rig.machine.state(), MountState::Blocked);
    // the disagreement was confirmed by a second reading
    assert_eq!(
        rig.sim.commands().iter().filter(|c| *c == "pS").count(),
        2
    );

    let err = vendor
        .sync_ha(&mut rig.machine, &mut rig.channel, 300.0, 60.0)
        .unwrap_err();
    assert!(matches!(err, MountError::SyncDisabled));

    rig.sim.override_pier_side(None);
    rig.machine.acknowledge_block();
    assert!(!rig.machine.sync_disabled());
    vendor
        .sync_ha(&mut rig.machine, &mut rig.channel, 300.0, 60.0)
        .unwrap();
}

#[test]
fn test_sync_near_meridian_skips_side_check() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    rig.sim.override_pier_side(Some(AxisSide::East));
    vendor
        .sync_ha(&mut rig.machine, &mut rig.channel, 182.0, 30.0)
        .unwrap();
    assert!(!rig.sim.commands().iter().any(|c| c == "pS"));
}

#[test]
fn test_sync_refused_while_slewing() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
    let err = vendor
        .sync(&mut rig.machine, &mut rig.channel, Position::new(100.0, 40.0))
        .unwrap_err();
    assert!(matches!(err, MountError::AlreadySlewing));
}

#[test]
fn test_tracking_rate_selection() {
    let (mut rig, mut vendor) = vendor_rig(config(150.0));
    vendor
        .set_tracking_rate(&mut rig.machine, &mut rig.channel, TrackingRate::Lunar)
        .unwrap();
    assert_eq!(rig.sim.commands(), vec!["RT0"]);
    assert_eq!(rig.sim.tracking(), TrackingRate::Lunar);
    assert_eq!(rig.machine.state(), MountState::Tracking);

    vendor
        .set_tracking_rate(&mut rig.machine, &mut rig.channel, TrackingRate::None)
        .unwrap();
    assert_eq!(&rig.sim.commands()[1..], ["GR", "GD", "RT9"]);
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert_eq!(rig.machine.tracking(), TrackingRate::None);
}

#[test]
fn test_classic_tracking_commands() {
    let mut cfg = config(150.0);
    cfg.flavor = ProtocolFlavor::Lx200Classic;
    let (mut rig, mut vendor) = vendor_rig(cfg);
    vendor
        .set_tracking_rate(&mut rig.machine, &mut rig.channel, TrackingRate::Sidereal)
        .unwrap();
    vendor
        .set_tracking_rate(&mut rig.machine, &mut rig.channel, TrackingRate::None)
        .unwrap();
    let commands = rig.sim.commands();
    assert_eq!(commands.first().map(String::as_str), Some("TQ"));
    assert_eq!(commands.last().map(String::as_str), Some("AL"));
}
