mod common;

use chrono::Duration;
use common::{banded_geometry, config, rig, sim_config};
use mountctl_core::astro::{angular_difference, Position};
use mountctl_core::collision::CollisionVerdict;
use mountctl_core::mount::{AxisSide, MountError, MountEvent, MountState};
use mountctl_core::protocol::{JogDirection, TrackingRate};
use pretty_assertions::assert_eq;

/// Target at the given hour angle and declination for the rig's current LST
fn at_hour_angle(rig: &common::Rig, ha: f64, dec: f64) -> Position {
    Position::new(rig.machine.lst() - ha, dec)
}

#[test]
fn test_slew_arrives_and_tracks() {
    let cfg = config(150.0);
    let mut sim = sim_config(&cfg);
    sim.settle_offset = (0.02, -0.03);
    let mut rig = rig(cfg, sim);

    assert_eq!(rig.machine.state(), MountState::Idle);
    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
    assert_eq!(rig.machine.state(), MountState::Slewing);
    assert_eq!(
        &rig.sim.commands()[..3],
        &["Sr08:00:00", "Sd+45*00:00", "MS"]
    );

    let event = rig.tick_until(5, |e| matches!(e, MountEvent::SlewCompleted { .. }));
    let MountEvent::SlewCompleted { position, side } = event else {
        unreachable!()
    };
    assert!((position.ra() - 120.02).abs() < 0.01);
    assert!((position.dec() - 44.97).abs() < 0.01);
    // LST 150, RA 120: hour angle 30
    assert_eq!(side, AxisSide::East);
    assert_eq!(rig.machine.state(), MountState::Tracking);
    assert_eq!(rig.machine.tracking(), TrackingRate::Sidereal);
    assert_eq!(rig.sim.tracking(), TrackingRate::Sidereal);
}

#[test]
fn test_colliding_target_never_reaches_the_wire() {
    let mut cfg = config(150.0);
    cfg.geometry = banded_geometry(-1.5, -0.3);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    let target = at_hour_angle(&rig, 190.0, 70.0);
    let before = rig.sim.tx_len();
    let err = rig.machine.start_slew(&mut rig.channel, target).unwrap_err();

    match err {
        MountError::Collision { verdict, side } => {
            assert_eq!(verdict, CollisionVerdict::Colliding);
            assert_eq!(side, AxisSide::West);
        }
        other => panic!("expected collision, got {other:?}"),
    }
    assert_eq!(rig.sim.tx_len(), before);
    assert_eq!(rig.machine.state(), MountState::Idle);
}

#[test]
fn test_safety_override_lets_colliding_slew_through() {
    let mut cfg = config(150.0);
    cfg.geometry = banded_geometry(-1.5, -0.3);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.machine.set_safety_override(true);
    let target = at_hour_angle(&rig, 190.0, 70.0);
    rig.machine.start_slew(&mut rig.channel, target).unwrap();
    assert_eq!(rig.machine.state(), MountState::Slewing);
}

#[test]
fn test_below_horizon_rejected_without_transmission() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    let target = at_hour_angle(&rig, 0.0, -60.0);
    let err = rig.machine.start_slew(&mut rig.channel, target).unwrap_err();
    assert!(matches!(err, MountError::BelowHorizon { .. }));
    assert_eq!(rig.sim.tx_len(), 0);
}

#[test]
fn test_second_slew_rejected_while_slewing() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
    let sent = rig.sim.tx_len();
    let err = rig
        .machine
        .start_slew(&mut rig.channel, Position::new(100.0, 30.0))
        .unwrap_err();
    assert!(matches!(err, MountError::AlreadySlewing));
    assert_eq!(rig.sim.tx_len(), sent);
}

#[test]
fn test_rejected_slew_reports_controller_message() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.sim.reject_next_slew("Object Below Horizon");
    let err = rig
        .machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap_err();
    match err {
        MountError::SlewRejected(message) => assert_eq!(message, "Object Below Horizon"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert!(!rig.channel.needs_resync());
}

#[test]
fn test_rejected_slew_without_message_reports_code() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.sim.reject_next_slew("");
    let err = rig
        .machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap_err();
    match err {
        MountError::SlewRejected(message) => assert_eq!(message, "code 1"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(rig.machine.state(), MountState::Idle);
    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
}

#[test]
fn test_abort_while_slewing_disables_tracking() {
    let cfg = config(150.0);
    let mut sim = sim_config(&cfg);
    sim.slew_polls = 50;
    let mut rig = rig(cfg, sim);

    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
    rig.tick();
    assert_eq!(rig.machine.state(), MountState::Slewing);

    rig.machine.abort_any_motion(&mut rig.channel);
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert!(!rig.sim.is_slewing());

    let events = rig.tick();
    assert!(events.is_empty());
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert_eq!(rig.machine.tracking(), TrackingRate::None);
    assert_eq!(rig.sim.tracking(), TrackingRate::None);
}

#[test]
fn test_abort_is_idempotent() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.machine.abort_any_motion(&mut rig.channel);
    rig.machine.abort_any_motion(&mut rig.channel);

    assert_eq!(rig.machine.state(), MountState::Idle);
    assert_eq!(rig.machine.tracking(), TrackingRate::None);
    assert!(!rig.machine.abort_pending());
    assert_eq!(rig.sim.commands(), vec!["Q", "RT9", "Q", "RT9"]);
}

#[test]
fn test_failed_abort_is_retried_on_next_tick() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    // every attempt of both stop commands fails
    rig.sim.fail_writes(6);
    rig.machine.abort_any_motion(&mut rig.channel);
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert!(rig.machine.abort_pending());

    let events = rig.tick();
    assert!(events.contains(&MountEvent::AbortRetried));
    assert!(!rig.machine.abort_pending());
    assert_eq!(&rig.sim.commands()[..2], &["Q", "RT9"]);
}

#[test]
fn test_slew_timeout_aborts() {
    let cfg = config(150.0);
    let mut sim = sim_config(&cfg);
    sim.slew_polls = 1000;
    let mut rig = rig(cfg, sim);

    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
    rig.tick();
    rig.advance(Duration::seconds(181));

    let err = rig.machine.tick(&mut rig.channel).unwrap_err();
    assert!(matches!(err, MountError::SlewTimeout));
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert!(rig.machine.last_error().is_some());
    assert!(!rig.sim.is_slewing());
}

#[test]
fn test_collision_while_tracking_aborts() {
    // HA 200 clears the pier; by HA 260 the rear tube line dips into the band
    let mut cfg = config(150.0);
    cfg.geometry = banded_geometry(-0.70, -0.64);
    let mut sim = sim_config(&cfg);
    sim.slew_polls = 1;
    let mut rig = rig(cfg, sim);

    let target = at_hour_angle(&rig, 200.0, 70.0);
    rig.machine.start_slew(&mut rig.channel, target).unwrap();
    rig.tick_until(3, |e| matches!(e, MountEvent::SlewCompleted { .. }));
    assert_eq!(rig.machine.state(), MountState::Tracking);
    assert_eq!(rig.machine.axis_side(), AxisSide::West);

    rig.advance(Duration::minutes(239));
    let events = rig.tick();
    assert_eq!(
        events,
        vec![MountEvent::CollisionAbort {
            verdict: CollisionVerdict::Colliding
        }]
    );
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert_eq!(rig.sim.tracking(), TrackingRate::None);
}

#[test]
fn test_meridian_transition_while_tracking() {
    let cfg = config(150.0);
    let mut sim = sim_config(&cfg);
    sim.slew_polls = 1;
    let mut rig = rig(cfg, sim);

    let target = at_hour_angle(&rig, 175.0, 70.0);
    rig.machine.start_slew(&mut rig.channel, target).unwrap();
    rig.tick_until(3, |e| matches!(e, MountEvent::SlewCompleted { .. }));
    assert_eq!(rig.machine.axis_side(), AxisSide::East);
    assert!(!rig.machine.transition_while_tracking());

    rig.advance(Duration::minutes(40));
    let events = rig.tick();
    assert_eq!(
        events,
        vec![MountEvent::MeridianTransition {
            from: AxisSide::East,
            to: AxisSide::West
        }]
    );
    assert!(rig.machine.transition_while_tracking());
    assert_eq!(rig.machine.state(), MountState::Tracking);
    // the physical side does not change without a slew
    assert_eq!(rig.machine.axis_side(), AxisSide::East);

    // raised once
    rig.advance(Duration::minutes(5));
    assert!(rig.tick().is_empty());
}

#[test]
fn test_park_stops_and_disables_tracking() {
    let cfg = config(150.0);
    let mut sim = sim_config(&cfg);
    sim.start_ha = 30.0;
    sim.start_dec = 20.0;
    let mut rig = rig(cfg, sim);

    rig.machine.start_park(&mut rig.channel).unwrap();
    assert_eq!(rig.machine.state(), MountState::Parking);
    rig.tick_until(5, |e| *e == MountEvent::Parked);

    assert_eq!(rig.machine.state(), MountState::Idle);
    assert!(rig.machine.is_parked());
    assert_eq!(rig.machine.tracking(), TrackingRate::None);
    assert_eq!(rig.sim.tracking(), TrackingRate::None);
    assert!(angular_difference(rig.sim.hour_angle(), 270.0) < 0.1);
    assert!(rig.sim.commands().iter().any(|c| c == "Q"));
}

#[test]
fn test_home_ends_idle_at_pole() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.machine.home(&mut rig.channel).unwrap();
    rig.tick_until(5, |e| *e == MountEvent::Homed);
    assert_eq!(rig.machine.state(), MountState::Idle);
    assert!(!rig.machine.is_parked());
    assert!((rig.machine.position().dec() - 90.0).abs() < 0.01);
}

#[test]
fn test_home_arrives_short_of_pole_with_unrelated_ra() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.machine.home(&mut rig.channel).unwrap();
    // controller settles 0.02° off the pole, a quarter turn away in RA
    rig.sim.place(270.0, 89.98);
    rig.tick_until(2, |e| *e == MountEvent::Homed);
    assert_eq!(rig.machine.state(), MountState::Idle);
}

#[test]
fn test_jog_moves_and_stops() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.machine.jog(&mut rig.channel, JogDirection::North).unwrap();
    assert_eq!(rig.sim.jog(), Some(JogDirection::North));
    rig.tick();
    rig.tick();
    assert!(rig.machine.position().dec() > 60.5);

    rig.machine.stop_jog(&mut rig.channel).unwrap();
    assert_eq!(rig.sim.jog(), None);
    assert_eq!(rig.machine.jogging(), None);
    let commands = rig.sim.commands();
    assert_eq!(commands.first().map(String::as_str), Some("Mn"));
    assert!(commands.iter().any(|c| c == "Qn"));
}

#[test]
fn test_jog_rejected_while_slewing() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
    let err = rig
        .machine
        .jog(&mut rig.channel, JogDirection::East)
        .unwrap_err();
    assert!(matches!(err, MountError::AlreadySlewing));
}

#[test]
fn test_axis_drift_while_untracked() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    assert!(rig.tick().is_empty());
    rig.advance(Duration::minutes(10));
    // an untracked mount keeps its hour angle
    assert!(rig.tick().is_empty());

    rig.sim.place(272.0, 60.0);
    let events = rig.tick();
    assert_eq!(events.len(), 1);
    match events[0] {
        MountEvent::AxisDrift { drift_deg } => assert!((drift_deg - 2.0).abs() < 0.01),
        ref other => panic!("expected drift, got {other:?}"),
    }
    assert_eq!(rig.sim.commands().iter().filter(|c| *c == "Q").count(), 1);
}

#[test]
fn test_repeated_failures_block_until_acknowledged() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.sim.set_silent(true);
    for _ in 0..3 {
        assert!(rig.machine.tick(&mut rig.channel).is_err());
    }
    assert!(rig.machine.is_blocked());
    assert_eq!(rig.machine.state(), MountState::Blocked);

    // abort still reaches the wire but does not clear the block
    rig.machine.abort_any_motion(&mut rig.channel);
    assert_eq!(rig.machine.state(), MountState::Blocked);

    rig.sim.set_silent(false);
    let err = rig
        .machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap_err();
    assert!(matches!(err, MountError::Blocked(_)));

    rig.machine.acknowledge_block();
    assert_eq!(rig.machine.state(), MountState::Idle);
    rig.machine
        .start_slew(&mut rig.channel, Position::new(120.0, 45.0))
        .unwrap();
}

#[test]
fn test_garbled_position_resynchronises_channel() {
    let cfg = config(150.0);
    let sim = sim_config(&cfg);
    let mut rig = rig(cfg, sim);

    rig.sim.garbage_next(b"xx:yy#");
    assert!(rig.machine.tick(&mut rig.channel).is_err());
    assert!(rig.channel.needs_resync());
    assert_eq!(rig.machine.consecutive_failures(), 1);

    rig.tick();
    assert!(!rig.channel.needs_resync());
    assert_eq!(rig.machine.consecutive_failures(), 0);
}
