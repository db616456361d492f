use std::time::Duration;

use magloop_core::error::BuildError;
use magloop_core::mocks::RecordingMotor;
use magloop_core::{
    Controller, Direction, EndstopCfg, EndstopStrategy, MoveCommand, MoveOutcome, ParkCfg,
    ParkOutcome, TravelCfg,
};
use magloop_hardware::{SimAxisConfig, SimulatedAxis};
use rstest::rstest;

#[rstest]
fn missing_motor_yields_typed_build_error() {
    let err = Controller::builder()
        .with_switch(|| false)
        .try_build()
        .expect_err("should fail with MissingMotor");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingMotor) => {}
        other => panic!("expected MissingMotor, got: {other:?}"),
    }
}

#[rstest]
fn missing_switch_yields_typed_build_error() {
    let err = Controller::builder()
        .with_motor(RecordingMotor::new())
        .try_build()
        .expect_err("should fail with MissingSwitch");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingSwitch)
    ));
}

#[rstest]
#[case(TravelCfg { max_travel: 0 }, ParkCfg::default())]
#[case(TravelCfg::default(), ParkCfg { step_size: 0, ..ParkCfg::default() })]
#[case(TravelCfg::default(), ParkCfg { acceleration: 0, ..ParkCfg::default() })]
fn invalid_runtime_config_is_rejected(#[case] travel: TravelCfg, #[case] park: ParkCfg) {
    let err = Controller::builder()
        .with_motor(RecordingMotor::new())
        .with_switch(|| false)
        .with_travel(travel)
        .with_park(park)
        .build()
        .expect_err("invalid config");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[test]
fn initial_switch_level_is_published() {
    let ctl = Controller::builder()
        .with_motor(RecordingMotor::new())
        .with_switch(|| true)
        .build()
        .unwrap();
    let snap = ctl.state().snapshot();
    assert!(snap.triggered);
    assert_eq!(snap.position, 0);
    assert_eq!(snap.microsteps, 16);
}

fn sim_axis(start: i64) -> SimulatedAxis {
    SimulatedAxis::new(SimAxisConfig {
        start,
        step_period: Duration::from_micros(200),
        ..SimAxisConfig::default()
    })
}

#[rstest]
#[case(EndstopStrategy::Edge)]
#[case(EndstopStrategy::Poll)]
fn parks_then_moves_out_on_the_simulated_axis(#[case] strategy: EndstopStrategy) {
    let axis = sim_axis(120);
    let ctl = Controller::builder()
        .with_motor(axis.motor())
        .with_switch(axis.switch())
        .with_endstop(EndstopCfg {
            strategy,
            min_interval: Duration::from_millis(10),
            poll_interval: Duration::from_micros(500),
        })
        .build()
        .unwrap();
    if let Some(edges) = ctl.edge_sender() {
        axis.on_edge(move |pressed| edges.post(pressed));
    }

    let park = ctl.dispatcher().handle_park().unwrap();
    assert_eq!(park.outcome, ParkOutcome::Parked);
    assert_eq!(park.snapshot.position, 0);
    assert_eq!(park.snapshot.line_level(), 0);
    assert!(axis.is_pressed());
    assert!(!axis.is_enabled(), "driver released after park");

    let report = ctl
        .dispatcher()
        .handle_move_command(&MoveCommand {
            direction: Direction::Forward,
            steps: 500,
            acceleration: 6000,
            deceleration: 3500,
        })
        .unwrap();
    assert_eq!(report.outcome, MoveOutcome::Completed);
    assert_eq!(report.snapshot.position, 500);
    assert!(!axis.is_pressed());
}

#[test]
fn overshot_park_still_lets_short_forward_moves_out() {
    let axis = sim_axis(300);
    let ctl = Controller::builder()
        .with_motor(axis.motor())
        .with_switch(axis.switch())
        .with_endstop(EndstopCfg {
            strategy: EndstopStrategy::Edge,
            min_interval: Duration::from_millis(10),
            poll_interval: Duration::from_micros(500),
        })
        .build()
        .unwrap();
    if let Some(edges) = ctl.edge_sender() {
        axis.on_edge(move |pressed| edges.post(pressed));
    }
    let fwd = |steps| MoveCommand {
        direction: Direction::Forward,
        steps,
        acceleration: 6000,
        deceleration: 3500,
    };

    assert_eq!(ctl.dispatcher().handle_park().unwrap().outcome, ParkOutcome::Parked);
    // A slow debounce lets the carriage run deep past the trip point.
    axis.set_position(-350);

    let first = ctl.dispatcher().handle_move_command(&fwd(100)).unwrap();
    assert_eq!(first.outcome, MoveOutcome::Completed);
    assert!(axis.is_pressed());

    let second = ctl.dispatcher().handle_move_command(&fwd(500)).unwrap();
    assert_eq!(second.outcome, MoveOutcome::Completed);
    assert_eq!(second.snapshot.position, 600);
    assert!(!axis.is_pressed());
}
