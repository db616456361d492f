use std::sync::Arc;

use magloop_core::mocks::RecordingMotor;
use magloop_core::{
    ControllerState, DeviceCfg, Direction, Dispatcher, EndstopSignal, EndstopState,
    MotionController, MoveCommand, MoveOutcome, Observation, ParkCfg,
};
use magloop_traits::ManualClock;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Move(Direction, u32),
    Trigger,
    Release,
    Park,
    Info,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (any::<bool>(), 0u32..9000).prop_map(|(rev, n)| {
            Op::Move(if rev { Direction::Reverse } else { Direction::Forward }, n)
        }),
        1 => Just(Op::Trigger),
        1 => Just(Op::Release),
        1 => Just(Op::Park),
        1 => Just(Op::Info),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn position_stays_inside_travel_window(ops in prop::collection::vec(op(), 1..40)) {
        let max = 7000;
        let signal = Arc::new(EndstopSignal::new(false));
        let state = Arc::new(ControllerState::new(max, signal.clone(), 16));
        let motion = MotionController::new(
            RecordingMotor::new(),
            ManualClock::new(),
            state,
            ParkCfg { max_iterations: Some(3), ..ParkCfg::default() },
        );
        let d = Dispatcher::new(motion, DeviceCfg::default());

        for op in ops {
            match op {
                Op::Move(direction, steps) => {
                    let before = d.state().snapshot();
                    let report = d
                        .handle_move_command(&MoveCommand {
                            direction,
                            steps,
                            acceleration: 6000,
                            deceleration: 3500,
                        })
                        .unwrap();
                    if before.triggered && direction == Direction::Reverse {
                        prop_assert_eq!(&report.outcome, &MoveOutcome::RejectedEndstopTriggered);
                    }
                    if report.outcome.is_rejection() {
                        prop_assert_eq!(report.snapshot.position, before.position);
                    }
                }
                Op::Trigger => signal.apply(Observation::Accepted(EndstopState::Triggered)),
                Op::Release => signal.apply(Observation::Accepted(EndstopState::Released)),
                Op::Park => {
                    d.handle_park().unwrap();
                }
                Op::Info => {
                    let before = d.state().snapshot();
                    let _ = d.handle_info();
                    prop_assert_eq!(d.state().snapshot(), before);
                }
            }
            let pos = d.state().position();
            prop_assert!((0..=max).contains(&pos), "position {} out of window", pos);
        }
    }
}
