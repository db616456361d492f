#![no_main]
use libfuzzer_sys::fuzz_target;
use magloop_core::{Direction, parse_move};

fuzz_target!(|data: &[u8]| {
    // Arbitrary request bodies must either parse into a bounded command or be
    // rejected; never panic.
    if let Ok(cmd) = parse_move(data) {
        assert!(cmd.acceleration > 0 && cmd.deceleration > 0);
        let delta = cmd.delta();
        assert_eq!(delta.unsigned_abs(), u64::from(cmd.steps));
        match cmd.direction {
            Direction::Forward => assert!(delta >= 0),
            Direction::Reverse => assert!(delta <= 0),
        }
    }
});
