use std::time::{Duration, Instant};

use magloop_core::{Debouncer, EndstopState, Observation};
use proptest::prelude::*;
use rstest::rstest;

const GATE: Duration = Duration::from_millis(100);

#[rstest]
#[case(&[0, 5, 12, 40, 99], 1)]
#[case(&[0, 100], 2)]
#[case(&[0, 50, 150, 151], 2)]
#[case(&[0, 100, 200, 300], 4)]
fn alternating_edges(#[case] at_ms: &[u64], #[case] accepted: usize) {
    let t0 = Instant::now();
    let mut d = Debouncer::new(false, GATE);
    let mut level = false;
    let mut n = 0;
    for ms in at_ms {
        level = !level;
        if let Observation::Accepted(_) = d.observe(level, t0 + Duration::from_millis(*ms)) {
            n += 1;
        }
    }
    assert_eq!(n, accepted);
}

#[test]
fn first_change_is_accepted_immediately() {
    let mut d = Debouncer::new(true, GATE);
    assert_eq!(
        d.observe(false, Instant::now()),
        Observation::Accepted(EndstopState::Released)
    );
}

proptest! {
    #[test]
    fn accepted_transitions_are_spaced_by_the_gate(
        gaps in prop::collection::vec(0u64..250, 1..60),
        levels in prop::collection::vec(any::<bool>(), 60),
    ) {
        let t0 = Instant::now();
        let mut d = Debouncer::new(false, GATE);
        let mut now = t0;
        let mut last_accept: Option<Instant> = None;
        let mut accepted_level = false;
        for (gap, level) in gaps.iter().zip(levels.iter()) {
            now += Duration::from_millis(*gap);
            match d.observe(*level, now) {
                Observation::Accepted(state) => {
                    if let Some(prev) = last_accept {
                        prop_assert!(now - prev >= GATE);
                    }
                    prop_assert_eq!(state == EndstopState::Triggered, *level);
                    prop_assert_ne!(*level, accepted_level);
                    accepted_level = *level;
                    last_accept = Some(now);
                }
                Observation::Unchanged => prop_assert_eq!(*level, accepted_level),
                Observation::Bounce => prop_assert_ne!(*level, accepted_level),
            }
            prop_assert_eq!(d.accepted(), accepted_level);
        }
    }
}
