use std::time::Duration;

use magloop_traits::Clock;

use crate::error::{HwError, Result};

/// Poll `done` until it reports true or `timeout` elapses on `clock`.
/// Sleeps `poll_interval` between polls to avoid spinning.
pub fn wait_until(
    clock: &dyn Clock,
    mut done: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = clock.now() + timeout;
    while !done()? {
        if clock.now() >= deadline {
            return Err(HwError::Timeout);
        }
        clock.sleep(poll_interval);
    }
    Ok(())
}

/// Step pulse rate for a motor turning at `rpm`, in pulses per second.
#[inline]
pub fn pulse_rate_hz(rpm: u32, steps_per_rev: u32, microsteps: u16) -> f64 {
    f64::from(rpm) * f64::from(steps_per_rev) * f64::from(microsteps) / 60.0
}
