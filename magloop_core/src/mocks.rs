//! Test and helper mocks for magloop_core

use std::sync::{Arc, Mutex};
use std::time::Duration;

use magloop_traits::Motor;

use crate::endstop::{EndstopSignal, EndstopState, Observation};

/// Everything a [`RecordingMotor`] was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotorLog {
    pub enables: u32,
    pub disables: u32,
    /// Enables not yet matched by a disable.
    pub enabled: u32,
    /// Highest `enabled` ever seen; more than 1 means overlapping moves.
    pub peak_enabled: u32,
    pub profiles: Vec<(u32, u32)>,
    /// Requested deltas, in call order.
    pub moves: Vec<i64>,
    /// Total pulses issued across all moves.
    pub pulses: u64,
}

/// Motor that records every call and issues pulses instantly, or at a fixed
/// period when one is set.
///
/// Optionally publishes an accepted endstop trigger once a given number of
/// pulses has been issued, standing in for the switch closing mid-move.
#[derive(Debug, Clone)]
pub struct RecordingMotor {
    log: Arc<Mutex<MotorLog>>,
    trip: Option<(u64, Arc<EndstopSignal>)>,
    fail_moves: bool,
    pulse_period: Duration,
    microsteps: u16,
}

impl Default for RecordingMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingMotor {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(MotorLog::default())),
            trip: None,
            fail_moves: false,
            pulse_period: Duration::ZERO,
            microsteps: 16,
        }
    }

    /// Trigger `signal` when the running pulse total reaches `after_pulses`.
    pub fn tripping(mut self, after_pulses: u64, signal: Arc<EndstopSignal>) -> Self {
        self.trip = Some((after_pulses, signal));
        self
    }

    /// Every `move_steps` call fails with an I/O error.
    pub fn failing(mut self) -> Self {
        self.fail_moves = true;
        self
    }

    /// Sleep this long per pulse so a move occupies real time.
    pub fn with_pulse_period(mut self, period: Duration) -> Self {
        self.pulse_period = period;
        self
    }

    /// Shared handle to the call log; clone before handing the motor away.
    pub fn log(&self) -> Arc<Mutex<MotorLog>> {
        self.log.clone()
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut MotorLog) -> T) -> T {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut log)
    }
}

impl Motor for RecordingMotor {
    fn enable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.with_log(|l| {
            l.enables += 1;
            l.enabled += 1;
            l.peak_enabled = l.peak_enabled.max(l.enabled);
        });
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.with_log(|l| {
            l.disables += 1;
            l.enabled = l.enabled.saturating_sub(1);
        });
        Ok(())
    }

    fn set_speed_profile(
        &mut self,
        acceleration: u32,
        deceleration: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.with_log(|l| l.profiles.push((acceleration, deceleration)));
        Ok(())
    }

    fn move_steps(
        &mut self,
        delta: i64,
        halt: &dyn Fn() -> bool,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        self.with_log(|l| l.moves.push(delta));
        if self.fail_moves {
            return Err(Box::new(std::io::Error::other("step line stuck")));
        }
        let mut issued: i64 = 0;
        while issued < delta.abs() {
            if halt() {
                break;
            }
            issued += 1;
            let total = self.with_log(|l| {
                l.pulses += 1;
                l.pulses
            });
            match &self.trip {
                Some((after, signal)) if total == *after => {
                    signal.apply(Observation::Accepted(EndstopState::Triggered));
                }
                _ => {}
            }
            if !self.pulse_period.is_zero() {
                std::thread::sleep(self.pulse_period);
            }
        }
        Ok(issued * delta.signum())
    }

    fn microsteps(&self) -> u16 {
        self.microsteps
    }
}
