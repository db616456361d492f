//! Step/direction driver (A4988 class) with software pulse generation.
//!
//! The microstep divisor is selected by driving the MS1..MS3 lines from
//! software at construction time; every step pulse and the linear
//! acceleration/deceleration ramp are timed in this process.

use std::time::Duration;

use magloop_traits::{Clock, Motor};

use crate::error::{HwError, Result};
use crate::util::pulse_rate_hz;

/// Output lines of a step/direction driver.
pub trait StepDirPins {
    /// Set the DIR line; `true` moves away from home.
    fn set_direction(&mut self, away_from_home: bool) -> Result<()>;
    /// Drive the ENABLE line to the given electrical level.
    fn set_enable_level(&mut self, high: bool) -> Result<()>;
    /// Drive MS1, MS2, MS3.
    fn set_microstep_lines(&mut self, lines: [bool; 3]) -> Result<()>;
    /// Emit one step pulse (rising edge, minimum high time, falling edge).
    fn pulse(&mut self) -> Result<()>;
}

/// MS1..MS3 levels for an A4988 microstep divisor.
pub fn microstep_lines(divisor: u16) -> Result<[bool; 3]> {
    match divisor {
        1 => Ok([false, false, false]),
        2 => Ok([true, false, false]),
        4 => Ok([false, true, false]),
        8 => Ok([true, true, false]),
        16 => Ok([true, true, true]),
        other => Err(HwError::InvalidMicrostep(other)),
    }
}

/// Static timing parameters of the motor/driver pair.
#[derive(Debug, Clone, Copy)]
pub struct DriverTiming {
    pub steps_per_rev: u32,
    pub rpm: u32,
    pub microsteps: u16,
    pub enable_active_low: bool,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            steps_per_rev: 200,
            rpm: 50,
            microsteps: 16,
            enable_active_low: true,
        }
    }
}

/// Linear speed ramp: accelerate from rest, cruise, decelerate to rest.
#[derive(Debug, Clone, Copy)]
pub struct SpeedRamp {
    cruise_hz: f64,
    accel: f64,
    decel: f64,
}

impl SpeedRamp {
    pub fn new(cruise_hz: f64, acceleration: u32, deceleration: u32) -> Self {
        Self {
            cruise_hz: cruise_hz.max(1.0),
            accel: f64::from(acceleration.max(1)),
            decel: f64::from(deceleration.max(1)),
        }
    }

    /// Delay after pulse `index` (0-based) of a move of `total` pulses.
    pub fn interval(&self, index: u64, total: u64) -> Duration {
        let done = (index + 1) as f64;
        let remaining = total.saturating_sub(index) as f64;
        let v_acc = (2.0 * self.accel * done).sqrt();
        let v_dec = (2.0 * self.decel * remaining).sqrt();
        let v = self.cruise_hz.min(v_acc).min(v_dec).max(1.0);
        Duration::from_secs_f64(1.0 / v)
    }
}

pub struct SoftwareMicrostepDriver<P: StepDirPins, C: Clock> {
    pins: P,
    clock: C,
    timing: DriverTiming,
    acceleration: u32,
    deceleration: u32,
    enabled: bool,
}

impl<P: StepDirPins, C: Clock> core::fmt::Debug for SoftwareMicrostepDriver<P, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftwareMicrostepDriver")
            .field("timing", &self.timing)
            .field("acceleration", &self.acceleration)
            .field("deceleration", &self.deceleration)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl<P: StepDirPins, C: Clock> SoftwareMicrostepDriver<P, C> {
    /// Select the microstep divisor and leave the driver disabled.
    pub fn new(mut pins: P, clock: C, timing: DriverTiming) -> Result<Self> {
        pins.set_microstep_lines(microstep_lines(timing.microsteps)?)?;
        pins.set_enable_level(timing.enable_active_low)?;
        tracing::debug!(
            microsteps = timing.microsteps,
            rpm = timing.rpm,
            "step/dir driver configured"
        );
        Ok(Self {
            pins,
            clock,
            timing,
            acceleration: 6000,
            deceleration: 3500,
            enabled: false,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn write_enable(&mut self, on: bool) -> Result<()> {
        // Active-low drivers are enabled by pulling the line down.
        let level = on != self.timing.enable_active_low;
        self.pins.set_enable_level(level)?;
        self.enabled = on;
        Ok(())
    }

    fn ramp(&self) -> SpeedRamp {
        let cruise = pulse_rate_hz(
            self.timing.rpm,
            self.timing.steps_per_rev,
            self.timing.microsteps,
        );
        SpeedRamp::new(cruise, self.acceleration, self.deceleration)
    }
}

impl<P: StepDirPins, C: Clock> Motor for SoftwareMicrostepDriver<P, C> {
    fn enable(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_enable(true)?;
        Ok(())
    }

    fn disable(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_enable(false)?;
        Ok(())
    }

    fn set_speed_profile(
        &mut self,
        acceleration: u32,
        deceleration: u32,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.acceleration = acceleration;
        self.deceleration = deceleration;
        Ok(())
    }

    fn move_steps(
        &mut self,
        delta: i64,
        halt: &dyn Fn() -> bool,
    ) -> std::result::Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        if delta == 0 {
            return Ok(0);
        }
        self.pins.set_direction(delta > 0)?;
        let total = delta.unsigned_abs();
        let ramp = self.ramp();
        let mut issued: u64 = 0;
        while issued < total {
            if halt() {
                tracing::debug!(issued, requested = total, "step train halted");
                break;
            }
            self.pins.pulse()?;
            self.clock.sleep(ramp.interval(issued, total));
            issued += 1;
        }
        let issued = i64::try_from(issued).unwrap_or(i64::MAX);
        Ok(if delta < 0 { -issued } else { issued })
    }

    fn microsteps(&self) -> u16 {
        self.timing.microsteps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magloop_traits::ManualClock;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    enum PinEvent {
        Dir(bool),
        Enable(bool),
        Ms([bool; 3]),
        Pulse,
    }

    #[derive(Default)]
    struct RecordingPins {
        events: Vec<PinEvent>,
    }

    impl StepDirPins for RecordingPins {
        fn set_direction(&mut self, away_from_home: bool) -> Result<()> {
            self.events.push(PinEvent::Dir(away_from_home));
            Ok(())
        }
        fn set_enable_level(&mut self, high: bool) -> Result<()> {
            self.events.push(PinEvent::Enable(high));
            Ok(())
        }
        fn set_microstep_lines(&mut self, lines: [bool; 3]) -> Result<()> {
            self.events.push(PinEvent::Ms(lines));
            Ok(())
        }
        fn pulse(&mut self) -> Result<()> {
            self.events.push(PinEvent::Pulse);
            Ok(())
        }
    }

    fn pulses(events: &[PinEvent]) -> usize {
        events.iter().filter(|e| **e == PinEvent::Pulse).count()
    }

    #[test]
    fn construction_selects_sixteenth_steps_and_disables() {
        let drv = SoftwareMicrostepDriver::new(
            RecordingPins::default(),
            ManualClock::new(),
            DriverTiming::default(),
        )
        .unwrap();
        assert_eq!(
            drv.pins.events,
            vec![PinEvent::Ms([true, true, true]), PinEvent::Enable(true)]
        );
        assert!(!drv.is_enabled());
    }

    #[test]
    fn enable_is_active_low() {
        let mut drv = SoftwareMicrostepDriver::new(
            RecordingPins::default(),
            ManualClock::new(),
            DriverTiming::default(),
        )
        .unwrap();
        drv.enable().unwrap();
        drv.disable().unwrap();
        let tail = &drv.pins.events[drv.pins.events.len() - 2..];
        assert_eq!(tail, &[PinEvent::Enable(false), PinEvent::Enable(true)]);
    }

    #[test]
    fn reverse_move_sets_direction_and_counts_pulses() {
        let clock = ManualClock::new();
        let mut drv =
            SoftwareMicrostepDriver::new(RecordingPins::default(), clock.clone(), DriverTiming::default())
                .unwrap();
        let issued = drv.move_steps(-40, &|| false).unwrap();
        assert_eq!(issued, -40);
        assert!(drv.pins.events.contains(&PinEvent::Dir(false)));
        assert_eq!(pulses(&drv.pins.events), 40);
        assert!(clock.elapsed() > Duration::ZERO);
    }

    #[test]
    fn halt_stops_before_next_pulse() {
        let mut drv = SoftwareMicrostepDriver::new(
            RecordingPins::default(),
            ManualClock::new(),
            DriverTiming::default(),
        )
        .unwrap();
        let polls = Cell::new(0u32);
        let halt = || {
            polls.set(polls.get() + 1);
            polls.get() > 12
        };
        let issued = drv.move_steps(100, &halt).unwrap();
        assert_eq!(issued, 12);
        assert_eq!(pulses(&drv.pins.events), 12);
    }

    #[test]
    fn zero_delta_touches_nothing() {
        let mut drv = SoftwareMicrostepDriver::new(
            RecordingPins::default(),
            ManualClock::new(),
            DriverTiming::default(),
        )
        .unwrap();
        let before = drv.pins.events.len();
        assert_eq!(drv.move_steps(0, &|| false).unwrap(), 0);
        assert_eq!(drv.pins.events.len(), before);
    }

    #[test]
    fn ramp_reaches_cruise_and_is_slow_at_both_ends() {
        // 50 rpm * 200 * 16 / 60 = 2666.67 pulses/s
        let ramp = SpeedRamp::new(pulse_rate_hz(50, 200, 16), 6000, 3500);
        let total = 10_000;
        let first = ramp.interval(0, total);
        let middle = ramp.interval(total / 2, total);
        let last = ramp.interval(total - 1, total);
        assert!(first > middle);
        assert!(last > middle);
        let cruise = Duration::from_secs_f64(1.0 / pulse_rate_hz(50, 200, 16));
        let diff = middle.abs_diff(cruise);
        assert!(diff < Duration::from_micros(1), "middle={middle:?}");
    }

    #[test]
    fn microstep_table_rejects_unknown_divisor() {
        assert!(microstep_lines(32).is_err());
        assert_eq!(microstep_lines(4).unwrap(), [false, true, false]);
    }
}
