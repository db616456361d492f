//! Host-side simulation of one tuning axis: a stepper moving a carriage and
//! the home limit switch it closes.
//!
//! Physical position is tracked independently of the controller's step
//! counter so tests can check what the controller believes against where the
//! carriage really is. The switch is pressed whenever the carriage sits at or
//! below `home_at`; a mechanical stop `overtravel` steps further down refuses
//! more pulses, the way a real lead screw stalls.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use magloop_traits::{Clock, LimitSwitch, MonotonicClock, Motor};

use crate::error::HwError;

type EdgeHook = Box<dyn Fn(bool) + Send>;

#[derive(Debug, Clone, Copy)]
pub struct SimAxisConfig {
    /// Carriage start position in steps from the switch trip point.
    pub start: i64,
    /// Switch closes at or below this position.
    pub home_at: i64,
    /// Steps past the trip point before the carriage hits the hard stop.
    pub overtravel: i64,
    /// Time per step pulse; zero runs as fast as possible.
    pub step_period: Duration,
    pub microsteps: u16,
}

impl Default for SimAxisConfig {
    fn default() -> Self {
        Self {
            start: 1000,
            home_at: 0,
            overtravel: 400,
            step_period: Duration::from_micros(200),
            microsteps: 16,
        }
    }
}

/// Counters for assertions in tests and `self-check`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub pulses: u64,
    pub moves: u64,
    pub enables: u64,
    pub disables: u64,
    pub blocked_pulses: u64,
}

struct Model {
    cfg: SimAxisConfig,
    position: i64,
    enabled: bool,
    profile: (u32, u32),
    forced: Option<bool>,
    last_pressed: bool,
    fail_next_move: bool,
    stats: SimStats,
    on_edge: Option<EdgeHook>,
}

impl Model {
    fn pressed(&self) -> bool {
        self.forced.unwrap_or(self.position <= self.cfg.home_at)
    }

    /// Fire the edge hook when the switch level changed. The hook runs with the
    /// model locked and must only post, never call back into the axis.
    fn notify_edge(&mut self) {
        let pressed = self.pressed();
        if pressed != self.last_pressed {
            self.last_pressed = pressed;
            if let Some(hook) = &self.on_edge {
                hook(pressed);
            }
        }
    }
}

/// Shared simulated axis; hand out [`SimulatedMotor`] and [`SimulatedSwitch`]
/// views to the controller and keep the axis for inspection.
#[derive(Clone)]
pub struct SimulatedAxis {
    inner: Arc<Mutex<Model>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for SimulatedAxis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let m = self.lock();
        f.debug_struct("SimulatedAxis")
            .field("position", &m.position)
            .field("pressed", &m.pressed())
            .field("stats", &m.stats)
            .finish()
    }
}

impl Default for SimulatedAxis {
    fn default() -> Self {
        Self::new(SimAxisConfig::default())
    }
}

impl SimulatedAxis {
    pub fn new(cfg: SimAxisConfig) -> Self {
        Self::with_clock(cfg, MonotonicClock::new())
    }

    pub fn with_clock(cfg: SimAxisConfig, clock: impl Clock + Send + Sync + 'static) -> Self {
        let model = Model {
            cfg,
            position: cfg.start,
            enabled: false,
            profile: (0, 0),
            forced: None,
            last_pressed: cfg.start <= cfg.home_at,
            fail_next_move: false,
            stats: SimStats::default(),
            on_edge: None,
        };
        Self {
            inner: Arc::new(Mutex::new(model)),
            clock: Arc::new(clock),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Model> {
        // A panicking test thread must not wedge the other views.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn motor(&self) -> SimulatedMotor {
        SimulatedMotor { axis: self.clone() }
    }

    pub fn switch(&self) -> SimulatedSwitch {
        SimulatedSwitch { axis: self.clone() }
    }

    /// Install the callback fired on every switch level change, the
    /// simulated counterpart of a GPIO edge interrupt.
    pub fn on_edge(&self, hook: impl Fn(bool) + Send + 'static) {
        self.lock().on_edge = Some(Box::new(hook));
    }

    pub fn position(&self) -> i64 {
        self.lock().position
    }

    pub fn set_position(&self, position: i64) {
        let mut m = self.lock();
        m.position = position;
        m.notify_edge();
    }

    pub fn is_pressed(&self) -> bool {
        self.lock().pressed()
    }

    /// Pin the switch to a level regardless of position (`None` releases
    /// the override). Models a stuck or externally pressed switch.
    pub fn force_switch(&self, level: Option<bool>) {
        let mut m = self.lock();
        m.forced = level;
        m.notify_edge();
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn speed_profile(&self) -> (u32, u32) {
        self.lock().profile
    }

    pub fn stats(&self) -> SimStats {
        self.lock().stats
    }

    /// Make the next `move_steps` fail with a GPIO error.
    pub fn fail_next_move(&self) {
        self.lock().fail_next_move = true;
    }

    fn step_once(&self, dir: i64) -> bool {
        let mut m = self.lock();
        let floor = m.cfg.home_at - m.cfg.overtravel;
        if dir < 0 && m.position <= floor {
            m.stats.blocked_pulses += 1;
            return false;
        }
        m.position += dir;
        m.stats.pulses += 1;
        m.notify_edge();
        true
    }
}

/// Motor view of a [`SimulatedAxis`].
#[derive(Debug, Clone)]
pub struct SimulatedMotor {
    axis: SimulatedAxis,
}

impl Motor for SimulatedMotor {
    fn enable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut m = self.axis.lock();
        m.enabled = true;
        m.stats.enables += 1;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut m = self.axis.lock();
        m.enabled = false;
        m.stats.disables += 1;
        Ok(())
    }

    fn set_speed_profile(
        &mut self,
        acceleration: u32,
        deceleration: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.axis.lock().profile = (acceleration, deceleration);
        Ok(())
    }

    fn move_steps(
        &mut self,
        delta: i64,
        halt: &dyn Fn() -> bool,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        let period = {
            let mut m = self.axis.lock();
            if std::mem::take(&mut m.fail_next_move) {
                return Err(Box::new(HwError::Gpio("simulated step line fault".into())));
            }
            if !m.enabled {
                tracing::warn!(delta, "simulated move while driver disabled");
            }
            m.stats.moves += 1;
            m.cfg.step_period
        };
        let dir = delta.signum();
        let mut issued: i64 = 0;
        while issued < delta.abs() {
            if halt() {
                break;
            }
            // A stalled carriage still consumes the pulse.
            self.axis.step_once(dir);
            issued += 1;
            self.axis.clock.sleep(period);
        }
        tracing::trace!(delta, issued, "simulated move done");
        Ok(issued * dir)
    }

    fn microsteps(&self) -> u16 {
        self.axis.lock().cfg.microsteps
    }
}

/// Limit switch view of a [`SimulatedAxis`].
#[derive(Debug, Clone)]
pub struct SimulatedSwitch {
    axis: SimulatedAxis,
}

impl LimitSwitch for SimulatedSwitch {
    fn is_pressed(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.axis.is_pressed())
    }
}
