//! Type-state builder for `Controller`.
//!
//! The builder enforces at compile time that a motor and a limit switch are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use magloop_traits::{Clock, LimitSwitch, MonotonicClock, Motor};

use crate::config::{DeviceCfg, EndstopCfg, ParkCfg, TravelCfg};
use crate::dispatcher::Dispatcher;
use crate::endstop::EndstopSignal;
use crate::error::{BuildError, Result};
use crate::hw_error::hw;
use crate::monitor::{EdgeSender, EndstopMonitor};
use crate::motion::MotionController;
use crate::state::ControllerState;

pub type DynMotor = Box<dyn Motor + Send>;
pub type DynClock = Arc<dyn Clock + Send + Sync>;
pub type DynDispatcher = Dispatcher<DynMotor, DynClock>;

struct DynSwitch(Box<dyn LimitSwitch + Send>);

impl LimitSwitch for DynSwitch {
    fn is_pressed(&self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        self.0.is_pressed()
    }
}

/// A running controller: the dispatcher plus the endstop monitor feeding it.
///
/// Dropping the controller stops the monitor thread.
pub struct Controller {
    dispatcher: Arc<DynDispatcher>,
    monitor: EndstopMonitor,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("dispatcher", &self.dispatcher)
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl Controller {
    pub fn builder() -> ControllerBuilder<Missing, Missing> {
        ControllerBuilder::default()
    }

    /// Shared handle for transport workers.
    pub fn dispatcher(&self) -> &Arc<DynDispatcher> {
        &self.dispatcher
    }

    pub fn state(&self) -> &Arc<ControllerState> {
        self.dispatcher.state()
    }

    /// Wire this into the GPIO edge interrupt (edge strategy only).
    pub fn edge_sender(&self) -> Option<EdgeSender> {
        self.monitor.edge_sender()
    }

    pub fn monitor(&self) -> &EndstopMonitor {
        &self.monitor
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ControllerBuilder<M, S> {
    motor: Option<DynMotor>,
    switch: Option<Box<dyn LimitSwitch + Send>>,
    travel: Option<TravelCfg>,
    park: Option<ParkCfg>,
    endstop: Option<EndstopCfg>,
    device: Option<DeviceCfg>,
    clock: Option<DynClock>,
    _m: PhantomData<M>,
    _s: PhantomData<S>,
}

impl Default for ControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            motor: None,
            switch: None,
            travel: None,
            park: None,
            endstop: None,
            device: None,
            clock: None,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<M, S> ControllerBuilder<M, S> {
    fn retype<M2, S2>(self) -> ControllerBuilder<M2, S2> {
        ControllerBuilder {
            motor: self.motor,
            switch: self.switch,
            travel: self.travel,
            park: self.park,
            endstop: self.endstop,
            device: self.device,
            clock: self.clock,
            _m: PhantomData,
            _s: PhantomData,
        }
    }

    pub fn with_motor(mut self, motor: impl Motor + Send + 'static) -> ControllerBuilder<Set, S> {
        self.motor = Some(Box::new(motor));
        self.retype()
    }

    pub fn with_switch(
        mut self,
        switch: impl LimitSwitch + Send + 'static,
    ) -> ControllerBuilder<M, Set> {
        self.switch = Some(Box::new(switch));
        self.retype()
    }

    pub fn with_travel(mut self, travel: TravelCfg) -> Self {
        self.travel = Some(travel);
        self
    }

    pub fn with_park(mut self, park: ParkCfg) -> Self {
        self.park = Some(park);
        self
    }

    pub fn with_endstop(mut self, endstop: EndstopCfg) -> Self {
        self.endstop = Some(endstop);
        self
    }

    pub fn with_device(mut self, device: DeviceCfg) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Controller> {
        let motor = self
            .motor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;
        let switch = self
            .switch
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSwitch))?;
        let travel = self.travel.unwrap_or_default();
        let park = self.park.unwrap_or_default();
        let endstop = self.endstop.unwrap_or_default();

        if travel.max_travel <= 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max_travel must be > 0",
            )));
        }
        if park.step_size == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "park step_size must be > 0",
            )));
        }
        if park.acceleration == 0 || park.deceleration == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "park acceleration and deceleration must be > 0",
            )));
        }
        if endstop.min_interval.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "debounce interval must be > 0",
            )));
        }
        if endstop.poll_interval.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "poll interval must be > 0",
            )));
        }

        let clock: DynClock = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let switch = DynSwitch(switch);
        let initial = hw(switch.is_pressed(), "read endstop at startup")?;
        let signal = Arc::new(EndstopSignal::new(initial));
        let monitor = EndstopMonitor::spawn(switch, signal.clone(), &endstop, clock.clone());

        let state = Arc::new(ControllerState::new(
            travel.max_travel,
            signal,
            motor.microsteps(),
        ));
        tracing::info!(
            max_travel = travel.max_travel,
            strategy = ?endstop.strategy,
            endstop_triggered = initial,
            "controller ready"
        );
        let motion = MotionController::new(motor, clock, state, park);
        let dispatcher = Arc::new(Dispatcher::new(motion, self.device.unwrap_or_default()));
        Ok(Controller {
            dispatcher,
            monitor,
        })
    }
}

impl ControllerBuilder<Set, Set> {
    pub fn build(self) -> Result<Controller> {
        self.try_build()
    }
}
