//! Motion controller: the single owner of the motor and the only writer of
//! the step position.
//!
//! State machine: `Idle -> Moving -> Idle(Completed | AbortedByEndstop)`.
//! Parking is a sequence of short toward-home moves whose terminal condition
//! is the endstop rather than a step count.

use std::sync::Arc;

use magloop_traits::{Clock, Motor};

use crate::command::{Direction, Malformed, MoveCommand};
use crate::config::ParkCfg;
use crate::error::Result;
use crate::hw_error::hw;
use crate::state::ControllerState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Completed,
    RejectedMaxPosition,
    RejectedMinPosition,
    RejectedEndstopTriggered,
    RejectedMalformed(Malformed),
    /// Halted part-way by an endstop trigger accepted during the move.
    AbortedByEndstop,
}

impl MoveOutcome {
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RejectedMaxPosition
                | Self::RejectedMinPosition
                | Self::RejectedEndstopTriggered
                | Self::RejectedMalformed(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkOutcome {
    Parked,
    /// `max_iterations` exhausted before the switch closed.
    LimitReached,
}

pub struct MotionController<M: Motor, C: Clock> {
    motor: M,
    clock: C,
    state: Arc<ControllerState>,
    park: ParkCfg,
}

impl<M: Motor, C: Clock> core::fmt::Debug for MotionController<M, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MotionController")
            .field("position", &self.state.position())
            .field("park", &self.park)
            .finish()
    }
}

impl<M: Motor, C: Clock> MotionController<M, C> {
    pub fn new(motor: M, clock: C, state: Arc<ControllerState>, park: ParkCfg) -> Self {
        Self {
            motor,
            clock,
            state,
            park,
        }
    }

    pub fn state(&self) -> &Arc<ControllerState> {
        &self.state
    }

    /// Run one bounded move. Travel limits are checked by the dispatcher;
    /// only the endstop is re-checked here.
    pub fn execute_move(&mut self, cmd: &MoveCommand) -> Result<MoveOutcome> {
        let endstop = self.state.endstop().clone();
        if cmd.direction == Direction::Reverse && endstop.is_triggered() {
            tracing::info!(steps = cmd.steps, "reverse move refused: endstop triggered");
            return Ok(MoveOutcome::RejectedEndstopTriggered);
        }
        if cmd.steps == 0 {
            return Ok(MoveOutcome::Completed);
        }

        // Only a trigger accepted after this point halts the move; a forward
        // move leaving the switch starts with it already closed.
        let start_epoch = endstop.trigger_epoch();
        let halt = || endstop.is_triggered() && endstop.trigger_epoch() != start_epoch;

        let delta = cmd.delta();
        let issued = self.run_steps(delta, cmd.acceleration, cmd.deceleration, &halt)?;
        let position = self.apply(issued);

        if issued != delta {
            tracing::warn!(delta, issued, position, "move halted by endstop");
            Ok(MoveOutcome::AbortedByEndstop)
        } else {
            tracing::info!(delta, position, "move complete");
            Ok(MoveOutcome::Completed)
        }
    }

    /// Step toward home in `park.step_size` increments until the endstop
    /// reads triggered, then re-reference position to 0.
    pub fn park(&mut self) -> Result<ParkOutcome> {
        let endstop = self.state.endstop().clone();
        let halt = || endstop.is_triggered();
        let step = -i64::from(self.park.step_size);
        let mut iterations: u32 = 0;

        while !endstop.is_triggered() {
            if self.park.max_iterations.is_some_and(|max| iterations >= max) {
                tracing::warn!(iterations, position = self.state.position(), "park limit reached");
                return Ok(ParkOutcome::LimitReached);
            }
            let issued = self.run_steps(step, self.park.acceleration, self.park.deceleration, &halt)?;
            self.apply(issued);
            iterations += 1;
            self.clock.sleep(self.park.settle);
        }

        self.state.set_position(0);
        self.state.mark_home();
        tracing::info!(iterations, "parked at home");
        Ok(ParkOutcome::Parked)
    }

    /// Enable, run, and always disable again, even when the move fails.
    fn run_steps(&mut self, delta: i64, accel: u32, decel: u32, halt: &dyn Fn() -> bool) -> Result<i64> {
        hw(self.motor.enable(), "enable motor")?;
        let moved = hw(self.motor.set_speed_profile(accel, decel), "set speed profile")
            .and_then(|()| hw(self.motor.move_steps(delta, halt), "move steps"));
        let disabled = hw(self.motor.disable(), "disable motor");
        if moved.is_err() {
            // The carriage may have moved by an unknown amount.
            self.state.clear_leaving_home();
        }
        let issued = moved?;
        disabled?;
        Ok(issued)
    }

    /// Account for issued steps, holding the position inside the travel window.
    fn apply(&mut self, issued: i64) -> i64 {
        if issued == 0 {
            return self.state.position();
        }
        let raw = self.state.position().saturating_add(issued);
        let position = raw.clamp(0, self.state.max_travel());
        if position != raw {
            tracing::warn!(raw, position, "position clamped to travel window");
        }
        self.state.set_position(position);
        // Forward motion keeps the exemption: park may have overshot the
        // trip point by more than the first move out.
        if issued < 0 {
            self.state.clear_leaving_home();
        }
        position
    }
}
