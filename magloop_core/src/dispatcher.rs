//! Command dispatcher: validates requests against the controller state and
//! serialises move/park execution behind a single in-flight guard.

use std::sync::{Arc, Mutex, MutexGuard};

use magloop_traits::{Clock, Motor};

use crate::command::{Direction, MoveCommand, parse_move};
use crate::config::DeviceCfg;
use crate::error::{ControllerError, Result};
use crate::motion::{MotionController, MoveOutcome, ParkOutcome};
use crate::state::{ControllerState, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub outcome: MoveOutcome,
    /// State at the moment of decision (after the move, if one ran).
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkReport {
    pub outcome: ParkOutcome,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoReport {
    pub identity: String,
    pub snapshot: Snapshot,
}

/// Pre-motion checks, in order: endstop, then travel window.
///
/// While the endstop is triggered every move is refused, except forward
/// moves after a completed park; those are what release the switch. The
/// exemption lasts until a reverse move or a fresh trigger.
pub fn validate(cmd: &MoveCommand, snap: &Snapshot) -> Option<MoveOutcome> {
    if snap.triggered {
        let leaving_home = snap.leaving_home && cmd.direction == Direction::Forward;
        if !leaving_home {
            return Some(MoveOutcome::RejectedEndstopTriggered);
        }
    }
    let target = snap.position.saturating_add(cmd.delta());
    if target > snap.max_travel {
        Some(MoveOutcome::RejectedMaxPosition)
    } else if target < 0 {
        Some(MoveOutcome::RejectedMinPosition)
    } else {
        None
    }
}

pub struct Dispatcher<M: Motor, C: Clock> {
    motion: Mutex<MotionController<M, C>>,
    state: Arc<ControllerState>,
    device: DeviceCfg,
}

impl<M: Motor, C: Clock> core::fmt::Debug for Dispatcher<M, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("snapshot", &self.state.snapshot())
            .field("identity", &self.device.identity)
            .finish()
    }
}

impl<M: Motor, C: Clock> Dispatcher<M, C> {
    pub fn new(motion: MotionController<M, C>, device: DeviceCfg) -> Self {
        let state = motion.state().clone();
        Self {
            motion: Mutex::new(motion),
            state,
            device,
        }
    }

    pub fn state(&self) -> &Arc<ControllerState> {
        &self.state
    }

    fn lock(&self) -> Result<MutexGuard<'_, MotionController<M, C>>> {
        self.motion.lock().map_err(|_| {
            eyre::Report::new(ControllerError::State(
                "motion controller poisoned by an earlier panic".into(),
            ))
        })
    }

    /// Handle a raw `/move` body.
    pub fn handle_move(&self, body: &[u8]) -> Result<MoveReport> {
        match parse_move(body) {
            Ok(cmd) => self.handle_move_command(&cmd),
            Err(m) => {
                tracing::debug!(reason = %m, "malformed move request");
                Ok(MoveReport {
                    outcome: MoveOutcome::RejectedMalformed(m),
                    snapshot: self.state.snapshot(),
                })
            }
        }
    }

    pub fn handle_move_command(&self, cmd: &MoveCommand) -> Result<MoveReport> {
        let mut motion = self.lock()?;
        let snapshot = self.state.snapshot();
        if let Some(outcome) = validate(cmd, &snapshot) {
            tracing::info!(
                delta = cmd.delta(),
                position = snapshot.position,
                triggered = snapshot.triggered,
                ?outcome,
                "move rejected"
            );
            return Ok(MoveReport { outcome, snapshot });
        }
        let outcome = motion.execute_move(cmd)?;
        Ok(MoveReport {
            outcome,
            snapshot: self.state.snapshot(),
        })
    }

    /// Always permitted; blocks until parked or the park bound is hit.
    pub fn handle_park(&self) -> Result<ParkReport> {
        let mut motion = self.lock()?;
        let outcome = motion.park()?;
        Ok(ParkReport {
            outcome,
            snapshot: self.state.snapshot(),
        })
    }

    /// Read-only; does not wait for a move in flight.
    pub fn handle_info(&self) -> InfoReport {
        InfoReport {
            identity: self.device.identity.clone(),
            snapshot: self.state.snapshot(),
        }
    }
}
