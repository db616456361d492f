//! Process-wide controller state, created once at startup and shared by `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use crate::endstop::{EndstopSignal, EndstopState};

/// Point-in-time view used for validation and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub position: i64,
    pub max_travel: i64,
    pub endstop: EndstopState,
    pub triggered: bool,
    /// Parked, and the switch has not re-triggered since: forward moves may
    /// still run with the switch closed.
    pub leaving_home: bool,
    pub microsteps: u16,
}

impl Snapshot {
    /// Raw line level as reported on the wire: 1 = released, 0 = triggered.
    pub fn line_level(&self) -> u8 {
        u8::from(!self.triggered)
    }
}

#[derive(Debug)]
pub struct ControllerState {
    position: AtomicI64,
    max_travel: i64,
    endstop: Arc<EndstopSignal>,
    leaving_home: AtomicBool,
    /// Trigger epoch recorded by the last successful park.
    home_epoch: AtomicU64,
    microsteps: u16,
}

impl ControllerState {
    /// Position starts at 0; the axis is only referenced after a park.
    pub fn new(max_travel: i64, endstop: Arc<EndstopSignal>, microsteps: u16) -> Self {
        Self {
            position: AtomicI64::new(0),
            max_travel,
            endstop,
            leaving_home: AtomicBool::new(false),
            home_epoch: AtomicU64::new(0),
            microsteps,
        }
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn max_travel(&self) -> i64 {
        self.max_travel
    }

    pub fn endstop(&self) -> &Arc<EndstopSignal> {
        &self.endstop
    }

    /// True from a successful park until the carriage moves back toward
    /// home or the switch triggers again.
    pub fn is_leaving_home(&self) -> bool {
        self.leaving_home.load(Ordering::Acquire)
            && self.home_epoch.load(Ordering::Acquire) == self.endstop.trigger_epoch()
    }

    pub fn microsteps(&self) -> u16 {
        self.microsteps
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            position: self.position(),
            max_travel: self.max_travel,
            endstop: self.endstop.state(),
            triggered: self.endstop.is_triggered(),
            leaving_home: self.is_leaving_home(),
            microsteps: self.microsteps,
        }
    }

    // Writers below are only reached from the motion controller, which runs
    // under the dispatcher's in-flight guard.

    pub(crate) fn set_position(&self, position: i64) {
        self.position.store(position, Ordering::Release);
    }

    pub(crate) fn mark_home(&self) {
        self.home_epoch
            .store(self.endstop.trigger_epoch(), Ordering::Release);
        self.leaving_home.store(true, Ordering::Release);
    }

    pub(crate) fn clear_leaving_home(&self) {
        self.leaving_home.store(false, Ordering::Release);
    }
}
