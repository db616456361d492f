//! Endstop state shared between the debounce path and the motion path.
//!
//! The debounce thread is the only writer. Readers (motion halt predicate,
//! dispatcher, status) use plain atomic loads and never block.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Logical endstop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EndstopState {
    Released = 0,
    Triggered = 1,
    /// A raw edge was seen and has not been accepted or rejected yet.
    Debouncing = 2,
}

impl EndstopState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Triggered,
            2 => Self::Debouncing,
            _ => Self::Released,
        }
    }

    fn from_pressed(pressed: bool) -> Self {
        if pressed {
            Self::Triggered
        } else {
            Self::Released
        }
    }
}

/// Result of feeding one raw level to the [`Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Accepted(EndstopState),
    /// Level changed again inside the gate; discarded.
    Bounce,
    /// Same level as already accepted.
    Unchanged,
}

/// Minimum-interval gate over raw switch levels.
///
/// A level is accepted only if it differs from the last accepted level and
/// `min_interval` has passed since the last accepted transition, so two edges
/// inside the gate yield one transition.
#[derive(Debug, Clone)]
pub struct Debouncer {
    min_interval: Duration,
    accepted: bool,
    last_accept: Option<Instant>,
}

impl Debouncer {
    pub fn new(initial_pressed: bool, min_interval: Duration) -> Self {
        Self {
            min_interval,
            accepted: initial_pressed,
            last_accept: None,
        }
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }

    pub fn observe(&mut self, pressed: bool, now: Instant) -> Observation {
        if pressed == self.accepted {
            return Observation::Unchanged;
        }
        if self.remaining_gap(now) > Duration::ZERO {
            return Observation::Bounce;
        }
        self.accepted = pressed;
        self.last_accept = Some(now);
        Observation::Accepted(EndstopState::from_pressed(pressed))
    }

    /// Time left until a new transition could be accepted.
    pub fn remaining_gap(&self, now: Instant) -> Duration {
        match self.last_accept {
            Some(t) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(t)),
            None => Duration::ZERO,
        }
    }
}

/// Lock-free published endstop state.
///
/// `is_triggered` reports the last *accepted* level, so a pending edge
/// (`Debouncing`) never opens a window in which a triggered switch reads as
/// released.
#[derive(Debug)]
pub struct EndstopSignal {
    state: AtomicU8,
    pressed: AtomicBool,
    trigger_epoch: AtomicU64,
}

impl EndstopSignal {
    pub fn new(initial_pressed: bool) -> Self {
        Self {
            state: AtomicU8::new(EndstopState::from_pressed(initial_pressed) as u8),
            pressed: AtomicBool::new(initial_pressed),
            trigger_epoch: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> EndstopState {
        EndstopState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.pressed.load(Ordering::Acquire)
    }

    /// Incremented on every accepted `Triggered` transition.
    #[inline]
    pub fn trigger_epoch(&self) -> u64 {
        self.trigger_epoch.load(Ordering::Acquire)
    }

    /// Raw line level for reports: 1 = released (pulled up), 0 = triggered.
    pub fn line_level(&self) -> u8 {
        u8::from(!self.is_triggered())
    }

    /// Mark an edge as pending.
    pub fn begin_debounce(&self) {
        self.state
            .store(EndstopState::Debouncing as u8, Ordering::Release);
    }

    /// Publish a debouncer verdict. Bounce and unchanged observations drop
    /// the pending marker and fall back to the accepted level.
    pub fn apply(&self, obs: Observation) {
        match obs {
            Observation::Accepted(state) => {
                let pressed = state == EndstopState::Triggered;
                if pressed {
                    self.trigger_epoch.fetch_add(1, Ordering::AcqRel);
                }
                self.pressed.store(pressed, Ordering::Release);
                self.state.store(state as u8, Ordering::Release);
                tracing::info!(endstop = ?state, "endstop transition accepted");
            }
            Observation::Bounce | Observation::Unchanged => {
                let settled = EndstopState::from_pressed(self.is_triggered());
                self.state.store(settled as u8, Ordering::Release);
                if obs == Observation::Bounce {
                    tracing::debug!("endstop bounce rejected");
                }
            }
        }
    }
}
