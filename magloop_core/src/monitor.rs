//! Background endstop monitoring.
//!
//! Two strategies feed the same [`Debouncer`]:
//! - poll: a thread samples the raw line every `poll_interval`;
//! - edge: the interrupt context posts an [`EdgeEvent`] on a single-slot
//!   channel and a dedicated debounce thread does the stabilisation work
//!   outside interrupt context.
//!
//! Each monitor owns exactly one thread, shut down and joined on drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use magloop_traits::{Clock, LimitSwitch};

use crate::config::{EndstopCfg, EndstopStrategy};
use crate::endstop::{Debouncer, EndstopSignal, Observation};

/// Upper bound on how long a debounce thread waits before re-checking its
/// shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Raw edge seen by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub pressed: bool,
}

/// Producer half handed to the interrupt context.
#[derive(Debug, Clone)]
pub struct EdgeSender {
    tx: xch::Sender<EdgeEvent>,
}

impl EdgeSender {
    /// Never blocks. If an edge is already pending it is coalesced: the
    /// debounce thread re-reads the line anyway.
    pub fn post(&self, pressed: bool) {
        let _ = self.tx.try_send(EdgeEvent { pressed });
    }
}

pub struct EndstopMonitor {
    strategy: EndstopStrategy,
    edge_tx: Option<EdgeSender>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl core::fmt::Debug for EndstopMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EndstopMonitor")
            .field("strategy", &self.strategy)
            .field("running", &self.join_handle.is_some())
            .finish()
    }
}

fn read_level<S: LimitSwitch>(switch: &S, failing: &mut bool) -> Option<bool> {
    match switch.is_pressed() {
        Ok(p) => {
            if *failing {
                tracing::info!("endstop read recovered");
                *failing = false;
            }
            Some(p)
        }
        Err(e) => {
            if !*failing {
                tracing::warn!(error = %e, "endstop read failed");
                *failing = true;
            }
            None
        }
    }
}

impl EndstopMonitor {
    /// Spawn the monitor selected by `cfg.strategy`.
    pub fn spawn<S, C>(switch: S, signal: Arc<EndstopSignal>, cfg: &EndstopCfg, clock: C) -> Self
    where
        S: LimitSwitch + Send + 'static,
        C: Clock + Send + 'static,
    {
        match cfg.strategy {
            EndstopStrategy::Poll => Self::spawn_poll(switch, signal, cfg, clock),
            EndstopStrategy::Edge => Self::spawn_edge(switch, signal, cfg, clock),
        }
    }

    pub fn spawn_poll<S, C>(switch: S, signal: Arc<EndstopSignal>, cfg: &EndstopCfg, clock: C) -> Self
    where
        S: LimitSwitch + Send + 'static,
        C: Clock + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let period = cfg.poll_interval;
        let mut debouncer = Debouncer::new(signal.is_triggered(), cfg.min_interval);

        let join_handle = std::thread::spawn(move || {
            let mut failing = false;
            while !shutdown_clone.load(Ordering::Relaxed) {
                if let Some(pressed) = read_level(&switch, &mut failing) {
                    match debouncer.observe(pressed, clock.now()) {
                        Observation::Unchanged => {}
                        obs => signal.apply(obs),
                    }
                }
                clock.sleep(period);
            }
            tracing::trace!("endstop poll thread exiting cleanly");
        });

        Self {
            strategy: EndstopStrategy::Poll,
            edge_tx: None,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn spawn_edge<S, C>(switch: S, signal: Arc<EndstopSignal>, cfg: &EndstopCfg, clock: C) -> Self
    where
        S: LimitSwitch + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (tx, rx) = xch::bounded::<EdgeEvent>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let min_interval = cfg.min_interval;
        let mut debouncer = Debouncer::new(signal.is_triggered(), min_interval);

        let join_handle = std::thread::spawn(move || {
            let mut failing = false;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                let ev = match rx.recv_timeout(SHUTDOWN_POLL) {
                    Ok(ev) => ev,
                    Err(xch::RecvTimeoutError::Timeout) => continue,
                    Err(xch::RecvTimeoutError::Disconnected) => break,
                };
                tracing::trace!(pressed = ev.pressed, "endstop edge");
                signal.begin_debounce();
                let mut wait = min_interval;
                loop {
                    clock.sleep(wait);
                    let Some(pressed) = read_level(&switch, &mut failing) else {
                        signal.apply(Observation::Unchanged);
                        break;
                    };
                    let now = clock.now();
                    let obs = debouncer.observe(pressed, now);
                    signal.apply(obs);
                    if obs != Observation::Bounce || shutdown_clone.load(Ordering::Relaxed) {
                        break;
                    }
                    // Re-arm until the gate since the last accepted transition is over.
                    signal.begin_debounce();
                    wait = debouncer.remaining_gap(now).max(Duration::from_millis(1));
                }
            }
            tracing::trace!("endstop debounce thread exiting cleanly");
        });

        Self {
            strategy: EndstopStrategy::Edge,
            edge_tx: Some(EdgeSender { tx }),
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn strategy(&self) -> EndstopStrategy {
        self.strategy
    }

    /// Handle for the interrupt context; `None` for the poll strategy.
    pub fn edge_sender(&self) -> Option<EdgeSender> {
        self.edge_tx.clone()
    }
}

impl Drop for EndstopMonitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("endstop monitor joined"),
                Err(e) => tracing::warn!(?e, "endstop monitor thread panicked during shutdown"),
            }
        }
    }
}
