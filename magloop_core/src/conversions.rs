//! `From` implementations bridging `magloop_config` types to `magloop_core` types.

use std::time::Duration;

use crate::config::{DeviceCfg, EndstopCfg, EndstopStrategy, ParkCfg, TravelCfg};

// ── TravelCfg ────────────────────────────────────────────────────────────────

impl From<&magloop_config::TravelCfg> for TravelCfg {
    fn from(c: &magloop_config::TravelCfg) -> Self {
        Self {
            max_travel: c.max_travel,
        }
    }
}

// ── ParkCfg ──────────────────────────────────────────────────────────────────

impl From<&magloop_config::ParkCfg> for ParkCfg {
    fn from(c: &magloop_config::ParkCfg) -> Self {
        Self {
            step_size: c.step_size,
            acceleration: c.acceleration,
            deceleration: c.deceleration,
            settle: Duration::from_micros(c.settle_us),
            max_iterations: c.max_iterations,
        }
    }
}

// ── EndstopCfg ───────────────────────────────────────────────────────────────

impl From<magloop_config::EndstopStrategy> for EndstopStrategy {
    fn from(s: magloop_config::EndstopStrategy) -> Self {
        match s {
            magloop_config::EndstopStrategy::Edge => Self::Edge,
            magloop_config::EndstopStrategy::Poll => Self::Poll,
        }
    }
}

impl From<&magloop_config::EndstopCfg> for EndstopCfg {
    fn from(c: &magloop_config::EndstopCfg) -> Self {
        Self {
            strategy: c.strategy.into(),
            min_interval: Duration::from_millis(c.debounce_ms),
            poll_interval: Duration::from_micros(c.poll_us),
        }
    }
}

// ── DeviceCfg ────────────────────────────────────────────────────────────────

impl From<&magloop_config::DeviceCfg> for DeviceCfg {
    fn from(c: &magloop_config::DeviceCfg) -> Self {
        Self {
            identity: c.identity.clone(),
        }
    }
}
