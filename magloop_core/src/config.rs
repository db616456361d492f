//! Runtime configuration types for the motion engine.
//!
//! These are separate from the TOML-deserialized config in `magloop_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

/// Fixed travel window of the axis, in microsteps from home.
#[derive(Debug, Clone, Copy)]
pub struct TravelCfg {
    pub max_travel: i64,
}

impl Default for TravelCfg {
    fn default() -> Self {
        Self { max_travel: 7000 }
    }
}

/// Incremental homing parameters.
#[derive(Debug, Clone, Copy)]
pub struct ParkCfg {
    /// Steps per toward-home increment.
    pub step_size: u32,
    pub acceleration: u32,
    pub deceleration: u32,
    /// Pause between increments.
    pub settle: Duration,
    /// Give up after this many increments. `None` parks until the switch
    /// closes, however long that takes.
    pub max_iterations: Option<u32>,
}

impl Default for ParkCfg {
    fn default() -> Self {
        Self {
            step_size: 5,
            acceleration: 1000,
            deceleration: 1000,
            settle: Duration::from_micros(10),
            max_iterations: None,
        }
    }
}

/// How raw endstop edges reach the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndstopStrategy {
    /// Interrupt posts an edge event; a debounce thread re-reads after the gate.
    Edge,
    /// A thread samples the raw line at a fixed period.
    Poll,
}

#[derive(Debug, Clone, Copy)]
pub struct EndstopCfg {
    pub strategy: EndstopStrategy,
    /// Minimum spacing between accepted transitions.
    pub min_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for EndstopCfg {
    fn default() -> Self {
        Self {
            strategy: EndstopStrategy::Edge,
            min_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceCfg {
    /// Reported as the status of `/info`.
    pub identity: String,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            identity: "magloop-ctrl".to_string(),
        }
    }
}
