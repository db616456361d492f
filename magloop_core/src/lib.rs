#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Motion-control and safety-interlock engine (hardware-agnostic).
//!
//! All hardware interaction goes through `magloop_traits::Motor` and
//! `magloop_traits::LimitSwitch`.
//!
//! ## Architecture
//!
//! - **Endstop**: debouncer and lock-free published state (`endstop`),
//!   background poll/edge monitors (`monitor`)
//! - **Motion**: bounded moves and incremental parking; sole writer of the
//!   step position (`motion`)
//! - **Dispatch**: request validation and the in-flight guard (`dispatcher`)
//! - **Status**: response formatting (`status`)
//!
//! Position is counted in microsteps from home. Positive deltas move away
//! from home.

pub mod builder;
pub mod command;
pub mod config;
pub mod conversions;
pub mod dispatcher;
pub mod endstop;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod motion;
pub mod state;
pub mod status;

pub use builder::{Controller, ControllerBuilder, DynClock, DynDispatcher, DynMotor};
pub use command::{Direction, Malformed, MoveCommand, parse_move};
pub use config::{DeviceCfg, EndstopCfg, EndstopStrategy, ParkCfg, TravelCfg};
pub use dispatcher::{Dispatcher, InfoReport, MoveReport, ParkReport};
pub use endstop::{Debouncer, EndstopSignal, EndstopState, Observation};
pub use error::{BuildError, ControllerError, Result};
pub use monitor::{EdgeEvent, EdgeSender, EndstopMonitor};
pub use motion::{MotionController, MoveOutcome, ParkOutcome};
pub use state::{ControllerState, Snapshot};
pub use status::{Reply, StatusReport};
