//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "magloop", version, about = "Magnetic loop tuner controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/magloop.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Travel direction as accepted on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    /// Away from home (wire value 0)
    Forward,
    /// Toward home (wire value 1)
    Reverse,
}

impl From<DirectionArg> for magloop_core::Direction {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Forward => Self::Forward,
            DirectionArg::Reverse => Self::Reverse,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the REST interface until interrupted
    Serve {
        /// Listen port (overrides server.port; 0 picks a free port)
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
        /// Listen address (overrides server.bind)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Run one move against the configured backend and print the status
    Move {
        #[arg(long, value_enum)]
        direction: DirectionArg,
        /// Microsteps to travel
        #[arg(long)]
        steps: u32,
        /// Steps/s² (defaults to motor.acceleration)
        #[arg(long)]
        acceleration: Option<u32>,
        /// Steps/s² (defaults to motor.deceleration)
        #[arg(long)]
        deceleration: Option<u32>,
    },
    /// Drive toward home until the endstop triggers
    Park,
    /// Print identity, position and endstop level
    Info,
    /// Quick health check (backend builds, endstop readable)
    SelfCheck,
}
