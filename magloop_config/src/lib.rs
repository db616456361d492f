#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the loop controller.
//!
//! `Config` and its sections are deserialized from TOML and then checked with
//! [`Config::validate`]. Every section except `[pins]` has defaults matching
//! the reference hardware (200 step/rev motor at 1/16 microstepping, 7000
//! steps of travel, 100 ms endstop debounce, REST port 8080).
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub step: u8,
    pub dir: u8,
    pub enable: Option<u8>,
    pub endstop: u8,
    /// A4988-style microstep select lines; all three or none.
    pub ms1: Option<u8>,
    pub ms2: Option<u8>,
    pub ms3: Option<u8>,
    /// SPI bus/slave-select for the chip driver backend.
    #[serde(default)]
    pub spi_bus: u8,
    #[serde(default)]
    pub spi_cs: u8,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-process model of the axis and its home switch.
    #[default]
    Simulated,
    /// Step/dir driver with microstep select lines, pulses timed in software.
    Software,
    /// Driver chip with its own motion engine, commanded over SPI.
    Hardware,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotorCfg {
    pub driver: DriverKind,
    pub steps_per_rev: u32,
    pub rpm: u32,
    pub microsteps: u16,
    /// Default profile used at start-up (steps/s²).
    pub acceleration: u32,
    pub deceleration: u32,
    /// Driver enable input is asserted low (A4988/DRV8825 style).
    pub enable_active_low: bool,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            driver: DriverKind::Simulated,
            steps_per_rev: 200,
            rpm: 50,
            microsteps: 16,
            acceleration: 6000,
            deceleration: 3500,
            enable_active_low: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TravelCfg {
    /// Maximum step count away from home.
    pub max_travel: i64,
}

impl Default for TravelCfg {
    fn default() -> Self {
        Self { max_travel: 7000 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndstopStrategy {
    /// GPIO edge interrupt hands off to a debounce thread.
    #[default]
    Edge,
    /// Fixed-interval sampling of the raw pin.
    Poll,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EndstopCfg {
    pub strategy: EndstopStrategy,
    /// Switch pulls the line low when pressed.
    pub active_low: bool,
    /// Minimum interval between accepted transitions (ms).
    pub debounce_ms: u64,
    /// Sampling period for the poll strategy (µs).
    pub poll_us: u64,
}

impl Default for EndstopCfg {
    fn default() -> Self {
        Self {
            strategy: EndstopStrategy::Edge,
            active_low: true,
            debounce_ms: 100,
            poll_us: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ParkCfg {
    /// Steps per toward-home increment.
    pub step_size: u32,
    pub acceleration: u32,
    pub deceleration: u32,
    /// Pause between increments (µs).
    pub settle_us: u64,
    /// Upper bound on increments; absent means park blocks until the switch closes.
    pub max_iterations: Option<u32>,
}

impl Default for ParkCfg {
    fn default() -> Self {
        Self {
            step_size: 5,
            acceleration: 1000,
            deceleration: 1000,
            settle_us: 10,
            max_iterations: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
    pub bind: String,
    pub port: u16,
    /// Number of connection worker threads.
    pub workers: usize,
    /// Socket read timeout per connection (ms).
    pub read_timeout_ms: u64,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            workers: 2,
            read_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchdogCfg {
    /// `host:port` probed with a TCP connect; unset disables the watchdog.
    pub target: Option<String>,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for WatchdogCfg {
    fn default() -> Self {
        Self {
            target: None,
            interval_ms: 30_000,
            timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceCfg {
    /// Reported as `status` by `/info`.
    pub identity: String,
    /// Heartbeat log period (ms); 0 disables it.
    pub heartbeat_ms: u64,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            identity: "magloop-ctrl".to_string(),
            heartbeat_ms: 2_500,
        }
    }
}

/// Carriage model used when `motor.driver = "simulated"`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    /// Carriage start position in steps above the switch trip point.
    pub start: i64,
    /// Time per step pulse (µs); 0 runs as fast as possible.
    pub step_us: u64,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            start: 1000,
            step_us: 200,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub motor: MotorCfg,
    #[serde(default)]
    pub travel: TravelCfg,
    #[serde(default)]
    pub endstop: EndstopCfg,
    #[serde(default)]
    pub park: ParkCfg,
    #[serde(default)]
    pub server: ServerCfg,
    #[serde(default)]
    pub watchdog: WatchdogCfg,
    #[serde(default)]
    pub device: DeviceCfg,
    #[serde(default)]
    pub sim: SimCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()
        .map_err(|e| eyre::eyre!("invalid configuration in {}: {}", path.display(), e))?;
    Ok(cfg)
}

const MICROSTEP_DIVISORS: [u16; 5] = [1, 2, 4, 8, 16];

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Motor
        if self.motor.steps_per_rev == 0 {
            eyre::bail!("motor.steps_per_rev must be > 0");
        }
        if self.motor.rpm == 0 {
            eyre::bail!("motor.rpm must be > 0");
        }
        if !MICROSTEP_DIVISORS.contains(&self.motor.microsteps) {
            eyre::bail!("motor.microsteps must be one of 1, 2, 4, 8, 16");
        }
        if self.motor.acceleration == 0 || self.motor.deceleration == 0 {
            eyre::bail!("motor.acceleration and motor.deceleration must be > 0");
        }

        // Pins
        let ms = [self.pins.ms1, self.pins.ms2, self.pins.ms3];
        let ms_set = ms.iter().filter(|p| p.is_some()).count();
        if ms_set != 0 && ms_set != 3 {
            eyre::bail!("pins.ms1, pins.ms2 and pins.ms3 must be set together");
        }

        // Travel
        if self.travel.max_travel <= 0 {
            eyre::bail!("travel.max_travel must be > 0");
        }
        if self.travel.max_travel > i64::from(i32::MAX) {
            eyre::bail!("travel.max_travel is unreasonably large (> i32::MAX steps)");
        }

        // Endstop
        if self.endstop.debounce_ms == 0 {
            eyre::bail!("endstop.debounce_ms must be >= 1");
        }
        if self.endstop.debounce_ms > 10_000 {
            eyre::bail!("endstop.debounce_ms is unreasonably large (>10s)");
        }
        if self.endstop.poll_us == 0 {
            eyre::bail!("endstop.poll_us must be >= 1");
        }

        // Park
        if self.park.step_size == 0 {
            eyre::bail!("park.step_size must be > 0");
        }
        if i64::from(self.park.step_size) > self.travel.max_travel {
            eyre::bail!("park.step_size must not exceed travel.max_travel");
        }
        if self.park.acceleration == 0 || self.park.deceleration == 0 {
            eyre::bail!("park.acceleration and park.deceleration must be > 0");
        }
        if self.park.max_iterations == Some(0) {
            eyre::bail!("park.max_iterations must be >= 1 when set");
        }

        // Server
        if self.server.workers == 0 {
            eyre::bail!("server.workers must be >= 1");
        }
        if self.server.workers > 16 {
            eyre::bail!("server.workers must be <= 16");
        }
        if self.server.read_timeout_ms == 0 {
            eyre::bail!("server.read_timeout_ms must be >= 1");
        }

        // Watchdog
        if let Some(target) = &self.watchdog.target
            && target.trim().is_empty()
        {
            eyre::bail!("watchdog.target must not be empty when set");
        }
        if self.watchdog.interval_ms == 0 {
            eyre::bail!("watchdog.interval_ms must be >= 1");
        }
        if self.watchdog.timeout_ms == 0 {
            eyre::bail!("watchdog.timeout_ms must be >= 1");
        }

        // Device
        if self.device.identity.trim().is_empty() {
            eyre::bail!("device.identity must not be empty");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
