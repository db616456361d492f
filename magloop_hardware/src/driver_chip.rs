//! Stepper driver chip that executes moves itself (powerSTEP01 / L6470 class).
//!
//! The host only sends a relative `Move` command over SPI and polls the STATUS
//! register until the chip drops BUSY. Microstepping, the speed ramp and the
//! step pulses are generated by the chip. Steps actually issued are read back
//! from the 22-bit ABS_POS register.

use std::time::Duration;

use magloop_traits::{Clock, Motor};

use crate::error::{HwError, Result};
use crate::util::{pulse_rate_hz, wait_until};

pub mod cmd {
    pub const NOP: u8 = 0x00;
    pub const SET_PARAM: u8 = 0x00;
    pub const GET_PARAM: u8 = 0x20;
    pub const MOVE: u8 = 0x40;
    pub const SOFT_HIZ: u8 = 0xA0;
    pub const HARD_STOP: u8 = 0xB8;
    pub const GET_STATUS: u8 = 0xD0;
}

pub mod reg {
    pub const ABS_POS: u8 = 0x01;
    pub const ACC: u8 = 0x05;
    pub const DEC: u8 = 0x06;
    pub const MAX_SPEED: u8 = 0x07;
    pub const STEP_MODE: u8 = 0x16;
}

pub mod status {
    pub const HIZ: u16 = 1 << 0;
    /// Active low: 0 while a motion command runs.
    pub const BUSY_N: u16 = 1 << 1;
    pub const UVLO_N: u16 = 1 << 9;
    pub const OCD_N: u16 = 1 << 13;
}

/// Largest relative move the chip accepts in one command.
pub const MAX_MOVE: u32 = (1 << 22) - 1;

const ABS_POS_BITS: u32 = 22;

/// Full-duplex byte transport to the driver chip. One call is one
/// chip-select framed transaction; the returned buffer has `tx.len()` bytes.
pub trait CommandBus {
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>>;
}

/// Tick-based register encodings (250 ns tick).
fn acc_register(steps_per_s2: u32) -> u16 {
    // ACC LSB is 2^-40 step/tick^2 = 14.55 step/s^2.
    let raw = (f64::from(steps_per_s2) / 14.55).round();
    raw.clamp(1.0, 4094.0) as u16
}

fn max_speed_register(steps_per_s: f64) -> u16 {
    // MAX_SPEED LSB is 2^-18 step/tick = 15.25 step/s.
    let raw = (steps_per_s / 15.25).ceil();
    raw.clamp(1.0, 1023.0) as u16
}

fn step_sel(microsteps: u16) -> Result<u8> {
    match microsteps {
        1 => Ok(0),
        2 => Ok(1),
        4 => Ok(2),
        8 => Ok(3),
        16 => Ok(4),
        other => Err(HwError::InvalidMicrostep(other)),
    }
}

fn sign_extend_abs_pos(raw: u32) -> i64 {
    let shift = 32 - ABS_POS_BITS;
    i64::from(((raw << shift) as i32) >> shift)
}

fn read_status<B: CommandBus>(bus: &mut B) -> Result<u16> {
    let rx = bus.transfer(&[cmd::GET_STATUS, cmd::NOP, cmd::NOP])?;
    let msb = rx.get(1).copied().unwrap_or(0);
    let lsb = rx.get(2).copied().unwrap_or(0);
    let st = (u16::from(msb) << 8) | u16::from(lsb);
    if st & status::OCD_N == 0 || st & status::UVLO_N == 0 {
        return Err(HwError::DriverFault(st));
    }
    Ok(st)
}

#[derive(Debug, Clone, Copy)]
pub struct ChipTiming {
    pub steps_per_rev: u32,
    pub rpm: u32,
    pub microsteps: u16,
    /// Interval between STATUS polls while a move runs.
    pub poll_interval: Duration,
}

impl Default for ChipTiming {
    fn default() -> Self {
        Self {
            steps_per_rev: 200,
            rpm: 50,
            microsteps: 16,
            poll_interval: Duration::from_millis(1),
        }
    }
}

pub struct HardwareMicrostepDriver<B: CommandBus, C: Clock> {
    bus: B,
    clock: C,
    timing: ChipTiming,
    cruise_hz: f64,
}

impl<B: CommandBus, C: Clock> core::fmt::Debug for HardwareMicrostepDriver<B, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HardwareMicrostepDriver")
            .field("timing", &self.timing)
            .field("cruise_hz", &self.cruise_hz)
            .finish()
    }
}

impl<B: CommandBus, C: Clock> HardwareMicrostepDriver<B, C> {
    /// Program step mode and speed limit, then leave the bridges in high-Z.
    pub fn new(bus: B, clock: C, timing: ChipTiming) -> Result<Self> {
        let cruise_hz = pulse_rate_hz(timing.rpm, timing.steps_per_rev, timing.microsteps);
        let mut drv = Self {
            bus,
            clock,
            timing,
            cruise_hz,
        };
        // STEP_MODE may only be written while the bridges are disabled.
        drv.command(&[cmd::SOFT_HIZ])?;
        drv.set_param(reg::STEP_MODE, u32::from(step_sel(timing.microsteps)?), 1)?;
        drv.set_param(reg::MAX_SPEED, u32::from(max_speed_register(cruise_hz)), 2)?;
        let st = drv.status()?;
        tracing::debug!(status = format_args!("{st:#06x}"), "driver chip configured");
        Ok(drv)
    }

    fn command(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        self.bus.transfer(tx)
    }

    pub fn set_param(&mut self, register: u8, value: u32, len: u8) -> Result<()> {
        let n = u32::from(len.clamp(1, 4));
        let mut frame = Vec::with_capacity(n as usize + 1);
        frame.push(cmd::SET_PARAM | (register & 0x1F));
        for i in (0..n).rev() {
            frame.push(((value >> (i * 8)) & 0xFF) as u8);
        }
        self.command(&frame)?;
        Ok(())
    }

    pub fn get_param(&mut self, register: u8, len: u8) -> Result<u32> {
        let n = usize::from(len.clamp(1, 4));
        let mut frame = vec![cmd::NOP; n + 1];
        frame[0] = cmd::GET_PARAM | (register & 0x1F);
        let rx = self.command(&frame)?;
        Ok(rx
            .iter()
            .skip(1)
            .take(n)
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
    }

    /// Read (and clear) STATUS, failing on latched over-current or undervoltage.
    pub fn status(&mut self) -> Result<u16> {
        read_status(&mut self.bus)
    }

    fn abs_pos(&mut self) -> Result<i64> {
        Ok(sign_extend_abs_pos(self.get_param(reg::ABS_POS, 3)?))
    }

    /// Upper bound on how long a chunk of `steps` may keep the chip busy.
    fn busy_budget(&self, steps: u32) -> Duration {
        let secs = f64::from(steps) / self.cruise_hz.max(1.0);
        Duration::from_secs_f64(secs * 2.0) + Duration::from_secs(1)
    }

    fn run_chunk(&mut self, forward: bool, steps: u32, halt: &dyn Fn() -> bool) -> Result<bool> {
        let n = steps.min(MAX_MOVE);
        self.command(&[
            cmd::MOVE | u8::from(forward),
            ((n >> 16) & 0x3F) as u8,
            ((n >> 8) & 0xFF) as u8,
            (n & 0xFF) as u8,
        ])?;
        let budget = self.busy_budget(n);
        let poll = self.timing.poll_interval;
        let bus = &mut self.bus;
        let mut halted = false;
        wait_until(
            &self.clock,
            || {
                if halt() {
                    bus.transfer(&[cmd::HARD_STOP])?;
                    halted = true;
                    return Ok(true);
                }
                Ok(read_status(bus)? & status::BUSY_N != 0)
            },
            budget,
            poll,
        )?;
        Ok(halted)
    }
}

impl<B: CommandBus, C: Clock> Motor for HardwareMicrostepDriver<B, C> {
    fn enable(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Bridges come out of high-Z with the next motion command; just make
        // sure no fault is latched before moving.
        self.status()?;
        Ok(())
    }

    fn disable(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.command(&[cmd::SOFT_HIZ])?;
        Ok(())
    }

    fn set_speed_profile(
        &mut self,
        acceleration: u32,
        deceleration: u32,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.set_param(reg::ACC, u32::from(acc_register(acceleration)), 2)?;
        self.set_param(reg::DEC, u32::from(acc_register(deceleration)), 2)?;
        Ok(())
    }

    fn move_steps(
        &mut self,
        delta: i64,
        halt: &dyn Fn() -> bool,
    ) -> std::result::Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        if delta == 0 || halt() {
            return Ok(0);
        }
        let start = self.abs_pos()?;
        let forward = delta > 0;
        let mut remaining = delta.unsigned_abs();
        while remaining > 0 {
            let chunk = u32::try_from(remaining.min(u64::from(MAX_MOVE))).unwrap_or(MAX_MOVE);
            let halted = self.run_chunk(forward, chunk, halt)?;
            remaining -= u64::from(chunk);
            if halted {
                tracing::debug!(remaining, "driver chip hard stop");
                break;
            }
        }
        let issued = self.abs_pos()? - start;
        Ok(issued)
    }

    fn microsteps(&self) -> u16 {
        self.timing.microsteps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magloop_traits::ManualClock;
    use std::cell::Cell;

    const HEALTHY: u16 = status::UVLO_N | status::OCD_N | (1 << 10) | (1 << 14) | (1 << 15);

    /// Chip model: a move advances ABS_POS by `rate` steps per STATUS poll.
    struct FakeChip {
        abs_pos: i64,
        target: i64,
        rate: i64,
        fault: bool,
        log: Vec<u8>,
        params: Vec<(u8, u32)>,
    }

    impl FakeChip {
        fn new(rate: i64) -> Self {
            Self {
                abs_pos: 0,
                target: 0,
                rate,
                fault: false,
                log: Vec::new(),
                params: Vec::new(),
            }
        }
    }

    impl CommandBus for FakeChip {
        fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
            let op = tx[0];
            self.log.push(op);
            let mut rx = vec![0u8; tx.len()];
            match op {
                cmd::GET_STATUS => {
                    if self.abs_pos != self.target {
                        let step = (self.target - self.abs_pos).clamp(-self.rate, self.rate);
                        self.abs_pos += step;
                    }
                    let mut st = if self.fault { 0 } else { HEALTHY };
                    if self.abs_pos == self.target {
                        st |= status::BUSY_N;
                    }
                    rx[1] = (st >> 8) as u8;
                    rx[2] = st as u8;
                }
                op if op == cmd::GET_PARAM | reg::ABS_POS => {
                    let raw = (self.abs_pos as u32) & ((1 << 22) - 1);
                    rx[1] = (raw >> 16) as u8;
                    rx[2] = (raw >> 8) as u8;
                    rx[3] = raw as u8;
                }
                op if op & 0xFE == cmd::MOVE => {
                    let n = (i64::from(tx[1]) << 16) | (i64::from(tx[2]) << 8) | i64::from(tx[3]);
                    self.target = self.abs_pos + if op & 1 == 1 { n } else { -n };
                }
                cmd::HARD_STOP => self.target = self.abs_pos,
                cmd::SOFT_HIZ => {}
                op if op < 0x20 => {
                    let v = tx[1..].iter().fold(0u32, |a, b| (a << 8) | u32::from(*b));
                    self.params.push((op, v));
                }
                _ => {}
            }
            Ok(rx)
        }
    }

    fn driver(chip: FakeChip) -> HardwareMicrostepDriver<FakeChip, ManualClock> {
        HardwareMicrostepDriver::new(chip, ManualClock::new(), ChipTiming::default()).unwrap()
    }

    #[test]
    fn configures_sixteenth_step_mode() {
        let drv = driver(FakeChip::new(10));
        assert!(drv.bus.params.contains(&(reg::STEP_MODE, 4)));
        assert_eq!(drv.bus.log[0], cmd::SOFT_HIZ);
    }

    #[test]
    fn forward_move_completes_and_reports_abs_pos_delta() {
        let mut drv = driver(FakeChip::new(25));
        drv.set_speed_profile(6000, 3500).unwrap();
        let issued = drv.move_steps(100, &|| false).unwrap();
        assert_eq!(issued, 100);
        assert!(drv.bus.params.contains(&(reg::ACC, u32::from(acc_register(6000)))));
    }

    #[test]
    fn reverse_move_sign_extends_negative_positions() {
        let mut drv = driver(FakeChip::new(50));
        assert_eq!(drv.move_steps(-120, &|| false).unwrap(), -120);
        assert_eq!(drv.abs_pos().unwrap(), -120);
    }

    #[test]
    fn halt_issues_hard_stop_and_counts_partial_travel() {
        let mut drv = driver(FakeChip::new(10));
        let polls = Cell::new(0);
        let halt = || {
            polls.set(polls.get() + 1);
            // First call is the pre-move check; stop after three STATUS polls.
            polls.get() > 4
        };
        let issued = drv.move_steps(500, &halt).unwrap();
        assert_eq!(issued, 30);
        assert!(drv.bus.log.contains(&cmd::HARD_STOP));
    }

    #[test]
    fn latched_fault_is_reported() {
        let mut drv = driver(FakeChip::new(10));
        drv.bus.fault = true;
        let err = drv.enable().unwrap_err();
        assert!(err.to_string().contains("driver fault"));
    }

    #[test]
    fn stuck_busy_times_out() {
        let mut drv = driver(FakeChip::new(0));
        let err = drv.move_steps(10, &|| false).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn abs_pos_sign_extension() {
        assert_eq!(sign_extend_abs_pos(0x3F_FFFF), -1);
        assert_eq!(sign_extend_abs_pos(0x1F_FFFF), 0x1F_FFFF);
    }
}
