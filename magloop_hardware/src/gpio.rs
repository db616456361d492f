//! Raspberry Pi GPIO/SPI glue (rppal). Only built with the `hardware` feature.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use magloop_traits::LimitSwitch;

use crate::driver_chip::CommandBus;
use crate::error::{HwError, Result};
use crate::step_dir::StepDirPins;

/// A4988 minimum STEP high time is 1 µs; keep some margin.
const STEP_HIGH: Duration = Duration::from_micros(2);

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

fn output(gpio: &Gpio, pin: u8) -> Result<OutputPin> {
    Ok(gpio.get(pin).map_err(gpio_err)?.into_output_low())
}

pub struct GpioStepDir {
    step: OutputPin,
    dir: OutputPin,
    enable: Option<OutputPin>,
    ms: Option<[OutputPin; 3]>,
}

impl GpioStepDir {
    /// `ms` may be `None` when the divisor is strapped on the board.
    pub fn new(step: u8, dir: u8, enable: Option<u8>, ms: Option<[u8; 3]>) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let ms = match ms {
            Some([a, b, c]) => Some([output(&gpio, a)?, output(&gpio, b)?, output(&gpio, c)?]),
            None => None,
        };
        Ok(Self {
            step: output(&gpio, step)?,
            dir: output(&gpio, dir)?,
            enable: enable.map(|p| output(&gpio, p)).transpose()?,
            ms,
        })
    }
}

impl StepDirPins for GpioStepDir {
    fn set_direction(&mut self, away_from_home: bool) -> Result<()> {
        self.dir.write(Level::from(away_from_home));
        Ok(())
    }

    fn set_enable_level(&mut self, high: bool) -> Result<()> {
        if let Some(en) = self.enable.as_mut() {
            en.write(Level::from(high));
        }
        Ok(())
    }

    fn set_microstep_lines(&mut self, lines: [bool; 3]) -> Result<()> {
        match self.ms.as_mut() {
            Some(pins) => {
                for (pin, level) in pins.iter_mut().zip(lines) {
                    pin.write(Level::from(level));
                }
            }
            None => tracing::debug!("microstep lines not wired; divisor strapped"),
        }
        Ok(())
    }

    fn pulse(&mut self) -> Result<()> {
        self.step.set_high();
        std::thread::sleep(STEP_HIGH);
        self.step.set_low();
        Ok(())
    }
}

/// Home switch input with optional edge interrupt.
#[derive(Clone)]
pub struct GpioEndstop {
    pin: Arc<Mutex<InputPin>>,
    active_low: bool,
}

impl GpioEndstop {
    pub fn new(pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let p = gpio.get(pin).map_err(gpio_err)?;
        let input = if active_low {
            p.into_input_pullup()
        } else {
            p.into_input_pulldown()
        };
        Ok(Self {
            pin: Arc::new(Mutex::new(input)),
            active_low,
        })
    }

    /// Register `on_edge(pressed)` for both edges. rppal runs it on its own
    /// interrupt thread, so it should only post and return.
    pub fn on_edge(&self, mut on_edge: impl FnMut(bool) + Send + 'static) -> Result<()> {
        let active_low = self.active_low;
        let mut pin = self
            .pin
            .lock()
            .map_err(|_| HwError::Gpio("endstop pin lock poisoned".into()))?;
        pin.set_async_interrupt(Trigger::Both, move |level| {
            on_edge((level == Level::Low) == active_low);
        })
        .map_err(gpio_err)
    }
}

impl LimitSwitch for GpioEndstop {
    fn is_pressed(&self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let pin = self
            .pin
            .lock()
            .map_err(|_| HwError::Gpio("endstop pin lock poisoned".into()))?;
        Ok(pin.is_low() == self.active_low)
    }
}

/// SPI link to a driver chip. Every byte is its own chip-select frame, which
/// is what the powerSTEP01/L6470 family expects.
pub struct SpiCommandBus {
    spi: Spi,
}

impl SpiCommandBus {
    pub fn new(bus: u8, cs: u8, clock_hz: u32) -> Result<Self> {
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            other => return Err(HwError::Spi(format!("unsupported SPI bus {other}"))),
        };
        let ss = match cs {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => return Err(HwError::Spi(format!("unsupported chip select {other}"))),
        };
        let spi = Spi::new(bus, ss, clock_hz, Mode::Mode3).map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi })
    }
}

impl CommandBus for SpiCommandBus {
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut rx = vec![0u8; tx.len()];
        for (out, inp) in tx.iter().zip(rx.iter_mut()) {
            let mut buf = [0u8; 1];
            self.spi
                .transfer(&mut buf, std::slice::from_ref(out))
                .map_err(|e| HwError::Spi(e.to_string()))?;
            *inp = buf[0];
        }
        Ok(rx)
    }
}
