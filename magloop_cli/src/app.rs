//! Backend assembly: turn a validated config into a running `Controller`.

use std::time::Duration;

use eyre::WrapErr;
use magloop_config::{Config, DriverKind};
use magloop_core::{Controller, ControllerBuilder};
use magloop_hardware::{SimAxisConfig, SimulatedAxis};

/// Apply the runtime sections shared by every backend.
fn configure<M, S>(b: ControllerBuilder<M, S>, cfg: &Config) -> ControllerBuilder<M, S> {
    b.with_travel((&cfg.travel).into())
        .with_park((&cfg.park).into())
        .with_endstop((&cfg.endstop).into())
        .with_device((&cfg.device).into())
}

pub fn driver_name(kind: DriverKind) -> &'static str {
    match kind {
        DriverKind::Simulated => "simulated",
        DriverKind::Software => "software",
        DriverKind::Hardware => "hardware",
    }
}

pub fn build_controller(cfg: &Config) -> eyre::Result<Controller> {
    tracing::info!(driver = driver_name(cfg.motor.driver), "assembling backend");
    match cfg.motor.driver {
        DriverKind::Simulated => simulated(cfg),
        DriverKind::Software => software(cfg),
        DriverKind::Hardware => hardware(cfg),
    }
}

fn simulated(cfg: &Config) -> eyre::Result<Controller> {
    let sim = SimAxisConfig {
        start: cfg.sim.start,
        step_period: Duration::from_micros(cfg.sim.step_us),
        microsteps: cfg.motor.microsteps,
        ..SimAxisConfig::default()
    };
    let axis = SimulatedAxis::new(sim);
    let ctl = configure(
        Controller::builder()
            .with_motor(axis.motor())
            .with_switch(axis.switch()),
        cfg,
    )
    .build()
    .wrap_err("build controller on simulated axis")?;
    if let Some(edges) = ctl.edge_sender() {
        axis.on_edge(move |pressed| edges.post(pressed));
    }
    tracing::info!(start = sim.start, step_us = cfg.sim.step_us, "simulated axis ready");
    Ok(ctl)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn endstop_input(cfg: &Config) -> eyre::Result<magloop_hardware::gpio::GpioEndstop> {
    magloop_hardware::gpio::GpioEndstop::new(cfg.pins.endstop, cfg.endstop.active_low)
        .wrap_err("open endstop pin")
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn finish_gpio(
    ctl: Controller,
    endstop: &magloop_hardware::gpio::GpioEndstop,
) -> eyre::Result<Controller> {
    if let Some(edges) = ctl.edge_sender() {
        endstop
            .on_edge(move |pressed| edges.post(pressed))
            .wrap_err("register endstop interrupt")?;
    }
    Ok(ctl)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn software(cfg: &Config) -> eyre::Result<Controller> {
    use magloop_hardware::gpio::GpioStepDir;
    use magloop_hardware::{DriverTiming, SoftwareMicrostepDriver};
    use magloop_traits::MonotonicClock;

    let p = &cfg.pins;
    let ms = match (p.ms1, p.ms2, p.ms3) {
        (Some(a), Some(b), Some(c)) => Some([a, b, c]),
        _ => None,
    };
    let pins = GpioStepDir::new(p.step, p.dir, p.enable, ms).wrap_err("open motor pins")?;
    let timing = DriverTiming {
        steps_per_rev: cfg.motor.steps_per_rev,
        rpm: cfg.motor.rpm,
        microsteps: cfg.motor.microsteps,
        enable_active_low: cfg.motor.enable_active_low,
    };
    let driver = SoftwareMicrostepDriver::new(pins, MonotonicClock::new(), timing)
        .wrap_err("init step/dir driver")?;
    let endstop = endstop_input(cfg)?;
    let ctl = configure(
        Controller::builder()
            .with_motor(driver)
            .with_switch(endstop.clone()),
        cfg,
    )
    .build()?;
    finish_gpio(ctl, &endstop)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hardware(cfg: &Config) -> eyre::Result<Controller> {
    use magloop_hardware::gpio::SpiCommandBus;
    use magloop_hardware::{ChipTiming, HardwareMicrostepDriver};
    use magloop_traits::MonotonicClock;

    const SPI_CLOCK_HZ: u32 = 1_000_000;

    let bus = SpiCommandBus::new(cfg.pins.spi_bus, cfg.pins.spi_cs, SPI_CLOCK_HZ)
        .wrap_err("open driver SPI bus")?;
    let timing = ChipTiming {
        steps_per_rev: cfg.motor.steps_per_rev,
        rpm: cfg.motor.rpm,
        microsteps: cfg.motor.microsteps,
        ..ChipTiming::default()
    };
    let driver = HardwareMicrostepDriver::new(bus, MonotonicClock::new(), timing)
        .wrap_err("init driver chip")?;
    let endstop = endstop_input(cfg)?;
    let ctl = configure(
        Controller::builder()
            .with_motor(driver)
            .with_switch(endstop.clone()),
        cfg,
    )
    .build()?;
    finish_gpio(ctl, &endstop)
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn software(_cfg: &Config) -> eyre::Result<Controller> {
    eyre::bail!("motor.driver = \"software\" requires a Linux build with the `hardware` feature")
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn hardware(_cfg: &Config) -> eyre::Result<Controller> {
    eyre::bail!("motor.driver = \"hardware\" requires a Linux build with the `hardware` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_backend_builds_from_minimal_config() {
        let cfg = magloop_config::load_toml("[pins]\nstep = 7\ndir = 6\nendstop = 10\n").unwrap();
        let ctl = build_controller(&cfg).unwrap();
        let info = ctl.dispatcher().handle_info();
        assert_eq!(info.identity, "magloop-ctrl");
        assert_eq!(info.snapshot.position, 0);
        assert!(!info.snapshot.triggered);
    }

    #[test]
    fn sim_section_places_the_carriage() {
        let cfg = magloop_config::load_toml(
            "[pins]\nstep = 7\ndir = 6\nendstop = 10\n[sim]\nstart = 0\nstep_us = 0\n",
        )
        .unwrap();
        let ctl = build_controller(&cfg).unwrap();
        // Carriage starts on the trip point, so the switch reads closed.
        assert!(ctl.dispatcher().handle_info().snapshot.triggered);
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn gpio_backends_need_the_feature() {
        let cfg = magloop_config::load_toml(
            "[pins]\nstep = 7\ndir = 6\nendstop = 10\n[motor]\ndriver = \"software\"\n",
        )
        .unwrap();
        let err = build_controller(&cfg).unwrap_err();
        assert!(err.to_string().contains("hardware"));
    }
}
