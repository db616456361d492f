mod app;
mod cli;
mod error_fmt;
mod http;
mod logging;
mod routes;
mod watchdog;

use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use magloop_config::Config;
use magloop_core::status::{self, StatusReport};
use magloop_core::{Controller, MoveCommand};

use crate::cli::{Cli, Commands, JSON_MODE};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = magloop_config::load_file(&cli.config)?;
    logging::init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Serve { port, bind } => serve(&cfg, port, bind),
        Commands::Move {
            direction,
            steps,
            acceleration,
            deceleration,
        } => {
            let ctl = app::build_controller(&cfg)?;
            let cmd = MoveCommand {
                direction: direction.into(),
                steps,
                acceleration: acceleration.unwrap_or(cfg.motor.acceleration),
                deceleration: deceleration.unwrap_or(cfg.motor.deceleration),
            };
            let report = ctl.dispatcher().handle_move_command(&cmd)?;
            let text = status::move_status(&report.outcome).unwrap_or(status::COMPLETE);
            print_status(&StatusReport::new(text, &report.snapshot));
            Ok(())
        }
        Commands::Park => {
            let ctl = app::build_controller(&cfg)?;
            let report = ctl.dispatcher().handle_park()?;
            print_status(&StatusReport::new(
                status::park_status(report.outcome),
                &report.snapshot,
            ));
            Ok(())
        }
        Commands::Info => {
            let ctl = app::build_controller(&cfg)?;
            let info = ctl.dispatcher().handle_info();
            print_status(&StatusReport::new(info.identity.as_str(), &info.snapshot));
            Ok(())
        }
        Commands::SelfCheck => self_check(&cfg),
    }
}

fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

fn print_status(report: &StatusReport) {
    if json_mode() {
        println!("{}", report.to_json());
    } else {
        println!(
            "{} (step_count={}, endstop={}, stepper_microstep={})",
            report.status, report.step_count, report.endstop, report.stepper_microstep
        );
    }
}

fn self_check(cfg: &Config) -> eyre::Result<()> {
    let ctl: Controller = app::build_controller(cfg)?;
    let snap = ctl.state().snapshot();
    let driver = app::driver_name(cfg.motor.driver);
    if json_mode() {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "driver": driver,
                "endstop": snap.endstop,
                "stepper_microstep": snap.microsteps,
                "max_travel": snap.max_travel,
            })
        );
    } else {
        println!(
            "ok: driver={driver} endstop={:?} stepper_microstep={} max_travel={}",
            snap.endstop, snap.microsteps, snap.max_travel
        );
    }
    Ok(())
}

fn serve(cfg: &Config, port: Option<u16>, bind: Option<String>) -> eyre::Result<()> {
    let ctl = app::build_controller(cfg)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    let addr = format!(
        "{}:{}",
        bind.as_deref().unwrap_or(&cfg.server.bind),
        port.unwrap_or(cfg.server.port)
    );
    let listener = TcpListener::bind(&addr).wrap_err_with(|| format!("bind {addr}"))?;
    let local = listener.local_addr().wrap_err("listener address")?;
    println!("listening on {local}");
    let _ = std::io::stdout().flush();
    tracing::info!(%local, workers = cfg.server.workers, "{}", status::BANNER);

    let watchdog = watchdog::spawn_watchdog(&cfg.watchdog, shutdown.clone())
        .wrap_err("spawn watchdog")?;
    let heartbeat = watchdog::spawn_heartbeat(cfg.device.heartbeat_ms, shutdown.clone())
        .wrap_err("spawn heartbeat")?;

    http::serve(
        listener,
        ctl.dispatcher().clone(),
        http::ServerOpts {
            workers: cfg.server.workers,
            read_timeout: Duration::from_millis(cfg.server.read_timeout_ms),
        },
        &shutdown,
    )?;

    tracing::info!("shutting down");
    for h in [watchdog, heartbeat].into_iter().flatten() {
        let _ = h.join();
    }
    Ok(())
}
