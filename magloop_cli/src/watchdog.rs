//! Connectivity watchdog and heartbeat threads.
//!
//! The watchdog probes a TCP endpoint on a fixed period. When a probe fails
//! the process exits with [`EXIT_CONNECTIVITY_LOST`] so the supervisor can
//! restart it with a fresh network stack.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const EXIT_CONNECTIVITY_LOST: i32 = 10;

const SLICE: Duration = Duration::from_millis(50);

/// Sleep for `total`, returning early (with `false`) once `shutdown` is set.
fn sleep_unless(total: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

/// TCP connect to `target` (`host:port`), trying every resolved address.
pub fn probe(target: &str, timeout: Duration) -> io::Result<()> {
    let mut last = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
    for addr in target.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(e) => last = e,
        }
    }
    Err(last)
}

/// `None` when no target is configured.
pub fn spawn_watchdog(
    cfg: &magloop_config::WatchdogCfg,
    shutdown: Arc<AtomicBool>,
) -> io::Result<Option<JoinHandle<()>>> {
    let Some(target) = cfg.target.clone() else {
        tracing::info!("connectivity watchdog disabled");
        return Ok(None);
    };
    let interval = Duration::from_millis(cfg.interval_ms);
    let timeout = Duration::from_millis(cfg.timeout_ms);
    tracing::info!(%target, interval_ms = cfg.interval_ms, "connectivity watchdog armed");
    let handle = std::thread::Builder::new()
        .name("watchdog".into())
        .spawn(move || {
            while sleep_unless(interval, &shutdown) {
                match probe(&target, timeout) {
                    Ok(()) => tracing::debug!(%target, "connectivity ok"),
                    Err(e) => {
                        tracing::error!(%target, error = %e, "connectivity lost, exiting for restart");
                        std::process::exit(EXIT_CONNECTIVITY_LOST);
                    }
                }
            }
        })?;
    Ok(Some(handle))
}

/// Liveness log line every `period_ms`; 0 disables it.
pub fn spawn_heartbeat(
    period_ms: u64,
    shutdown: Arc<AtomicBool>,
) -> io::Result<Option<JoinHandle<()>>> {
    if period_ms == 0 {
        return Ok(None);
    }
    let period = Duration::from_millis(period_ms);
    let handle = std::thread::Builder::new()
        .name("heartbeat".into())
        .spawn(move || {
            let mut beats: u64 = 0;
            while sleep_unless(period, &shutdown) {
                beats += 1;
                tracing::debug!(beats, "heartbeat");
            }
        })?;
    Ok(Some(handle))
}
