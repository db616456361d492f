use std::fs;

use magloop_config::{DriverKind, EndstopStrategy, load_file, load_toml};
use rstest::rstest;
use tempfile::tempdir;

const MINIMAL: &str = r#"
[pins]
step = 7
dir = 6
enable = 8
endstop = 10
"#;

#[test]
fn minimal_config_uses_reference_defaults() {
    let cfg = load_toml(MINIMAL).expect("parse TOML");
    cfg.validate().expect("defaults should validate");

    assert_eq!(cfg.motor.driver, DriverKind::Simulated);
    assert_eq!(cfg.motor.steps_per_rev, 200);
    assert_eq!(cfg.motor.microsteps, 16);
    assert_eq!(cfg.motor.acceleration, 6000);
    assert_eq!(cfg.motor.deceleration, 3500);
    assert_eq!(cfg.travel.max_travel, 7000);
    assert_eq!(cfg.endstop.strategy, EndstopStrategy::Edge);
    assert_eq!(cfg.endstop.debounce_ms, 100);
    assert_eq!(cfg.park.step_size, 5);
    assert_eq!(cfg.park.max_iterations, None);
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.device.identity, "magloop-ctrl");
    assert!(cfg.watchdog.target.is_none());
    assert_eq!((cfg.sim.start, cfg.sim.step_us), (1000, 200));
}

#[test]
fn missing_pins_section_is_a_parse_error() {
    let err = load_toml("[travel]\nmax_travel = 100\n").expect_err("pins are required");
    assert!(format!("{err}").contains("pins"));
}

#[test]
fn parses_driver_and_strategy_names() {
    let toml = format!(
        "{MINIMAL}\n[motor]\ndriver = \"software\"\n\n[endstop]\nstrategy = \"poll\"\npoll_us = 500\n"
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    assert_eq!(cfg.motor.driver, DriverKind::Software);
    assert_eq!(cfg.endstop.strategy, EndstopStrategy::Poll);
    assert_eq!(cfg.endstop.poll_us, 500);
}

#[rstest]
#[case("[travel]\nmax_travel = 0\n", "travel.max_travel must be > 0")]
#[case("[endstop]\ndebounce_ms = 0\n", "endstop.debounce_ms must be >= 1")]
#[case("[motor]\nmicrosteps = 3\n", "motor.microsteps must be one of")]
#[case("[park]\nstep_size = 0\n", "park.step_size must be > 0")]
#[case("[park]\nmax_iterations = 0\n", "park.max_iterations must be >= 1")]
#[case("[server]\nworkers = 0\n", "server.workers must be >= 1")]
#[case("[watchdog]\ntarget = \" \"\n", "watchdog.target must not be empty")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
fn rejects_out_of_range_values(#[case] section: &str, #[case] needle: &str) {
    let toml = format!("{MINIMAL}\n{section}");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn partial_microstep_pins_are_rejected() {
    let toml = r#"
[pins]
step = 7
dir = 6
endstop = 10
ms1 = 1
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("ms pins must come as a set");
    assert!(format!("{err}").contains("must be set together"));
}

#[test]
fn load_file_reports_path_on_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, format!("{MINIMAL}\n[travel]\nmax_travel = -5\n")).unwrap();

    let err = load_file(&path).expect_err("negative travel is invalid");
    let msg = format!("{err}");
    assert!(msg.contains("invalid configuration"));
    assert!(msg.contains("bad.toml"));
}

#[test]
fn load_file_reads_valid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ok.toml");
    fs::write(&path, MINIMAL).unwrap();
    let cfg = load_file(&path).expect("valid file");
    assert_eq!(cfg.pins.endstop, 10);
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/magloop.toml");
    let cfg = load_file(&path).expect("etc/magloop.toml should load");
    assert_eq!(cfg.motor.driver, DriverKind::Simulated);
    assert_eq!(cfg.pins.ms3, Some(5));
    assert_eq!(cfg.park.max_iterations, None);
}
