use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid TOML config for the simulated backend
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
# pins are unused by the simulated backend but must be present
step = 7
dir = 6
endstop = 10

[endstop]
strategy = "edge"
debounce_ms = 5

[park]
max_iterations = 2000

[device]
heartbeat_ms = 0

[sim]
start = 60
step_us = 20
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["info"], 0, "magloop-ctrl", "stdout")]
#[case(&["self-check"], 0, "ok: driver=simulated", "stdout")]
#[case(&["move", "--direction", "forward", "--steps", "100"], 0, "Complete (step_count=100", "stdout")]
#[case(&["move", "--direction", "reverse", "--steps", "10"], 0, "Minimum position reached", "stdout")]
#[case(&["move", "--direction", "forward", "--steps", "7001"], 0, "Maximum position reached", "stdout")]
#[case(&["park"], 0, "Parked (step_count=0, endstop=0", "stdout")]
#[case(&["move", "--direction", "sideways", "--steps", "1"], 2, "invalid value", "stderr")]
#[case(&["move", "--direction", "forward"], 2, "required", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("magloop").unwrap();

    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn json_flag_prints_status_object() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("magloop")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["move", "--direction", "forward", "--steps", "250"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout.lines().last().unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["status"], "Complete");
    assert_eq!(v["step_count"], 250);
    assert_eq!(v["endstop"], 1);
    assert_eq!(v["stepper_microstep"], 16);
}

#[rstest]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("magloop")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("info")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not read the config file"));
}

#[rstest]
#[case("[pins]\nstep = 7\ndir = 6\nendstop = 10\n[travel]\nmax_travel = 0\n", "travel.max_travel must be > 0")]
#[case("[pins]\nstep = 7\ndir = 6\nendstop = 10\n[motor]\nmicrosteps = 3\n", "motor.microsteps")]
#[case("[pins]\nstep = 7\n", "missing field")]
fn invalid_config_is_rejected(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, toml).unwrap();
    Command::cargo_bin("magloop")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gpio.toml");
    fs::write(
        &path,
        "[pins]\nstep = 7\ndir = 6\nendstop = 10\n[motor]\ndriver = \"hardware\"\n",
    )
    .unwrap();
    let out = Command::cargo_bin("magloop")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert!(v["message"].as_str().unwrap_or("").contains("hardware"));
}
