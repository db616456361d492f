//! Human-readable error descriptions and structured JSON error formatting.

use magloop_core::error::{BuildError, ControllerError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingMotor => {
                "What happened: No motor driver was provided to the controller.\nLikely causes: The driver failed to initialize or was not wired into the builder.\nHow to fix: Check motor.driver and the [pins] section, then rerun.".to_string()
            }
            BuildError::MissingSwitch => {
                "What happened: No endstop input was provided to the controller.\nLikely causes: The endstop pin could not be opened.\nHow to fix: Check pins.endstop and GPIO permissions.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/magloop.toml for a sample."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControllerError>() {
        return match ce {
            ControllerError::Timeout => "What happened: The stepper driver did not answer in time.\nLikely causes: Driver chip unpowered, SPI wiring fault, or a move that never completes.\nHow to fix: Check driver power and the SPI bus/chip-select settings in [pins].".to_string(),
            ControllerError::HardwareFault(msg) => format!(
                "What happened: The stepper driver reported a fault ({msg}).\nLikely causes: Over-current, under-voltage or a stalled carriage.\nHow to fix: Power-cycle the driver, check the motor supply and free the mechanism."
            ),
            ControllerError::Hardware(msg) => format!(
                "What happened: Hardware I/O failed ({msg}).\nLikely causes: Wrong pin numbers, insufficient GPIO permissions, or a loose connection.\nHow to fix: Verify the [pins] section and run as a user with GPIO access."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing file.\nHow to fix: Pass --config <FILE> or create etc/magloop.toml. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.starts_with("parse config") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing [pins] (step, dir, endstop) or out-of-range values.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    if lower.contains("hardware` feature") {
        return format!(
            "What happened: The configured driver is not available in this build.\nLikely causes: Binary built without GPIO support.\nHow to fix: Rebuild with `--features hardware` or set motor.driver = \"simulated\". Original: {msg}"
        );
    }

    if lower.starts_with("bind ") {
        let cause = err.root_cause();
        return format!(
            "What happened: Could not open the listening socket ({cause}).\nLikely causes: Port already in use or a privileged port.\nHow to fix: Choose another --port or stop the other server. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes; 10 is reserved for the connectivity watchdog.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 3;
    }
    match err.downcast_ref::<ControllerError>() {
        Some(ControllerError::Hardware(_) | ControllerError::HardwareFault(_)) => 4,
        Some(ControllerError::Timeout) => 5,
        Some(_) => 6,
        None => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<ControllerError>() {
        Some(ControllerError::Hardware(_)) => "Hardware",
        Some(ControllerError::HardwareFault(_)) => "HardwareFault",
        Some(ControllerError::Timeout) => "Timeout",
        Some(ControllerError::Config(_)) => "Config",
        Some(ControllerError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
