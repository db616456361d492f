//! Status reporting: pure formatting of outcomes and snapshots into the
//! replies the transport writes back.

use serde::Serialize;
use serde_json::json;

use crate::command::Malformed;
use crate::dispatcher::{InfoReport, MoveReport, ParkReport};
use crate::motion::{MoveOutcome, ParkOutcome};
use crate::state::Snapshot;

pub const COMPLETE: &str = "Complete";
pub const MAX_POSITION: &str = "Maximum position reached";
pub const MIN_POSITION: &str = "Minimum position reached";
pub const ENDSTOP_TRIGGERED: &str = "Endstop Triggered!";
pub const PARKED: &str = "Parked";
pub const PARK_LIMIT: &str = "Park limit reached";
pub const BANNER: &str = "Variable Capacitor Controller Web Server";

pub const JSON: &str = "application/json";
pub const HTML: &str = "text/html";
pub const TEXT: &str = "text/plain";

/// Status line for a move outcome. Malformed requests have no status line;
/// they are answered with a 400 instead.
pub fn move_status(outcome: &MoveOutcome) -> Option<&'static str> {
    match outcome {
        MoveOutcome::Completed => Some(COMPLETE),
        MoveOutcome::RejectedMaxPosition => Some(MAX_POSITION),
        MoveOutcome::RejectedMinPosition => Some(MIN_POSITION),
        MoveOutcome::RejectedEndstopTriggered | MoveOutcome::AbortedByEndstop => {
            Some(ENDSTOP_TRIGGERED)
        }
        MoveOutcome::RejectedMalformed(_) => None,
    }
}

pub fn park_status(outcome: ParkOutcome) -> &'static str {
    match outcome {
        ParkOutcome::Parked => PARKED,
        ParkOutcome::LimitReached => PARK_LIMIT,
    }
}

/// Body of every status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: String,
    pub step_count: i64,
    /// 1 = switch released, 0 = triggered.
    pub endstop: u8,
    pub stepper_microstep: u16,
}

impl StatusReport {
    pub fn new(status: impl Into<String>, snapshot: &Snapshot) -> Self {
        Self {
            status: status.into(),
            step_count: snapshot.position,
            endstop: snapshot.line_level(),
            stepper_microstep: snapshot.microsteps,
        }
    }

    pub fn to_json(&self) -> String {
        // Only integers and a string; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Transport-neutral response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn new(code: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            code,
            content_type,
            body: body.into(),
        }
    }

    fn status(report: &StatusReport) -> Self {
        Self::new(200, JSON, report.to_json())
    }

    fn ko(code: u16, message: &str) -> Self {
        Self::new(code, JSON, json!({"status": "KO", "message": message}).to_string())
    }
}

pub fn move_reply(report: &MoveReport) -> Reply {
    match &report.outcome {
        MoveOutcome::RejectedMalformed(Malformed::Syntax(msg)) => {
            Reply::new(400, HTML, format!("Error in parsin json body! <br>{msg}"))
        }
        MoveOutcome::RejectedMalformed(m @ Malformed::Incomplete) => Reply::ko(400, &m.to_string()),
        outcome => {
            let status = move_status(outcome).unwrap_or(COMPLETE);
            Reply::status(&StatusReport::new(status, &report.snapshot))
        }
    }
}

pub fn park_reply(report: &ParkReport) -> Reply {
    Reply::status(&StatusReport::new(
        park_status(report.outcome),
        &report.snapshot,
    ))
}

pub fn info_reply(report: &InfoReport) -> Reply {
    Reply::status(&StatusReport::new(
        report.identity.as_str(),
        &report.snapshot,
    ))
}

/// Driver or state failure while serving a request.
pub fn error_reply(err: &eyre::Report) -> Reply {
    Reply::ko(500, &format!("{err:#}"))
}

pub fn banner_reply() -> Reply {
    Reply::new(200, HTML, BANNER)
}

pub fn not_found_reply(uri: &str, method: &str, args: &[(String, String)]) -> Reply {
    let mut body = format!(
        "File Not Found\n\nURI: {uri}\nMethod: {method}\nArguments: {}\n",
        args.len()
    );
    for (name, value) in args {
        body.push_str(&format!(" {name}: {value}\n"));
    }
    Reply::new(404, TEXT, body)
}
