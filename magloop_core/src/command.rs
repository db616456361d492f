//! Move request wire codec.
//!
//! Body: `{"direction": 0|1, "step": n, "acceleration": a, "deceleration": d}`.
//! Direction 0 moves away from home (position increases), 1 toward home.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Forward),
            1 => Some(Self::Reverse),
            _ => None,
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            Self::Forward => 1,
            Self::Reverse => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveCommand {
    pub direction: Direction,
    pub steps: u32,
    pub acceleration: u32,
    pub deceleration: u32,
}

impl MoveCommand {
    /// Signed position change this command asks for.
    pub fn delta(&self) -> i64 {
        self.direction.sign() * i64::from(self.steps)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
    /// Body is not JSON at all; carries the parser message.
    #[error("{0}")]
    Syntax(String),
    /// JSON, but a field is missing or out of range.
    #[error("No data found, or incorrect!")]
    Incomplete,
}

#[derive(Debug, Deserialize)]
struct MoveRequest {
    direction: u8,
    step: u32,
    acceleration: u32,
    deceleration: u32,
}

impl TryFrom<MoveRequest> for MoveCommand {
    type Error = Malformed;

    fn try_from(r: MoveRequest) -> Result<Self, Self::Error> {
        let direction = Direction::from_wire(r.direction).ok_or(Malformed::Incomplete)?;
        if r.acceleration == 0 || r.deceleration == 0 {
            return Err(Malformed::Incomplete);
        }
        Ok(Self {
            direction,
            steps: r.step,
            acceleration: r.acceleration,
            deceleration: r.deceleration,
        })
    }
}

/// Parse a move request body. Unknown extra fields are ignored.
pub fn parse_move(body: &[u8]) -> Result<MoveCommand, Malformed> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Malformed::Syntax(e.to_string()))?;
    let req: MoveRequest = serde_json::from_value(value).map_err(|_| Malformed::Incomplete)?;
    MoveCommand::try_from(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_reference_request() {
        let cmd =
            parse_move(br#"{"direction":0,"step":100,"acceleration":6000,"deceleration":3500}"#)
                .unwrap();
        assert_eq!(cmd.direction, Direction::Forward);
        assert_eq!(cmd.delta(), 100);
    }

    #[test]
    fn reverse_delta_is_negative() {
        let cmd = parse_move(br#"{"direction":1,"step":7,"acceleration":1,"deceleration":1}"#)
            .unwrap();
        assert_eq!(cmd.delta(), -7);
    }

    #[rstest]
    #[case(br#"{"direction":0,"step":10,"acceleration":1}"#.as_slice())]
    #[case(br#"{"direction":2,"step":10,"acceleration":1,"deceleration":1}"#.as_slice())]
    #[case(br#"{"direction":0,"step":-10,"acceleration":1,"deceleration":1}"#.as_slice())]
    #[case(br#"{"direction":0,"step":10,"acceleration":0,"deceleration":1}"#.as_slice())]
    #[case(br#"{"direction":"0","step":10,"acceleration":1,"deceleration":1}"#.as_slice())]
    #[case(br#"[1,2,3]"#.as_slice())]
    fn incomplete_requests(#[case] body: &[u8]) {
        assert_eq!(parse_move(body), Err(Malformed::Incomplete));
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"{direction:0}".as_slice())]
    #[case(br#"{"direction":0,"#.as_slice())]
    fn syntax_errors_carry_parser_text(#[case] body: &[u8]) {
        match parse_move(body) {
            Err(Malformed::Syntax(msg)) => assert!(msg.contains("line 1"), "msg={msg}"),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
