//! Stepper status report parsing
//!
//! The firmware answers a status query with a JSON array of exactly 14
//! values:
//!
//! ```text
//! [state, available, block_id, block_ms, milliseconds, interrupts, trigger,
//!  sx, sy, sz, ex, ey, ez, millis]
//! ```
//!
//! where `state` is `"i"` (idle), `"e"` (executing) or `"t"` (stopped on a
//! trigger).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Nothing to execute
    Idle,
    /// Executing buffered blocks
    Executing,
    /// Stopped on a trigger block, waiting for a continue command
    Triggered,
}

impl DeviceState {
    /// Wire code of the state
    pub fn code(&self) -> &'static str {
        match self {
            DeviceState::Idle => "i",
            DeviceState::Executing => "e",
            DeviceState::Triggered => "t",
        }
    }

    /// Parse a wire code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i" => Some(DeviceState::Idle),
            "e" => Some(DeviceState::Executing),
            "t" => Some(DeviceState::Triggered),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Idle => write!(f, "Idle"),
            DeviceState::Executing => write!(f, "Executing"),
            DeviceState::Triggered => write!(f, "Triggered"),
        }
    }
}

/// A decoded status report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Execution state
    pub state: DeviceState,
    /// Blocks buffered on the device and not yet executed
    pub available: u32,
    /// Id of the block being executed, -1 when idle
    pub block_id: i32,
    /// Duration of the block being executed in milliseconds
    pub block_ms: i32,
    /// Time elapsed in the current block in milliseconds
    pub milliseconds: i32,
    /// Step interrupts counted by the firmware
    pub interrupts: i64,
    /// Id of the last trigger reached
    pub trigger: i32,
    /// Position of the stepper motors in steps
    pub stepper_position: [i32; 3],
    /// Position reported by the encoders in steps
    pub encoder_position: [i32; 3],
    /// Device uptime in milliseconds
    pub millis: u64,
}

type StatusArray = (
    String,
    u32,
    i32,
    i32,
    i32,
    i64,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    u64,
);

impl DeviceStatus {
    /// An idle device at step position `position`
    pub fn idle(position: [i32; 3]) -> Self {
        Self {
            state: DeviceState::Idle,
            available: 0,
            block_id: -1,
            block_ms: 0,
            milliseconds: 0,
            interrupts: 0,
            trigger: -1,
            stepper_position: position,
            encoder_position: position,
            millis: 0,
        }
    }

    /// Parse a status report
    pub fn parse(reply: &str) -> Result<Self, String> {
        let (code, available, block_id, block_ms, milliseconds, interrupts, trigger, sx, sy, sz, ex, ey, ez, millis): StatusArray =
            serde_json::from_str(reply.trim()).map_err(|e| format!("invalid status array: {}", e))?;
        let state =
            DeviceState::from_code(&code).ok_or_else(|| format!("unknown state code '{}'", code))?;
        Ok(Self {
            state,
            available,
            block_id,
            block_ms,
            milliseconds,
            interrupts,
            trigger,
            stepper_position: [sx, sy, sz],
            encoder_position: [ex, ey, ez],
            millis,
        })
    }

    /// Encode the status the way the firmware reports it
    pub fn to_reply(&self) -> String {
        let [sx, sy, sz] = self.stepper_position;
        let [ex, ey, ez] = self.encoder_position;
        let array: StatusArray = (
            self.state.code().to_string(),
            self.available,
            self.block_id,
            self.block_ms,
            self.milliseconds,
            self.interrupts,
            self.trigger,
            sx,
            sy,
            sz,
            ex,
            ey,
            ez,
            self.millis,
        );
        serde_json::to_string(&array).unwrap_or_default()
    }

    /// True while the device still has blocks to execute
    pub fn is_busy(&self) -> bool {
        self.state != DeviceState::Idle || self.available != 0 || self.block_id != -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let status =
            DeviceStatus::parse(r#"["e",3,42,14,6,1200,-1,100,-200,0,99,-201,0,123456]"#).unwrap();
        assert_eq!(status.state, DeviceState::Executing);
        assert_eq!(status.available, 3);
        assert_eq!(status.block_id, 42);
        assert_eq!(status.stepper_position, [100, -200, 0]);
        assert_eq!(status.encoder_position, [99, -201, 0]);
        assert_eq!(status.millis, 123456);
        assert!(status.is_busy());
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert!(DeviceStatus::parse(r#"["i",0,-1,0,0,0,-1,0,0,0,0,0,0]"#).is_err());
        assert!(DeviceStatus::parse(r#"["i",0,-1,0,0,0,-1,0,0,0,0,0,0,0,0]"#).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_state() {
        let err = DeviceStatus::parse(r#"["x",0,-1,0,0,0,-1,0,0,0,0,0,0,0]"#).unwrap_err();
        assert!(err.contains("unknown state"));
    }

    #[test]
    fn test_reply_roundtrip_and_idle() {
        let status = DeviceStatus::idle([1, 2, 3]);
        assert!(!status.is_busy());
        assert_eq!(DeviceStatus::parse(&status.to_reply()).unwrap(), status);
    }
}
