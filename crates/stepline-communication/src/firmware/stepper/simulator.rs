//! In-memory stepper firmware
//!
//! [`DeviceSimulator`] speaks the stepper protocol without hardware. It
//! keeps a bounded block buffer and answers `RE` when it is full. Time
//! advances one block per status query, which makes runs deterministic:
//! each `S` retires the block in progress and starts the next one. A
//! trigger block stops execution in the Triggered state until `C` arrives.
//!
//! The simulator's state lives behind a shared handle so tests can inspect
//! it after the simulator has been moved into a controller.

use super::protocol::Command;
use super::response_parser::Reply;
use super::status_parser::{DeviceState, DeviceStatus};
use crate::communication::Transport;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use stepline_core::Result;

/// Block buffer size of the firmware
pub const DEFAULT_CAPACITY: usize = 64;

/// Observable state of a [`DeviceSimulator`]
#[derive(Debug, Default)]
pub struct SimulatorState {
    /// Every line received, in order
    pub received: Vec<String>,
    /// Buffered commands accepted so far, in order
    pub accepted: Vec<Command>,
    /// Stepper position in steps
    pub position: [i32; 3],
    /// Last velocity set by a move-at command
    pub velocity: [i32; 3],
    /// Triggers reached, in order
    pub triggers: Vec<i16>,
    /// Number of `RE` replies sent
    pub retries: usize,
    /// Replies to send instead of the normal answer, consumed in order
    pub injected: VecDeque<String>,
    queue: VecDeque<Command>,
    current: Option<Command>,
    triggered: Option<i16>,
    millis: u64,
}

/// Shared view of a simulator's state
pub type SimulatorHandle = Arc<Mutex<SimulatorState>>;

/// Protocol-level model of the stepper firmware
#[derive(Debug, Clone)]
pub struct DeviceSimulator {
    capacity: usize,
    state: SimulatorHandle,
}

impl DeviceSimulator {
    /// A simulator with the firmware's buffer size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A simulator buffering at most `capacity` blocks
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            state: Arc::new(Mutex::new(SimulatorState::default())),
        }
    }

    /// Start at step position `position`
    pub fn at_position(self, position: [i32; 3]) -> Self {
        self.state.lock().position = position;
        self
    }

    /// Shared handle on the simulator's state
    pub fn handle(&self) -> SimulatorHandle {
        self.state.clone()
    }

    fn reply(&self, line: &str) -> Reply {
        let mut state = self.state.lock();
        state.received.push(line.to_string());

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => return Reply::Error(e),
        };

        if command.is_buffered() {
            if state.queue.len() >= self.capacity {
                state.retries += 1;
                return Reply::Retry;
            }
            state.queue.push_back(command);
            state.accepted.push(command);
            return Reply::Ok;
        }

        match command {
            Command::Status => Reply::Status(state.step()),
            Command::Continue => {
                state.triggered = None;
                Reply::Ok
            }
            Command::MoveTo { target, .. } => {
                if state.is_busy() {
                    return Reply::Error("busy".to_string());
                }
                state.position = target;
                Reply::Ok
            }
            Command::MoveAt { velocity } => {
                state.velocity = velocity;
                Reply::Ok
            }
            _ => Reply::Error(format!("unexpected command '{}'", line)),
        }
    }
}

impl Default for DeviceSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorState {
    fn is_busy(&self) -> bool {
        self.triggered.is_some() || self.current.is_some() || !self.queue.is_empty()
    }

    /// Retire the block in progress, start the next one and report
    fn step(&mut self) -> DeviceStatus {
        if self.triggered.is_none() {
            self.current = self.queue.pop_front();
            match self.current {
                Some(Command::Move {
                    duration, steps, ..
                }) => {
                    for (p, s) in self.position.iter_mut().zip(steps) {
                        *p += s as i32;
                    }
                    self.millis += duration as u64;
                }
                Some(Command::Delay { ms }) => self.millis += ms as u64,
                Some(Command::Trigger { id, .. }) => {
                    self.triggered = Some(id);
                    self.triggers.push(id);
                }
                _ => {}
            }
        }

        let (block_id, block_ms) = match self.current {
            Some(Command::Move { id, duration, .. }) => (id as i32, duration as i32),
            Some(Command::Delay { ms }) => (0, ms as i32),
            Some(_) => (0, 0),
            None => (-1, 0),
        };
        let state = if self.triggered.is_some() {
            DeviceState::Triggered
        } else if self.current.is_some() || !self.queue.is_empty() {
            DeviceState::Executing
        } else {
            DeviceState::Idle
        };
        DeviceStatus {
            state,
            available: self.queue.len() as u32,
            block_id,
            block_ms,
            milliseconds: 0,
            interrupts: 0,
            trigger: self.triggered.map(i32::from).unwrap_or(-1),
            stepper_position: self.position,
            encoder_position: self.position,
            millis: self.millis,
        }
    }
}

impl Transport for DeviceSimulator {
    fn exchange(&mut self, line: &str) -> Result<String> {
        let injected = {
            let mut state = self.state.lock();
            let injected = state.injected.pop_front();
            if injected.is_some() {
                state.received.push(line.to_string());
            }
            injected
        };
        Ok(match injected {
            Some(reply) => reply,
            None => self.reply(line).to_string(),
        })
    }

    fn name(&self) -> String {
        "simulator".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_buffer_answers_retry() {
        let mut sim = DeviceSimulator::with_capacity(1);
        assert_eq!(sim.exchange("W").unwrap(), "OK");
        assert_eq!(sim.exchange("D5").unwrap(), "RE");
        assert_eq!(sim.handle().lock().retries, 1);
    }

    #[test]
    fn test_status_executes_one_block() {
        let mut sim = DeviceSimulator::new();
        sim.exchange("M[10,5,-5,0,0]").unwrap();
        sim.exchange("M[10,5,-5,0,1]").unwrap();

        let status = DeviceStatus::parse(&sim.exchange("S").unwrap()).unwrap();
        assert_eq!(status.state, DeviceState::Executing);
        assert_eq!(status.block_id, 0);
        assert_eq!(status.available, 1);

        sim.exchange("S").unwrap();
        let status = DeviceStatus::parse(&sim.exchange("S").unwrap()).unwrap();
        assert_eq!(status.state, DeviceState::Idle);
        assert_eq!(status.stepper_position, [10, -10, 0]);
        assert!(!status.is_busy());
    }

    #[test]
    fn test_trigger_waits_for_continue() {
        let mut sim = DeviceSimulator::new();
        sim.exchange("T[3,1]").unwrap();
        sim.exchange("W").unwrap();

        for _ in 0..2 {
            let status = DeviceStatus::parse(&sim.exchange("S").unwrap()).unwrap();
            assert_eq!(status.state, DeviceState::Triggered);
            assert_eq!(status.trigger, 3);
        }
        assert_eq!(sim.exchange("C").unwrap(), "OK");
        let status = DeviceStatus::parse(&sim.exchange("S").unwrap()).unwrap();
        assert_eq!(status.state, DeviceState::Executing);
        assert_eq!(sim.handle().lock().triggers, vec![3]);
    }

    #[test]
    fn test_unknown_command() {
        let mut sim = DeviceSimulator::new();
        assert!(sim.exchange("Q").unwrap().starts_with("ERR"));
    }

    #[test]
    fn test_injected_replies_take_precedence() {
        let mut sim = DeviceSimulator::new();
        sim.handle().lock().injected.push_back("RE".to_string());
        assert_eq!(sim.exchange("W").unwrap(), "RE");
        assert_eq!(sim.exchange("W").unwrap(), "OK");
        assert_eq!(sim.handle().lock().accepted.len(), 1);
    }
}
