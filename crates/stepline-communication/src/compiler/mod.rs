//! Section to block compilation
//!
//! The [`Compiler`] walks a sliced section list once and emits the
//! [`Block`]s the firmware executes. Positions are converted to absolute
//! step counts and rounded once, so each block carries the difference
//! between two rounded absolute positions and rounding error never adds up.
//! Time is handled the same way, in milliseconds. A section that rounds to
//! zero steps or zero milliseconds is folded into the next block, unless
//! the carried time would no longer fit one block.

pub mod block;
pub mod trigger;

pub use block::{Block, BLOCK_ID_MODULUS};
pub use trigger::{Trigger, TriggerTable};

use stepline_core::{Axis, CompileError, StepScale, MAX_WIRE_VALUE};
use stepline_planner::{Action, Section};

/// Blocks and triggers of one run
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Blocks in execution order
    pub blocks: Vec<Block>,
    /// Triggers referenced by the blocks
    pub triggers: TriggerTable,
}

impl Program {
    /// Forget the previous run, keeping allocations
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.triggers.clear();
    }

    /// True when there is nothing to send
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of the step deltas of all move blocks
    pub fn total_steps(&self) -> [i64; 3] {
        let mut total = [0i64; 3];
        for block in &self.blocks {
            if let Block::Move { steps, .. } = block {
                for (t, s) in total.iter_mut().zip(steps) {
                    *t += *s as i64;
                }
            }
        }
        total
    }

    /// Sum of the durations of all blocks in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.blocks.iter().map(|b| b.duration_ms() as u64).sum()
    }
}

/// Turns sections into blocks
#[derive(Debug, Clone)]
pub struct Compiler {
    scale: StepScale,
    next_id: u16,
}

impl Compiler {
    /// Create a compiler for the given steps-per-meter scale
    pub fn new(scale: StepScale) -> Self {
        Self { scale, next_id: 0 }
    }

    /// The scale used to convert meters to steps
    pub fn scale(&self) -> &StepScale {
        &self.scale
    }

    /// Compile `sections` into `program`, replacing its previous content
    ///
    /// Block ids continue from the previous compilation.
    pub fn compile(&mut self, sections: &[Section], program: &mut Program) -> Result<(), CompileError> {
        program.clear();
        let Some(first) = sections.first() else {
            return Ok(());
        };

        let mut state = Cursor {
            emitted: self.scale.to_steps(&first.p0),
            emitted_ms: to_ms(first.at),
            target: self.scale.to_steps(&first.p0),
            target_ms: to_ms(first.at),
        };

        for section in sections {
            if section.is_motion() {
                let target_ms = to_ms(section.end_time());
                if target_ms - state.emitted_ms > MAX_WIRE_VALUE as i64 {
                    self.settle(&mut state, program)?;
                }
                state.target = self.scale.to_steps(&section.p1);
                state.target_ms = target_ms;
                let duration = state.target_ms - state.emitted_ms;
                if duration > 0 && state.target != state.emitted {
                    self.emit_move(&mut state, duration, program)?;
                }
            }
            for action in &section.actions {
                self.flush(&mut state, program)?;
                self.emit_action(action, program)?;
            }
        }
        self.flush(&mut state, program)?;

        tracing::debug!(
            "Compiled {} sections into {} blocks and {} triggers",
            sections.len(),
            program.blocks.len(),
            program.triggers.len()
        );
        Ok(())
    }

    /// Emit whatever motion is still pending, taking at least 1 ms
    fn flush(&mut self, state: &mut Cursor, program: &mut Program) -> Result<(), CompileError> {
        if state.target != state.emitted {
            let duration = (state.target_ms - state.emitted_ms).max(1);
            self.emit_move(state, duration, program)?;
        }
        Ok(())
    }

    /// Emit the time carried so far, even without steps, so the next block fits
    fn settle(&mut self, state: &mut Cursor, program: &mut Program) -> Result<(), CompileError> {
        let duration = state.target_ms - state.emitted_ms;
        if duration > 0 {
            tracing::debug!("Emitting {} ms of carried motion time", duration);
            self.emit_move(state, duration, program)?;
        }
        Ok(())
    }

    fn emit_move(
        &mut self,
        state: &mut Cursor,
        duration: i64,
        program: &mut Program,
    ) -> Result<(), CompileError> {
        let duration = to_wire(duration).ok_or(CompileError::DurationOverflow { ms: duration })?;
        let mut steps = [0i16; 3];
        for axis in Axis::ALL {
            let i = axis.index();
            let delta = state.target[i] - state.emitted[i];
            steps[i] = to_wire(delta).ok_or_else(|| {
                tracing::error!("Step delta {} on {} does not fit a block", delta, axis);
                CompileError::StepOverflow { axis, steps: delta }
            })?;
        }

        let id = self.next_id as i16;
        self.next_id = (self.next_id + 1) % BLOCK_ID_MODULUS;
        program.blocks.push(Block::Move { duration, steps, id });

        state.emitted = state.target;
        state.emitted_ms += duration as i64;
        Ok(())
    }

    fn emit_action(&mut self, action: &Action, program: &mut Program) -> Result<(), CompileError> {
        match action {
            Action::Wait => program.blocks.push(Block::Wait),
            Action::Delay { seconds } => {
                let mut remaining = to_ms(*seconds);
                while remaining > 0 {
                    let chunk = remaining.min(MAX_WIRE_VALUE as i64);
                    program.blocks.push(Block::Delay { ms: chunk as i16 });
                    remaining -= chunk;
                }
            }
            Action::Trigger { callback, arg } => {
                let id = program.triggers.register(callback.clone(), *arg)?;
                program.blocks.push(Block::Trigger { id, arg: *arg });
            }
            Action::Move { p, .. } => {
                tracing::error!("Move to {} found among section actions", p);
                return Err(CompileError::InvalidPlan {
                    reason: format!("move to {} cannot be compiled as an action", p),
                });
            }
        }
        Ok(())
    }
}

/// Positions and times already emitted versus reached by the sections
struct Cursor {
    emitted: [i64; 3],
    emitted_ms: i64,
    target: [i64; 3],
    target_ms: i64,
}

fn to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

fn to_wire(value: i64) -> Option<i16> {
    i16::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stepline_core::V3;

    fn scale() -> StepScale {
        StepScale::new(1000.0, 1000.0, 1000.0)
    }

    fn moving(p0: V3, p1: V3, at: f64, t: f64) -> Section {
        Section::from_motion(p0, (p1 - p0) / t, V3::ZERO, t, at)
    }

    #[test]
    fn test_single_move() {
        let mut compiler = Compiler::new(scale());
        let mut program = Program::default();
        let sections = [moving(V3::ZERO, V3::new(0.01, -0.002, 0.0), 0.0, 0.012)];
        compiler.compile(&sections, &mut program).unwrap();
        assert_eq!(
            program.blocks,
            vec![Block::Move {
                duration: 12,
                steps: [10, -2, 0],
                id: 0
            }]
        );
    }

    #[test]
    fn test_sub_step_sections_accumulate() {
        let mut compiler = Compiler::new(scale());
        let mut program = Program::default();
        // 0.4 steps per section: nothing until the rounded position moves
        let sections: Vec<Section> = (0..5)
            .map(|k| {
                let p0 = V3::new(0.0004 * k as f64, 0.0, 0.0);
                moving(p0, p0 + V3::new(0.0004, 0.0, 0.0), 0.01 * k as f64, 0.01)
            })
            .collect();
        compiler.compile(&sections, &mut program).unwrap();
        assert_eq!(program.total_steps(), [2, 0, 0]);
        // the last section does not reach a new step and is dropped
        assert_eq!(program.duration_ms(), 40);
        assert_eq!(program.blocks.len(), 2);
    }

    #[test]
    fn test_carried_time_is_emitted_before_overflow() {
        let mut compiler = Compiler::new(scale());
        let mut program = Program::default();
        let start = V3::new(0.0004, 0.0, 0.0);
        let sections = [
            moving(V3::ZERO, start, 0.0, 1.0),
            moving(start, V3::new(0.0014, 0.0, 0.0), 1.0, 32.0),
        ];
        compiler.compile(&sections, &mut program).unwrap();
        assert_eq!(
            program.blocks,
            vec![
                Block::Move {
                    duration: 1000,
                    steps: [0, 0, 0],
                    id: 0
                },
                Block::Move {
                    duration: 32000,
                    steps: [1, 0, 0],
                    id: 1
                },
            ]
        );
        assert_eq!(program.duration_ms(), 33000);
    }

    #[test]
    fn test_delay_split() {
        let mut compiler = Compiler::new(scale());
        let mut program = Program::default();
        let sections = [Section::with_action(V3::ZERO, 0.0, Action::Delay { seconds: 70.0 })];
        compiler.compile(&sections, &mut program).unwrap();
        assert_eq!(
            program.blocks,
            vec![
                Block::Delay { ms: 32767 },
                Block::Delay { ms: 32767 },
                Block::Delay { ms: 4466 },
            ]
        );
    }

    #[test]
    fn test_zero_delay_emits_nothing() {
        let mut compiler = Compiler::new(scale());
        let mut program = Program::default();
        let sections = [Section::with_action(V3::ZERO, 0.0, Action::Delay { seconds: 0.0 })];
        compiler.compile(&sections, &mut program).unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn test_trigger_registered_before_block() {
        let mut compiler = Compiler::new(scale());
        let mut program = Program::default();
        let action = Action::Trigger {
            callback: Arc::new(|_| {}),
            arg: 42,
        };
        let sections = [
            Section::with_action(V3::ZERO, 0.0, action.clone()),
            Section::with_action(V3::ZERO, 0.0, Action::Wait),
            Section::with_action(V3::ZERO, 0.0, action),
        ];
        compiler.compile(&sections, &mut program).unwrap();
        assert_eq!(
            program.blocks,
            vec![
                Block::Trigger { id: 0, arg: 42 },
                Block::Wait,
                Block::Trigger { id: 1, arg: 42 },
            ]
        );
        assert_eq!(program.triggers.len(), 2);
        assert_eq!(program.triggers.get(1).unwrap().arg, 42);
        assert!(program.triggers.get(2).is_none());
        assert!(program.triggers.get(-1).is_none());
    }

    #[test]
    fn test_block_ids_wrap() {
        let mut compiler = Compiler::new(scale());
        compiler.next_id = BLOCK_ID_MODULUS - 1;
        let mut program = Program::default();
        let sections = [
            moving(V3::ZERO, V3::new(0.001, 0.0, 0.0), 0.0, 0.01),
            moving(V3::new(0.001, 0.0, 0.0), V3::new(0.002, 0.0, 0.0), 0.01, 0.01),
        ];
        compiler.compile(&sections, &mut program).unwrap();
        let ids: Vec<i16> = program
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Move { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![9999, 0]);
    }

    #[test]
    fn test_step_overflow() {
        let mut compiler = Compiler::new(StepScale::new(100000.0, 1000.0, 1000.0));
        let mut program = Program::default();
        let sections = [moving(V3::ZERO, V3::new(0.5, 0.0, 0.0), 0.0, 1.0)];
        let err = compiler.compile(&sections, &mut program).unwrap_err();
        assert!(matches!(err, CompileError::StepOverflow { axis: Axis::X, steps: 50000 }));
    }

    #[test]
    fn test_move_action_rejected() {
        let mut compiler = Compiler::new(scale());
        let mut program = Program::default();
        let sections = [Section::with_action(
            V3::ZERO,
            0.0,
            Action::Move {
                p: V3::ZERO,
                speed: 1.0,
            },
        )];
        assert!(compiler.compile(&sections, &mut program).is_err());
    }
}
