//! Device-free controller
//!
//! [`VirtualController`] compiles scripts exactly like the stepper
//! controller but executes the blocks itself: move blocks update a step
//! counter, delays are skipped and trigger callbacks run as soon as their
//! block is reached. In realtime mode moves and delays sleep for
//! their duration so the run takes as long as it would on a device.

use super::{
    claim_direct, compile_script, direct_speed, ensure_idle, reserve, target_steps,
    validate_moveto, velocity_steps, ControllerConfig, MotionController, MoveTarget, RunMode,
    RunPhase, RunStats, RunWorker,
};
use crate::compiler::{Block, Compiler, Program};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stepline_core::{MachineLimits, Result, V3};
use stepline_planner::{Planner, Script};

/// Controller that executes blocks in memory
pub struct VirtualController {
    shared: Arc<Shared>,
    worker: RunWorker,
}

struct Shared {
    config: ControllerConfig,
    planner: Planner,
    realtime: AtomicBool,
    core: Mutex<Core>,
}

struct Core {
    compiler: Compiler,
    program: Program,
    phase: RunPhase,
    position: [i32; 3],
    velocity: [i32; 3],
    stats: RunStats,
}

impl VirtualController {
    /// Create a controller starting at the origin
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let planner = Planner::new(config.limits)?;
        let core = Core {
            compiler: Compiler::new(config.scale),
            program: Program::default(),
            phase: RunPhase::Idle,
            position: [0; 3],
            velocity: [0; 3],
            stats: RunStats::default(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                planner,
                realtime: AtomicBool::new(false),
                core: Mutex::new(core),
            }),
            worker: RunWorker::default(),
        })
    }

    /// Sleep through moves and delays
    pub fn set_realtime(&self, realtime: bool) {
        self.shared.realtime.store(realtime, Ordering::Relaxed);
    }

    /// Place the tool at `p` without moving
    pub fn set_position(&self, p: V3) {
        let steps = self.shared.config.scale.to_steps(&p);
        self.shared.core.lock().position = steps.map(|s| s as i32);
    }

    /// Position in steps
    pub fn step_position(&self) -> [i32; 3] {
        self.shared.core.lock().position
    }

    /// Velocity of the last move-at command in steps per second
    pub fn velocity(&self) -> [i32; 3] {
        self.shared.core.lock().velocity
    }

    /// Current run phase
    pub fn phase(&self) -> RunPhase {
        self.shared.core.lock().phase
    }

    /// Execution counters since the controller was created
    pub fn stats(&self) -> RunStats {
        self.shared.core.lock().stats
    }

    /// Blocks of the last compiled script
    pub fn program_blocks(&self) -> Vec<Block> {
        self.shared.core.lock().program.blocks.clone()
    }
}

impl MotionController for VirtualController {
    fn limits(&self) -> &MachineLimits {
        &self.shared.config.limits
    }

    fn run(&self, script: &Script, mode: RunMode) -> Result<()> {
        reserve(&mut self.shared.core.lock().phase)?;

        if let Err(e) = self.shared.prepare(script) {
            tracing::warn!("Script rejected: {}", e);
            self.shared.core.lock().phase = RunPhase::Idle;
            return Err(e);
        }
        self.shared.core.lock().phase = RunPhase::Executing;

        match mode {
            RunMode::Sync => {
                self.shared.execute();
                Ok(())
            }
            RunMode::Async => {
                let shared = Arc::clone(&self.shared);
                let spawned = self.worker.spawn(move || {
                    shared.execute();
                    Ok(())
                });
                if spawned.is_err() {
                    self.shared.core.lock().phase = RunPhase::Idle;
                }
                spawned
            }
        }
    }

    fn join(&self) -> Result<()> {
        self.worker.join()
    }

    fn is_busy(&self) -> Result<bool> {
        Ok(self.phase() != RunPhase::Idle)
    }

    fn get_position(&self) -> Result<V3> {
        Ok(self.shared.config.scale.to_meters(&self.step_position()))
    }

    fn moveto(&self, target: MoveTarget, speed: f64) -> Result<()> {
        let config = &self.shared.config;
        let mut core = self.shared.core.lock();
        ensure_idle(core.phase, "moveto")?;
        validate_moveto(&config.limits, &target, speed)?;
        if direct_speed(&config.limits, &config.scale, &target, speed) == 0 {
            return Ok(());
        }
        core.position = target_steps(&config.scale, &target, core.position);
        Ok(())
    }

    fn moveat(&self, velocity: V3) -> Result<()> {
        let config = &self.shared.config;
        let mut core = self.shared.core.lock();
        ensure_idle(core.phase, "moveat")?;
        config.limits.check_velocity(&velocity)?;
        core.velocity = velocity_steps(&config.scale, &velocity);
        Ok(())
    }

    fn execute_block(&self, block: &Block) -> Result<()> {
        claim_direct(&mut self.shared.core.lock().phase, "execute_block")?;
        self.shared.step(block);
        self.shared.core.lock().phase = RunPhase::Idle;
        Ok(())
    }
}

impl Drop for VirtualController {
    fn drop(&mut self) {
        if let Err(e) = self.worker.join() {
            tracing::warn!("Background run ended with an error: {}", e);
        }
    }
}

impl Shared {
    fn prepare(&self, script: &Script) -> Result<()> {
        script.validate(&self.config.limits)?;
        let mut core = self.core.lock();
        let origin = self.config.scale.to_meters(&core.position);
        let Core {
            compiler, program, ..
        } = &mut *core;
        compile_script(&self.planner, &self.config.slicer, compiler, program, script, origin)?;
        core.phase = RunPhase::Ready;
        Ok(())
    }

    fn execute(&self) {
        let count = self.core.lock().program.blocks.len();
        tracing::info!("Executing {} blocks", count);
        for index in 0..count {
            let block = self.core.lock().program.blocks[index];
            self.step(&block);
        }
        self.core.lock().phase = RunPhase::Idle;
        tracing::info!("Run complete");
    }

    /// Execute one block
    fn step(&self, block: &Block) {
        match *block {
            Block::Move {
                duration, steps, ..
            } => {
                {
                    let mut core = self.core.lock();
                    for (p, s) in core.position.iter_mut().zip(steps) {
                        *p += s as i32;
                    }
                    core.stats.blocks_sent += 1;
                }
                self.pause(duration);
            }
            Block::Delay { ms } => {
                self.core.lock().stats.blocks_sent += 1;
                self.pause(ms);
            }
            Block::Trigger { id, .. } => {
                let trigger = {
                    let mut core = self.core.lock();
                    core.stats.blocks_sent += 1;
                    core.program.triggers.get(id as i32).cloned()
                };
                match trigger {
                    Some(trigger) => {
                        trigger.fire();
                        self.core.lock().stats.triggers_fired += 1;
                    }
                    None => tracing::warn!("Unknown trigger {}", id),
                }
            }
            Block::Wait => self.core.lock().stats.blocks_sent += 1,
        }
    }

    fn pause(&self, ms: i16) {
        if self.realtime.load(Ordering::Relaxed) && ms > 0 {
            std::thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use stepline_planner::ScriptBuilder;

    #[test]
    fn test_run_reaches_target() {
        let controller = VirtualController::new(ControllerConfig::default()).unwrap();
        let mut builder = ScriptBuilder::new();
        builder.begin(0.001).unwrap();
        builder.moveto(0.1, 0.05, 0.0, 1.0).unwrap();
        builder.moveto(0.1, 0.1, 0.01, 1.0).unwrap();
        let script = builder.end().unwrap();

        controller.run(&script, RunMode::Sync).unwrap();
        assert_eq!(controller.step_position(), [1000, 1000, 500]);
        assert!(!controller.is_busy().unwrap());
    }

    #[test]
    fn test_triggers_fire_in_order() {
        let controller = VirtualController::new(ControllerConfig::default()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut builder = ScriptBuilder::new();
        builder.begin(0.001).unwrap();
        builder.moveto(0.01, 0.0, 0.0, 1.0).unwrap();
        let counter = fired.clone();
        builder
            .trigger(
                move |event| {
                    assert_eq!(event.arg, 7);
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                7,
            )
            .unwrap();
        let script = builder.end().unwrap();

        controller.run(&script, RunMode::Sync).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(controller.stats().triggers_fired, 1);
    }

    #[test]
    fn test_moveat_maps_each_axis() {
        let controller = VirtualController::new(ControllerConfig::default()).unwrap();
        controller.moveat(V3::new(0.01, -0.02, 0.001)).unwrap();
        assert_eq!(controller.velocity(), [100, -200, 50]);
    }

    #[test]
    fn test_async_run_joins() {
        let controller = VirtualController::new(ControllerConfig::default()).unwrap();
        let script = {
            let mut builder = ScriptBuilder::new();
            builder.begin(0.001).unwrap();
            builder.moveto(0.02, 0.0, 0.0, 1.0).unwrap();
            builder.end().unwrap()
        };
        controller.run(&script, RunMode::Async).unwrap();
        controller.join().unwrap();
        assert_eq!(controller.step_position(), [200, 0, 0]);
    }
}
