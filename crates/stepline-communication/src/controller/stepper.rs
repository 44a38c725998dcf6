//! Stepper firmware controller
//!
//! [`StepperController`] owns a [`Transport`] to the firmware and the
//! compiled program of the current run. All protocol traffic goes through
//! one lock, so a status query from the caller's thread never interleaves
//! with a block sent by the background worker.
//!
//! Sending follows the firmware's back-pressure rules: a block answered
//! with `RE` is resent after a backoff, during which the status is polled
//! so triggers reached in the meantime are dispatched. Trigger callbacks
//! always run outside the lock.

use super::{
    claim_direct, compile_script, direct_speed, reserve, target_steps, validate_moveto,
    velocity_steps, ControllerConfig, MotionController, MoveTarget, RunMode, RunPhase, RunStats,
    RunWorker,
};
use crate::communication::serial::SerialTransport;
use crate::communication::{ConnectionParams, Transport};
use crate::compiler::{Block, Compiler, Program};
use crate::firmware::stepper::{Command, DeviceState, DeviceStatus, Reply};
use parking_lot::Mutex;
use std::sync::Arc;
use stepline_core::{MachineLimits, ProtocolError, Result, V3};
use stepline_planner::{Planner, Script};

/// Controller for stepper firmware on a serial port
pub type SerialController = StepperController<SerialTransport>;

/// Controller speaking the stepper protocol over a [`Transport`]
pub struct StepperController<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
    worker: RunWorker,
}

struct Shared<T> {
    config: ControllerConfig,
    planner: Planner,
    core: Mutex<Core<T>>,
}

struct Core<T> {
    transport: T,
    compiler: Compiler,
    program: Program,
    phase: RunPhase,
    status: Option<DeviceStatus>,
    /// Trigger whose callback is running; set until `C` has been sent
    dispatching: Option<i32>,
    stats: RunStats,
}

impl<T: Transport> Core<T> {
    fn round_trip(&mut self, line: &str) -> Result<String> {
        self.stats.commands += 1;
        self.transport.exchange(line)
    }
}

impl StepperController<SerialTransport> {
    /// Open the serial port described by `params`
    pub fn open(params: &ConnectionParams, config: ControllerConfig) -> Result<Self> {
        let transport = SerialTransport::open(params)?;
        Self::new(transport, config)
    }
}

impl<T: Transport + 'static> StepperController<T> {
    /// Create a controller over an open transport
    pub fn new(transport: T, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let planner = Planner::new(config.limits)?;
        tracing::info!("Stepper controller on {}", transport.name());
        let core = Core {
            transport,
            compiler: Compiler::new(config.scale),
            program: Program::default(),
            phase: RunPhase::Idle,
            status: None,
            dispatching: None,
            stats: RunStats::default(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                planner,
                core: Mutex::new(core),
            }),
            worker: RunWorker::default(),
        })
    }

    /// Controller configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Current run phase
    pub fn phase(&self) -> RunPhase {
        self.shared.core.lock().phase
    }

    /// Protocol counters since the controller was created
    pub fn stats(&self) -> RunStats {
        self.shared.core.lock().stats
    }

    /// Last status reported by the device
    pub fn last_status(&self) -> Option<DeviceStatus> {
        self.shared.core.lock().status
    }

    /// Query the device status, dispatching a pending trigger
    pub fn update_status(&self) -> Result<DeviceStatus> {
        self.shared.update_status()
    }

    /// Resume a device stopped at a trigger
    pub fn continue_script(&self) -> Result<()> {
        self.shared.continue_script()
    }

    fn prepare(&self, script: &Script) -> Result<()> {
        script.validate(&self.shared.config.limits)?;
        let origin = self.shared.position()?;
        let mut core = self.shared.core.lock();
        let Core {
            compiler, program, ..
        } = &mut *core;
        compile_script(
            &self.shared.planner,
            &self.shared.config.slicer,
            compiler,
            program,
            script,
            origin,
        )?;
        core.phase = RunPhase::Ready;
        Ok(())
    }
}

impl<T: Transport + 'static> MotionController for StepperController<T> {
    fn limits(&self) -> &MachineLimits {
        &self.shared.config.limits
    }

    fn run(&self, script: &Script, mode: RunMode) -> Result<()> {
        reserve(&mut self.shared.core.lock().phase)?;

        if let Err(e) = self.prepare(script) {
            tracing::warn!("Script rejected: {}", e);
            self.shared.set_phase(RunPhase::Idle);
            return Err(e);
        }
        self.shared.set_phase(RunPhase::Executing);

        match mode {
            RunMode::Sync => self.shared.finish(self.shared.execute()),
            RunMode::Async => {
                let shared = Arc::clone(&self.shared);
                let spawned = self.worker.spawn(move || shared.finish(shared.execute()));
                if spawned.is_err() {
                    self.shared.set_phase(RunPhase::Idle);
                }
                spawned
            }
        }
    }

    fn join(&self) -> Result<()> {
        self.worker.join()
    }

    fn is_busy(&self) -> Result<bool> {
        if self.phase() != RunPhase::Idle {
            return Ok(true);
        }
        Ok(self.shared.update_status()?.is_busy())
    }

    fn get_position(&self) -> Result<V3> {
        self.shared.position()
    }

    fn moveto(&self, target: MoveTarget, speed: f64) -> Result<()> {
        let config = &self.shared.config;
        self.shared.direct("moveto", |shared| {
            validate_moveto(&config.limits, &target, speed)?;
            let speed = direct_speed(&config.limits, &config.scale, &target, speed);
            if speed == 0 {
                return Ok(());
            }
            let current = shared.update_status()?.stepper_position;
            let target = target_steps(&config.scale, &target, current);
            tracing::info!("Direct move to {:?} at {} steps/s", target, speed);
            shared.send(&Command::MoveTo { speed, target })
        })
    }

    fn moveat(&self, velocity: V3) -> Result<()> {
        let config = &self.shared.config;
        self.shared.direct("moveat", |shared| {
            config.limits.check_velocity(&velocity)?;
            let velocity = velocity_steps(&config.scale, &velocity);
            tracing::info!("Constant velocity {:?} steps/s", velocity);
            shared.send(&Command::MoveAt { velocity })
        })
    }

    fn execute_block(&self, block: &Block) -> Result<()> {
        self.shared
            .direct("execute_block", |shared| shared.send(&Command::from(*block)))
    }
}

impl<T: Transport + 'static> Drop for StepperController<T> {
    fn drop(&mut self) {
        if let Err(e) = self.worker.join() {
            tracing::warn!("Background run ended with an error: {}", e);
        }
    }
}

impl<T: Transport> Shared<T> {
    fn set_phase(&self, phase: RunPhase) {
        self.core.lock().phase = phase;
    }

    /// Run one direct command while holding the controller against runs
    fn direct<R>(
        &self,
        operation: &'static str,
        command: impl FnOnce(&Self) -> Result<R>,
    ) -> Result<R> {
        claim_direct(&mut self.core.lock().phase, operation)?;
        let result = command(self);
        self.set_phase(RunPhase::Idle);
        result
    }

    /// Return to idle after a run, whatever its outcome
    fn finish(&self, result: Result<()>) -> Result<()> {
        self.set_phase(RunPhase::Idle);
        match &result {
            Ok(()) => tracing::info!("Run complete"),
            Err(e) => tracing::error!("Run failed: {}", e),
        }
        result
    }

    /// One command line out, one parsed reply back
    fn exchange(&self, command: &Command) -> Result<Reply> {
        let line = command.to_string();
        let raw = self.core.lock().round_trip(&line)?;
        parse_reply(line, raw)
    }

    /// Send a command, resending while the device buffer is full
    fn send(&self, command: &Command) -> Result<()> {
        let retry = self.config.retry;
        let mut attempts = 0;
        loop {
            match self.exchange(command)? {
                Reply::Ok => return Ok(()),
                Reply::Retry if attempts < retry.max_retries => {
                    attempts += 1;
                    self.core.lock().stats.backoffs += 1;
                    tracing::debug!("Device buffer full, retry {} of '{}'", attempts, command);
                    std::thread::sleep(retry.backoff);
                    self.update_status()?;
                }
                Reply::Retry => {
                    tracing::error!("Gave up on '{}' after {} retries", command, attempts);
                    return Err(ProtocolError::RetriesExhausted {
                        command: command.to_string(),
                        retries: attempts,
                    }
                    .into());
                }
                Reply::Error(message) => {
                    tracing::error!("Device rejected '{}': {}", command, message);
                    return Err(ProtocolError::DeviceError {
                        command: command.to_string(),
                        message,
                    }
                    .into());
                }
                Reply::Status(status) => {
                    return Err(ProtocolError::MalformedReply {
                        command: command.to_string(),
                        reply: status.to_reply(),
                    }
                    .into());
                }
            }
        }
    }

    /// Query the status; a reached trigger is dispatched by exactly one caller
    fn update_status(&self) -> Result<DeviceStatus> {
        let (reply, claimed) = {
            let mut core = self.core.lock();
            let line = Command::Status.to_string();
            let raw = core.round_trip(&line)?;
            let reply = parse_reply(line, raw)?;
            let mut claimed = None;
            if let Reply::Status(status) = reply {
                core.stats.status_queries += 1;
                core.status = Some(status);
                if status.state == DeviceState::Triggered && core.dispatching.is_none() {
                    core.dispatching = Some(status.trigger);
                    claimed = Some(status.trigger);
                }
            }
            (reply, claimed)
        };
        let status = match reply {
            Reply::Status(status) => status,
            Reply::Error(message) => {
                return Err(ProtocolError::DeviceError {
                    command: Command::Status.to_string(),
                    message,
                }
                .into())
            }
            other => {
                return Err(ProtocolError::MalformedReply {
                    command: Command::Status.to_string(),
                    reply: other.to_string(),
                }
                .into())
            }
        };
        if let Some(id) = claimed {
            self.dispatch(id)?;
        }
        Ok(status)
    }

    fn position(&self) -> Result<V3> {
        let status = self.update_status()?;
        Ok(self.config.scale.to_meters(&status.stepper_position))
    }

    /// Invoke the callback of trigger `id` and let the device continue
    ///
    /// Status queries made meanwhile, including from the callback, leave
    /// the trigger alone until `C` has been sent.
    fn dispatch(&self, id: i32) -> Result<()> {
        let trigger = self.core.lock().program.triggers.get(id).cloned();
        match trigger {
            Some(trigger) => {
                tracing::debug!("Trigger {} reached (arg {})", trigger.id, trigger.arg);
                trigger.fire();
                self.core.lock().stats.triggers_fired += 1;
            }
            None => tracing::warn!("Device reported unknown trigger {}", id),
        }
        let resumed = self.continue_script();
        self.core.lock().dispatching = None;
        resumed
    }

    fn continue_script(&self) -> Result<()> {
        match self.exchange(&Command::Continue)? {
            Reply::Ok => Ok(()),
            Reply::Error(message) => Err(ProtocolError::DeviceError {
                command: Command::Continue.to_string(),
                message,
            }
            .into()),
            other => Err(ProtocolError::MalformedReply {
                command: Command::Continue.to_string(),
                reply: other.to_string(),
            }
            .into()),
        }
    }

    /// Send every block of the compiled program, then wait for the device
    fn execute(&self) -> Result<()> {
        let count = self.core.lock().program.blocks.len();
        tracing::info!("Sending {} blocks", count);
        for index in 0..count {
            let block = self.core.lock().program.blocks[index];
            self.send(&Command::from(block))?;
            self.core.lock().stats.blocks_sent += 1;
        }
        self.wait_idle()
    }

    /// Poll the status until the device has nothing left to execute
    fn wait_idle(&self) -> Result<()> {
        let mut errors = 0;
        loop {
            match self.update_status() {
                Ok(status) if !status.is_busy() => return Ok(()),
                Ok(_) => errors = 0,
                Err(e) => {
                    errors += 1;
                    tracing::warn!("Status query failed ({} in a row): {}", errors, e);
                    if errors >= self.config.max_status_errors {
                        return Err(ProtocolError::WaitFailed { errors }.into());
                    }
                }
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

fn parse_reply(line: String, raw: String) -> Result<Reply> {
    tracing::trace!("{} -> {}", line, raw);
    Reply::parse(&raw).map_err(|reason| {
        tracing::error!("Malformed reply to '{}': {}", line, reason);
        ProtocolError::MalformedReply {
            command: line,
            reply: raw,
        }
        .into()
    })
}
