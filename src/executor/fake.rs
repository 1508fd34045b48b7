//! A deterministic executor that never touches the operating system.

use super::{CommandExecutor, RunningCommand};
use crate::action::CommandSpec;
use crate::error::ExecutionError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FakeExecutor {
    output: Option<String>,
    drain_delay: Duration,
    fail: bool,
    fail_drain_of: Option<String>,
    spawned: AtomicUsize,
}

pub struct FakeRun {
    program: String,
    output: String,
    drain_delay: Duration,
    fail_drain: bool,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command produces `output` instead of echoing its own name.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Delays output collection, simulating a slow command.
    pub fn with_drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    /// `program` starts fine but fails while its output is collected, like a
    /// command that dies before printing anything.
    pub fn with_drain_failure(mut self, program: impl Into<String>) -> Self {
        self.fail_drain_of = Some(program.into());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl CommandExecutor for FakeExecutor {
    type Running = FakeRun;

    fn spawn(&self, command: &CommandSpec) -> Result<FakeRun, ExecutionError> {
        if self.fail {
            return Err(ExecutionError::Other(format!("refusing to run `{}`", command)));
        }
        self.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(FakeRun {
            program: command.program.clone(),
            fail_drain: self.fail_drain_of.as_deref() == Some(command.program.as_str()),
            output: self
                .output
                .clone()
                .unwrap_or_else(|| format!("ran {}\n", command)),
            drain_delay: self.drain_delay,
        })
    }
}

impl RunningCommand for FakeRun {
    async fn collect(self) -> Result<String, ExecutionError> {
        if !self.drain_delay.is_zero() {
            tokio::time::sleep(self.drain_delay).await;
        }
        if self.fail_drain {
            return Err(ExecutionError::Other(format!("`{}` died", self.program)));
        }
        Ok(self.output)
    }
}
