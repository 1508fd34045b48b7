use crate::action::CommandSpec;
use crate::error::ExecutionError;
use std::future::Future;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

#[doc(hidden)]
pub mod fake;

/// Runs the external command behind an action.
///
/// Dispatch is split in two so callers can timestamp the moment the command
/// has been started separately from the moment its output has been drained.
pub trait CommandExecutor: Send + Sync + 'static {
    type Running: RunningCommand;

    fn spawn(&self, command: &CommandSpec) -> Result<Self::Running, ExecutionError>;
}

pub trait RunningCommand: Send + 'static {
    /// Waits for the command to finish and returns its standard output.
    fn collect(self) -> impl Future<Output = Result<String, ExecutionError>> + Send;
}

/// Executes commands as child processes on the local machine.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor;

pub struct SystemProcess {
    program: String,
    child: Child,
}

impl CommandExecutor for SystemExecutor {
    type Running = SystemProcess;

    fn spawn(&self, command: &CommandSpec) -> Result<SystemProcess, ExecutionError> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        debug!("Spawned `{}` as pid {:?}", command, child.id());
        Ok(SystemProcess {
            program: command.program.clone(),
            child,
        })
    }
}

impl RunningCommand for SystemProcess {
    async fn collect(self) -> Result<String, ExecutionError> {
        let output = self
            .child
            .wait_with_output()
            .await
            .map_err(|source| ExecutionError::Wait {
                program: self.program.clone(),
                source,
            })?;

        // tools like `ps` and `netstat` exit non-zero on warnings while still
        // printing a usable listing; only an empty failure is an error
        if !output.status.success() && output.stdout.is_empty() {
            return Err(ExecutionError::Exited {
                program: self.program,
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
