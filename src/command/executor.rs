//! Command executor - turns a validated command into a shutdown invocation

use super::runner::{Invocation, ProcessOutput, ProcessRunner, SystemRunner};
use cease_shared::{Action, ActionError, Command};
use std::io;
use thiserror::Error;
use tracing::info;

/// The privileged shutdown facility
pub const SHUTDOWN_PATH: &str = "/sbin/shutdown";

/// Harmless stand-in used in dry-run mode
pub const ECHO_PATH: &str = "/bin/echo";

/// Why a command could not be carried out
#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    InvalidAction(#[from] ActionError),

    #[error("Could not exec {invocation}: {source}")]
    Spawn {
        invocation: String,
        #[source]
        source: io::Error,
    },

    #[error("{invocation} failed ({status}): {output}")]
    Failed {
        invocation: String,
        status: String,
        output: String,
    },
}

/// Executes power commands, either for real or as a dry run
pub struct CommandExecutor<R = SystemRunner> {
    dry_run: bool,
    runner: R,
}

impl<R: ProcessRunner> CommandExecutor<R> {
    /// Create a new command executor
    pub fn new(dry_run: bool, runner: R) -> Self {
        Self { dry_run, runner }
    }

    /// The process that would be spawned for an action
    pub fn invocation_for(&self, action: Action) -> Invocation {
        let flag = action.shutdown_flag();
        if self.dry_run {
            Invocation::new(ECHO_PATH, ["shutdown", flag, "now"])
        } else {
            Invocation::new(SHUTDOWN_PATH, [flag, "now"])
        }
    }

    /// Execute a command, spawning exactly one process for a valid action
    pub async fn execute(&self, command: &Command) -> Result<ProcessOutput, ExecError> {
        let action = command.parsed_action()?;
        let invocation = self.invocation_for(action);

        info!("[EXEC] {} -> {}", action, invocation);

        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|source| ExecError::Spawn {
                invocation: invocation.to_string(),
                source,
            })?;

        if !output.success {
            return Err(ExecError::Failed {
                invocation: invocation.to_string(),
                status: output.status,
                output: output.output,
            });
        }

        info!("[EXEC] exec: {}", output.output);
        Ok(output)
    }
}
