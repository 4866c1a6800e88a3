//! Synchronous subprocess execution.
//!
//! Steps describe the command they need as an [`Execution`] and hand it to an
//! [`Executor`]. Production code uses [`CommandExecutor`]; tests substitute a
//! recorder.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::error::ProvisionError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Execution {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command line for messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.command.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

pub trait Executor {
    /// Run to completion. A non-zero exit is an error.
    fn execute(&self, execution: &Execution) -> Result<()>;
}

/// Runs commands with inherited stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

impl Executor for CommandExecutor {
    fn execute(&self, execution: &Execution) -> Result<()> {
        info!(command = %execution.display(), "running");

        let mut cmd = Command::new(&execution.command);
        cmd.args(&execution.args)
            .envs(&execution.env)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &execution.dir {
            cmd.current_dir(dir);
        }

        let status = cmd
            .status()
            .with_context(|| format!("failed to execute '{}'", execution.display()))?;
        if !status.success() {
            return Err(ProvisionError::CommandFailed {
                command: execution.display(),
                code: status.code().unwrap_or(-1),
            }
            .into());
        }

        debug!(command = %execution.display(), "finished");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_builder_and_display() {
        let execution = Execution::new("/opt/ol/bin/server")
            .arg("create")
            .arg("defaultServer")
            .dir("/opt/ol")
            .env("JAVA_HOME", "/jdk");

        assert_eq!(execution.display(), "/opt/ol/bin/server create defaultServer");
        assert_eq!(execution.dir, Some(PathBuf::from("/opt/ol")));
        assert_eq!(execution.env.get("JAVA_HOME").unwrap(), "/jdk");
    }

    #[test]
    fn command_executor_success_and_failure() {
        CommandExecutor.execute(&Execution::new("true")).unwrap();

        let err = CommandExecutor
            .execute(&Execution::new("false"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::CommandFailed { code: 1, .. })
        ));
    }

    #[test]
    fn command_executor_spawn_failure() {
        let result = CommandExecutor.execute(&Execution::new("definitely_not_a_real_command_12345"));
        assert!(result.is_err());
    }
}
