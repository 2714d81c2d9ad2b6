//! Process runners for external steps.
//!
//! Epistemic foundation:
//! - K_i: A step is done when its process exits; nothing runs in parallel
//! - B_i: The program exists on PATH (might not) → QaError::Spawn
//! - I^B: Exit status without a code (signal) → treated as failure

use super::CommandLine;
use crate::models::{QaError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs an external command to completion and reports its exit code.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` and wait for it to exit.
    ///
    /// Returns the exit code, or `None` if the process was killed by a signal.
    async fn run(&self, command: &CommandLine) -> Result<Option<i32>>;
}

/// Spawns real processes with inherited stdio.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    workdir: PathBuf,
}

impl SystemRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<Option<i32>> {
        debug!(
            step = %command.step,
            workdir = %self.workdir.display(),
            "Spawning {}",
            command.display()
        );

        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&self.workdir)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| QaError::Spawn {
                program: command.program.clone(),
                source: e,
            })?;

        Ok(status.code())
    }
}

/// Logs commands instead of running them; every step "succeeds".
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunner;

#[async_trait]
impl ProcessRunner for DryRunner {
    async fn run(&self, command: &CommandLine) -> Result<Option<i32>> {
        info!(step = %command.step, "[dry-run] {}", command.display());
        Ok(Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::StepKind;

    fn line(program: &str, args: &[&str]) -> CommandLine {
        CommandLine {
            step: StepKind::Test,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_dry_runner_always_succeeds() {
        let code = DryRunner.run(&line("definitely-not-a-program", &[])).await.unwrap();
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = SystemRunner::new(".");
        let err = runner
            .run(&line("squad-qa-no-such-program-xyz", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Spawn { ref program, .. } if program == "squad-qa-no-such-program-xyz"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_reports_exit_code() {
        let runner = SystemRunner::new(".");
        assert_eq!(runner.run(&line("sh", &["-c", "exit 0"])).await.unwrap(), Some(0));
        assert_eq!(runner.run(&line("sh", &["-c", "exit 3"])).await.unwrap(), Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_uses_workdir() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = SystemRunner::new(dir.path());
        let code = runner
            .run(&line("sh", &["-c", "touch marker"]))
            .await
            .unwrap();
        assert_eq!(code, Some(0));
        assert!(dir.path().join("marker").exists());
    }
}
