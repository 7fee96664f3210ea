//! Stage execution against a case directory.
//!
//! Blocking stages are awaited and their exit status checked. Detached stages
//! are launched and handed back as a [`DetachedJobHandle`]; nothing about
//! their completion is ever observed.

use crate::error::StageError;
use crate::stage::{StageConfig, StageMode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Result of a blocking stage that exited successfully.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Exit code (always 0 here; failures come back as [`StageError`]).
    pub exit_code: i32,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// File holding the stage's stdout and stderr.
    pub log_path: PathBuf,
}

/// A launched detached stage.
///
/// This is a record of the launch, not a handle on the process: there is no
/// way to wait on it, read its exit status, or cancel it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetachedJobHandle {
    pub stage_name: String,
    pub command: String,
    pub case_dir: PathBuf,
    /// OS process id, when the platform reported one at launch.
    pub pid: Option<u32>,
    pub launched_at: DateTime<Utc>,
    pub log_path: PathBuf,
}

/// What running a stage produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed(StageResult),
    Detached(DetachedJobHandle),
}

/// Backend that runs one stage with a case directory as working directory.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn run(&self, stage: &StageConfig, cwd: &Path) -> Result<StageOutcome, StageError>;
}

/// Process-backed stage executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageRunner;

impl StageRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(stage: &StageConfig, cwd: &Path) -> Result<(Command, PathBuf), StageError> {
        let Some((exe, args)) = stage.command.split_first() else {
            return Err(StageError::EmptyCommand {
                stage: stage.name.clone(),
            });
        };

        let log_path = cwd.join(stage.log_file_name());
        let (stdout, stderr) = open_log(&log_path)?;

        let mut command = Command::new(exe);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        Ok((command, log_path))
    }

    /// Spawn, wait, and map a non-zero exit to [`StageError::NonZeroExit`].
    pub async fn run_blocking(stage: &StageConfig, cwd: &Path) -> Result<StageResult, StageError> {
        let start = Instant::now();
        let (mut command, log_path) = Self::command(stage, cwd)?;

        let mut child = command.spawn().map_err(|source| StageError::Spawn {
            command: stage.display_command(),
            source,
        })?;
        let status = child.wait().await.map_err(|source| StageError::Spawn {
            command: stage.display_command(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);
        debug!(stage = %stage.name, exit_code, duration_ms, "Stage exited");

        if !status.success() {
            return Err(StageError::NonZeroExit {
                command: stage.display_command(),
                exit_code,
            });
        }

        Ok(StageResult {
            stage_name: stage.name.clone(),
            exit_code,
            duration_ms,
            log_path,
        })
    }

    /// Spawn and return immediately.
    pub fn launch_detached(stage: &StageConfig, cwd: &Path) -> Result<DetachedJobHandle, StageError> {
        let (mut command, log_path) = Self::command(stage, cwd)?;

        let child = command.spawn().map_err(|source| StageError::Spawn {
            command: stage.display_command(),
            source,
        })?;
        let pid = child.id();
        // Dropping the child does not kill it; the runtime reaps it on exit.
        drop(child);

        Ok(DetachedJobHandle {
            stage_name: stage.name.clone(),
            command: stage.display_command(),
            case_dir: cwd.to_path_buf(),
            pid,
            launched_at: Utc::now(),
            log_path,
        })
    }
}

#[async_trait]
impl StageExecutor for StageRunner {
    async fn run(&self, stage: &StageConfig, cwd: &Path) -> Result<StageOutcome, StageError> {
        match stage.mode {
            StageMode::Blocking => Self::run_blocking(stage, cwd)
                .await
                .map(StageOutcome::Completed),
            StageMode::Detached => Self::launch_detached(stage, cwd).map(StageOutcome::Detached),
        }
    }
}

fn open_log(path: &Path) -> Result<(File, File), StageError> {
    let log_err = |source| StageError::Log {
        path: path.to_path_buf(),
        source,
    };
    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_err)?;
    let stderr = stdout.try_clone().map_err(log_err)?;
    Ok((stdout, stderr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::argv;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_blocking_success_writes_log() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::blocking("echo_test", argv(["echo", "hello"]));

        let result = StageRunner::run_blocking(&stage, dir.path())
            .await
            .expect("execute failed");

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.log_path, dir.path().join("log.echo_test"));
        let log = std::fs::read_to_string(&result.log_path).unwrap();
        assert!(log.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_blocking_uses_case_as_cwd() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::blocking("touch", argv(["touch", "marker"]));

        StageRunner::run_blocking(&stage, dir.path()).await.unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_run_blocking_failure() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::blocking("false_test", argv(["false"]));

        let err = StageRunner::run_blocking(&stage, dir.path()).await.unwrap_err();
        match err {
            StageError::NonZeroExit { command, exit_code } => {
                assert_eq!(command, "false");
                assert_ne!(exit_code, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_blocking_exit_code_preserved() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::blocking("exit3", argv(["sh", "-c", "exit 3"]));

        let err = StageRunner::run_blocking(&stage, dir.path()).await.unwrap_err();
        assert!(matches!(err, StageError::NonZeroExit { exit_code: 3, .. }));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::blocking("ghost", argv(["paramsweep-no-such-binary"]));

        let err = StageRunner::run_blocking(&stage, dir.path()).await.unwrap_err();
        assert!(matches!(err, StageError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::blocking("empty", Vec::new());

        let err = StageRunner.run(&stage, dir.path()).await.unwrap_err();
        assert!(matches!(err, StageError::EmptyCommand { .. }));
    }

    #[tokio::test]
    async fn test_detached_returns_without_waiting() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::detached(
            "slow",
            argv(["sh", "-c", "sleep 2; touch finished"]),
            8,
        );

        let start = Instant::now();
        let outcome = StageRunner.run(&stage, dir.path()).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));

        let StageOutcome::Detached(handle) = outcome else {
            panic!("expected detached outcome");
        };
        assert_eq!(handle.stage_name, "slow");
        assert_eq!(handle.case_dir, dir.path());
        assert!(handle.pid.is_some());
        assert!(!dir.path().join("finished").exists());
    }

    #[tokio::test]
    async fn test_detached_ignores_exit_status() {
        let dir = tempdir().unwrap();
        let stage = StageConfig::detached("doomed", argv(["false"]), 1);

        let outcome = StageRunner.run(&stage, dir.path()).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Detached(_)));
    }
}
