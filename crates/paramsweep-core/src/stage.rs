//! Stage definitions and configuration.

use serde::{Deserialize, Serialize};

/// How a stage's process relates to the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageMode {
    /// Wait for the process and check its exit status.
    #[default]
    Blocking,

    /// Launch and return; completion is never observed.
    Detached,
}

/// Configuration for one external stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Human-readable stage name, also names the stage log file.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    #[serde(default)]
    pub mode: StageMode,

    /// Worker units the stage occupies (e.g. cores). Used for batch planning only.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Whether this stage is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_workers() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

impl StageConfig {
    /// Create a blocking single-worker stage.
    pub fn blocking(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            mode: StageMode::Blocking,
            workers: 1,
            enabled: true,
        }
    }

    /// Create a detached stage occupying `workers` units.
    pub fn detached(name: impl Into<String>, command: Vec<String>, workers: u32) -> Self {
        Self {
            name: name.into(),
            command,
            mode: StageMode::Detached,
            workers,
            enabled: true,
        }
    }

    /// Set the declared worker count.
    pub fn with_workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Command joined with spaces, for logs and error messages.
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }

    /// Log file name inside the case directory.
    pub fn log_file_name(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        format!("log.{sanitized}")
    }
}

/// Helper for building argv vectors from string literals.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
