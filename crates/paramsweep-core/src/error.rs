//! Error types for paramsweep.
//!
//! Each sweep phase has its own error type so a failure can be attributed to
//! the phase that produced it. [`SweepError`] unifies them for callers that
//! only need to propagate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while materializing a case directory from its template.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Template directory does not exist or is not a directory
    #[error("template directory not found: {0}")]
    TemplateMissing(PathBuf),

    /// Template lies inside the case directory, so removing the case would destroy it
    #[error("template {template} is inside case directory {case_dir}")]
    TemplateInsideCase { template: PathBuf, case_dir: PathBuf },

    /// Case directory lies inside the template, so copying would recurse into it
    #[error("case directory {case_dir} is inside template {template}")]
    CaseInsideTemplate { case_dir: PathBuf, template: PathBuf },

    /// Case directory does not exist (partition cleanup)
    #[error("case directory not found: {0}")]
    CaseMissing(PathBuf),

    /// Filesystem failure during removal or copy
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while rewriting boundary blocks in the configuration file.
#[derive(Error, Debug)]
pub enum PatchError {
    /// Configuration file is absent from the case
    #[error("boundary file not found: {0}")]
    ConfigMissing(PathBuf),

    /// No dictionary entry with this exact name
    #[error("inlet '{inlet}' not found in {file}")]
    InletNotFound { inlet: String, file: PathBuf },

    /// Brace group could not be matched
    #[error("malformed dictionary in {file}: {reason}")]
    Malformed { file: PathBuf, reason: String },

    /// Read or write failure
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from executing an external stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("stage '{stage}' has an empty command")]
    EmptyCommand { stage: String },

    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with code {exit_code}")]
    NonZeroExit { command: String, exit_code: i32 },

    /// Stage log file could not be opened
    #[error("cannot open stage log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// No numerically named snapshot directory exists under a case.
#[derive(Error, Debug)]
#[error("no snapshot directory in {}", .case_dir.display())]
pub struct NoSnapshotError {
    pub case_dir: PathBuf,
    #[source]
    pub source: Option<std::io::Error>,
}

/// Errors while handing an artifact from a snapshot to another case.
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("artifact not found: {0}")]
    SourceMissing(PathBuf),

    #[error("failed to copy {from} to {to}: {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while loading or validating a sweep definition.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read sweep file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sweep file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid sweep '{sweep}': {reason}")]
    Invalid { sweep: String, reason: String },
}

/// Any error a sweep phase can produce.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    NoSnapshot(#[from] NoSnapshotError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for sweep operations.
pub type SweepResult<T> = std::result::Result<T, SweepError>;
