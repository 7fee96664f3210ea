//! paramsweep - parametric sweeps over solver case templates
//!
//! Provides a sweep orchestrator that:
//! - Provisions one case directory per parameter point from a template
//! - Rewrites inlet boundary entries scaled by the point
//! - Runs solver stage chains, blocking or detached, under a worker budget
//! - Seeds dependent sweeps from each source case's latest snapshot
//! - Reports every per-case failure without stopping the sweep

pub mod batch;
pub mod case;
pub mod dictionary;
pub mod error;
pub mod naming;
pub mod obs;
pub mod patch;
pub mod pipeline;
pub mod provision;
pub mod runner;
pub mod snapshot;
pub mod spec;
pub mod stage;
pub mod telemetry;

// Re-export key types
pub use batch::{plan_batches, Batch};
pub use case::{Case, CaseFailure, CaseState, FailureKind, Phase};
pub use error::{
    ConfigError, CopyError, NoSnapshotError, PatchError, ProvisionError, StageError, SweepError,
    SweepResult,
};
pub use naming::CaseNaming;
pub use patch::BoundaryPatcher;
pub use pipeline::{plan, Orchestrator, PipelinePlan, PipelineReport, SweepReport};
pub use provision::{clean_partitions, provision};
pub use runner::{DetachedJobHandle, StageExecutor, StageOutcome, StageResult, StageRunner};
pub use snapshot::{copy_artifact, handoff_snapshot, latest_snapshot};
pub use spec::{ArtifactHandoff, BoundaryConfig, DependentLink, Inlet, SweepSpec};
pub use stage::{argv, StageConfig, StageMode};
pub use telemetry::init_tracing;
