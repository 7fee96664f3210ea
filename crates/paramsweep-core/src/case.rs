//! Per-case lifecycle tracking.
//!
//! A case moves `Pending → Provisioned → Patched → StageComplete… → Done`.
//! Any failure is recorded with the phase that produced it; the case then
//! finishes as `Failed`. Failures never leave the case: siblings are
//! unaffected and the sweep keeps going.

use crate::error::{StageError, SweepError};
use crate::runner::{DetachedJobHandle, StageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    Provisioned,
    Patched,
    /// Stage `index` (0-based, in declared order) has run.
    StageComplete { index: usize, stage: String },
    Done,
    Failed,
    /// Case directory absent during post-processing.
    Skipped,
}

impl CaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseState::Done | CaseState::Failed | CaseState::Skipped)
    }

    /// Short label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            CaseState::Pending => "pending",
            CaseState::Provisioned => "provisioned",
            CaseState::Patched => "patched",
            CaseState::StageComplete { .. } => "running",
            CaseState::Done => "done",
            CaseState::Failed => "failed",
            CaseState::Skipped => "skipped",
        }
    }
}

/// Where in a case's pipeline a failure happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Provision,
    Handoff,
    Patch,
    CleanPartitions,
    Stage(String),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Provision => write!(f, "provision"),
            Phase::Handoff => write!(f, "handoff"),
            Phase::Patch => write!(f, "patch"),
            Phase::CleanPartitions => write!(f, "clean_partitions"),
            Phase::Stage(name) => write!(f, "stage:{name}"),
        }
    }
}

/// Error taxonomy as recorded in reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Provision,
    Patch,
    Stage,
    NoSnapshot,
    Copy,
    Config,
}

impl From<&SweepError> for FailureKind {
    fn from(err: &SweepError) -> Self {
        match err {
            SweepError::Provision(_) => FailureKind::Provision,
            SweepError::Patch(_) => FailureKind::Patch,
            SweepError::Stage(_) => FailureKind::Stage,
            SweepError::NoSnapshot(_) => FailureKind::NoSnapshot,
            SweepError::Copy(_) => FailureKind::Copy,
            SweepError::Config(_) => FailureKind::Config,
        }
    }
}

/// One attributed failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseFailure {
    pub phase: Phase,
    pub kind: FailureKind,
    pub message: String,
    /// Exit code for stages that ran and failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl CaseFailure {
    pub fn new(phase: Phase, err: &SweepError) -> Self {
        let exit_code = match err {
            SweepError::Stage(StageError::NonZeroExit { exit_code, .. }) => Some(*exit_code),
            _ => None,
        };
        Self {
            phase,
            kind: FailureKind::from(err),
            message: err.to_string(),
            exit_code,
        }
    }
}

impl fmt::Display for CaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.phase, self.message)
    }
}

/// A case and everything that happened to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Case {
    pub point: f64,
    pub case_dir: PathBuf,
    pub state: CaseState,
    pub failures: Vec<CaseFailure>,
    /// Blocking stages that exited successfully.
    pub stages: Vec<StageResult>,
    /// Detached launches.
    pub jobs: Vec<DetachedJobHandle>,
    /// Launch batch, for pipelines with detached stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<usize>,
}

impl Case {
    pub fn new(point: f64, case_dir: PathBuf) -> Self {
        Self {
            point,
            case_dir,
            state: CaseState::Pending,
            failures: Vec::new(),
            stages: Vec::new(),
            jobs: Vec::new(),
            batch: None,
        }
    }

    pub fn mark_provisioned(&mut self) {
        debug_assert_eq!(self.state, CaseState::Pending);
        self.state = CaseState::Provisioned;
    }

    pub fn mark_patched(&mut self) {
        debug_assert_eq!(self.state, CaseState::Provisioned);
        self.state = CaseState::Patched;
    }

    pub fn complete_stage(&mut self, index: usize, stage: &str) {
        self.state = CaseState::StageComplete {
            index,
            stage: stage.to_string(),
        };
    }

    /// Record a failure without ending the case.
    pub fn record(&mut self, phase: Phase, err: impl Into<SweepError>) {
        self.failures.push(CaseFailure::new(phase, &err.into()));
    }

    /// Record a failure and end the case.
    pub fn fail(&mut self, phase: Phase, err: impl Into<SweepError>) {
        self.record(phase, err);
        self.state = CaseState::Failed;
    }

    pub fn skip(&mut self) {
        self.state = CaseState::Skipped;
    }

    /// Settle the final state: `Done` unless a failure was recorded.
    pub fn finish(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = if self.failures.is_empty() {
            CaseState::Done
        } else {
            CaseState::Failed
        };
    }

    pub fn is_done(&self) -> bool {
        self.state == CaseState::Done
    }

    pub fn is_failed(&self) -> bool {
        self.state == CaseState::Failed
    }

    pub fn has_failure(&self, kind: FailureKind) -> bool {
        self.failures.iter().any(|f| f.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NoSnapshotError, ProvisionError};

    fn case() -> Case {
        Case::new(0.1, PathBuf::from("case_0.1m_s"))
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut case = case();
        assert_eq!(case.state, CaseState::Pending);
        case.mark_provisioned();
        case.mark_patched();
        case.complete_stage(0, "decompose");
        assert_eq!(
            case.state,
            CaseState::StageComplete {
                index: 0,
                stage: "decompose".to_string()
            }
        );
        case.finish();
        assert!(case.is_done());
    }

    #[test]
    fn test_stage_failures_accumulate() {
        let mut case = case();
        case.mark_provisioned();
        case.mark_patched();
        for (index, name) in ["decompose", "solve"].iter().enumerate() {
            case.record(
                Phase::Stage(name.to_string()),
                StageError::NonZeroExit {
                    command: name.to_string(),
                    exit_code: 1,
                },
            );
            case.complete_stage(index, name);
        }
        case.finish();

        assert!(case.is_failed());
        assert_eq!(case.failures.len(), 2);
        assert_eq!(case.failures[0].phase, Phase::Stage("decompose".to_string()));
        assert_eq!(case.failures[1].exit_code, Some(1));
        assert!(case.has_failure(FailureKind::Stage));
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut case = case();
        case.fail(Phase::Provision, ProvisionError::TemplateMissing(PathBuf::from("baseCase")));
        case.finish();
        assert!(case.is_failed());
        assert_eq!(case.failures[0].kind, FailureKind::Provision);
        assert_eq!(case.failures[0].to_string(), "[provision] template directory not found: baseCase");
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(CaseState::Done.label(), "done");
        assert_eq!(
            CaseState::StageComplete {
                index: 1,
                stage: "solve".to_string()
            }
            .label(),
            "running"
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::CleanPartitions.to_string(), "clean_partitions");
        assert_eq!(Phase::Stage("solve".to_string()).to_string(), "stage:solve");
    }

    #[test]
    fn test_case_serializes_state_and_failures() {
        let mut case = case();
        case.fail(
            Phase::Handoff,
            NoSnapshotError {
                case_dir: PathBuf::from("case_0.1m_s"),
                source: None,
            },
        );
        let json = serde_json::to_value(&case).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["failures"][0]["kind"], "no_snapshot");
        assert_eq!(json["failures"][0]["phase"], "handoff");
    }
}
