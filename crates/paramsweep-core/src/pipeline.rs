//! Sweep orchestration and reporting.
//!
//! A sweep runs its cases one at a time in declaration order. Each case is
//! provisioned, optionally seeded from its source case's latest snapshot,
//! patched, cleaned of stale partitions, and then runs its stage chain.
//! Nothing that goes wrong inside a case stops the sweep: every failure ends
//! up in the [`SweepReport`], attributed to its case and phase.

use crate::batch::{plan_batches, Batch};
use crate::case::{Case, Phase};
use crate::error::SweepError;
use crate::obs;
use crate::provision::{clean_partitions, provision};
use crate::runner::{StageExecutor, StageOutcome, StageRunner};
use crate::snapshot::{copy_artifact, handoff_snapshot};
use crate::spec::{Pipeline, SweepSpec};
use crate::stage::StageConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Instrument};
use uuid::Uuid;

/// Result of one sweep in a dependent chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    pub sweep: String,
    pub cases: Vec<Case>,
    pub batches: Vec<Batch>,
}

impl PipelineReport {
    pub fn case(&self, point: f64) -> Option<&Case> {
        self.cases.iter().find(|c| c.point.to_bits() == point.to_bits())
    }
}

/// Result of a complete sweep, including any dependent sweeps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepReport {
    pub run_id: String,
    pub spec_digest: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// The sweep itself first, then its dependents in chain order.
    pub pipelines: Vec<PipelineReport>,
}

impl SweepReport {
    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.pipelines.iter().flat_map(|p| p.cases.iter())
    }

    pub fn pipeline(&self, sweep: &str) -> Option<&PipelineReport> {
        self.pipelines.iter().find(|p| p.sweep == sweep)
    }

    /// Number of cases that finished `Done`.
    pub fn done_count(&self) -> usize {
        self.cases().filter(|c| c.is_done()).count()
    }

    /// Number of cases that finished `Failed`.
    pub fn failed_count(&self) -> usize {
        self.cases().filter(|c| c.is_failed()).count()
    }

    /// Whether no case failed.
    pub fn success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Case directories and launch batches of one pipeline, computed without
/// touching the filesystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelinePlan {
    pub sweep: String,
    pub cases: Vec<(f64, PathBuf)>,
    pub batches: Vec<Batch>,
    /// Worker units each case claims through detached stages.
    pub case_cost: u32,
}

/// Plan every pipeline of `spec`.
pub fn plan(spec: &SweepSpec) -> Vec<PipelinePlan> {
    spec.pipelines().iter().map(plan_pipeline).collect()
}

fn plan_pipeline(pipeline: &Pipeline<'_>) -> PipelinePlan {
    let spec = pipeline.spec;
    let case_cost = spec.detached_cost();
    let costs = vec![case_cost; pipeline.points.len()];
    PipelinePlan {
        sweep: spec.name.clone(),
        cases: pipeline
            .points
            .iter()
            .map(|p| (*p, spec.case_dir(*p)))
            .collect(),
        batches: plan_batches(&costs, spec.resource_budget),
        case_cost,
    }
}

/// Sweep orchestrator.
pub struct Orchestrator {
    executor: Arc<dyn StageExecutor>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Arc::new(StageRunner::new()))
    }
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn StageExecutor>) -> Self {
        Self { executor }
    }

    /// Run `spec` and its dependent chain to completion.
    ///
    /// Never fails: case-level problems are recorded in the report.
    pub async fn run_sweep(&self, spec: &SweepSpec) -> SweepReport {
        self.run_all(spec, Mode::Sweep).await
    }

    /// Run each sweep's `post_stages` over its existing case directories.
    ///
    /// Cases whose directory is absent are `Skipped`. Nothing is provisioned.
    pub async fn run_post(&self, spec: &SweepSpec) -> SweepReport {
        self.run_all(spec, Mode::Post).await
    }

    async fn run_all(&self, spec: &SweepSpec, mode: Mode) -> SweepReport {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let spec_digest = spec.digest();

        obs::emit_sweep_started(&run_id, &spec.name, spec.points.len(), &spec_digest);

        let mut pipelines = Vec::new();
        for pipeline in spec.pipelines() {
            let report = match mode {
                Mode::Sweep => self.run_pipeline(&pipeline).await,
                Mode::Post => self.run_post_pipeline(&pipeline).await,
            };
            pipelines.push(report);
        }

        let report = SweepReport {
            run_id,
            spec_digest,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            pipelines,
        };
        obs::emit_sweep_finished(
            &report.run_id,
            report.cases().count(),
            report.failed_count(),
            report.duration_ms,
        );
        report
    }

    async fn run_pipeline(&self, pipeline: &Pipeline<'_>) -> PipelineReport {
        let spec = pipeline.spec;
        let plan = plan_pipeline(pipeline);
        let mut cases = Vec::with_capacity(plan.cases.len());

        for batch in &plan.batches {
            if plan.case_cost > 0 {
                obs::emit_batch_launched(&spec.name, batch.index, batch.cases.len(), batch.cost);
            }
            for &idx in &batch.cases {
                let (point, case_dir) = plan.cases[idx].clone();
                let mut case = Case::new(point, case_dir);
                if plan.case_cost > 0 {
                    case.batch = Some(batch.index);
                }

                let span = obs::case_span(&spec.name, &case);
                self.run_case(pipeline, &mut case).instrument(span).await;
                cases.push(case);
            }
        }

        PipelineReport {
            sweep: spec.name.clone(),
            cases,
            batches: plan.batches,
        }
    }

    async fn run_case(&self, pipeline: &Pipeline<'_>, case: &mut Case) {
        match self.prepare_case(pipeline, case) {
            Ok(()) => self.run_stages(&pipeline.spec.stages, case).await,
            Err((phase, err)) => {
                obs::emit_case_failure(&phase.to_string(), &err);
                case.fail(phase, err);
            }
        }
        case.finish();
        obs::emit_case_finished(case);
    }

    /// Provision, hand off, patch, clean. Any error ends the case.
    fn prepare_case(&self, pipeline: &Pipeline<'_>, case: &mut Case) -> Result<(), (Phase, SweepError)> {
        let spec = pipeline.spec;

        provision(&spec.template, &case.case_dir).map_err(|e| (Phase::Provision, e.into()))?;
        case.mark_provisioned();
        obs::emit_case_provisioned(case);

        if let Some((source, artifact)) = pipeline.source {
            let source_dir = source.case_dir(case.point);
            let snapshot = handoff_snapshot(&source_dir, &source.template)
                .map_err(|e| (Phase::Handoff, e.into()))?;
            let to = copy_artifact(&snapshot, &artifact.field, &case.case_dir, &artifact.destination)
                .map_err(|e| (Phase::Handoff, e.into()))?;
            obs::emit_artifact_handed_off(&snapshot.join(&artifact.field), &to);
        }

        if !spec.boundary.inlets.is_empty() {
            spec.boundary
                .patcher
                .patch(&case.case_dir, &spec.boundary.inlets, case.point)
                .map_err(|e| (Phase::Patch, e.into()))?;
        }
        case.mark_patched();
        obs::emit_case_patched(case, spec.boundary.inlets.len());

        let removed = clean_partitions(&case.case_dir, &spec.partition_prefix)
            .map_err(|e| (Phase::CleanPartitions, e.into()))?;
        debug!(removed = removed.len(), "Cleaned partition directories");
        Ok(())
    }

    /// Run every enabled stage in order. Failures are recorded and the next
    /// stage still runs.
    async fn run_stages(&self, stages: &[StageConfig], case: &mut Case) {
        for (index, stage) in stages.iter().enumerate() {
            if !stage.enabled {
                debug!(stage = %stage.name, "Skipping disabled stage");
                continue;
            }

            debug!(stage = %stage.name, command = %stage.display_command(), "Executing stage");
            match self.executor.run(stage, &case.case_dir).await {
                Ok(StageOutcome::Completed(result)) => {
                    obs::emit_stage_finished(&result);
                    case.stages.push(result);
                }
                Ok(StageOutcome::Detached(job)) => {
                    obs::emit_stage_detached(&job);
                    case.jobs.push(job);
                }
                Err(err) => {
                    let phase = Phase::Stage(stage.name.clone());
                    obs::emit_case_failure(&phase.to_string(), &err);
                    case.record(phase, err);
                }
            }
            case.complete_stage(index, &stage.name);
        }
    }

    async fn run_post_pipeline(&self, pipeline: &Pipeline<'_>) -> PipelineReport {
        let spec = pipeline.spec;
        let mut cases = Vec::with_capacity(pipeline.points.len());

        for &point in &pipeline.points {
            let mut case = Case::new(point, spec.case_dir(point));
            let span = obs::case_span(&spec.name, &case);

            async {
                if case.case_dir.is_dir() {
                    self.run_stages(&spec.post_stages, &mut case).await;
                } else {
                    debug!("Case directory missing, skipping");
                    case.skip();
                }
                case.finish();
                obs::emit_case_finished(&case);
            }
            .instrument(span)
            .await;

            cases.push(case);
        }

        PipelineReport {
            sweep: spec.name.clone(),
            cases,
            batches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Sweep,
    Post,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::FailureKind;
    use crate::stage::argv;

    fn report(cases: Vec<Case>) -> SweepReport {
        SweepReport {
            run_id: "run123".to_string(),
            spec_digest: "abc123".to_string(),
            started_at: Utc::now(),
            duration_ms: 300,
            pipelines: vec![PipelineReport {
                sweep: "velocity".to_string(),
                cases,
                batches: Vec::new(),
            }],
        }
    }

    fn finished(point: f64, failed: bool) -> Case {
        let mut case = Case::new(point, PathBuf::from(format!("case_{point}m_s")));
        if failed {
            case.record(
                Phase::Stage("solve".to_string()),
                crate::error::StageError::NonZeroExit {
                    command: "simpleFoam".to_string(),
                    exit_code: 1,
                },
            );
        }
        case.finish();
        case
    }

    #[test]
    fn test_report_counts() {
        let report = report(vec![finished(0.1, false), finished(0.2, false)]);
        assert_eq!(report.done_count(), 2);
        assert_eq!(report.failed_count(), 0);
        assert!(report.success());
    }

    #[test]
    fn test_report_with_failures() {
        let report = report(vec![finished(0.1, false), finished(0.2, true)]);
        assert_eq!(report.done_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.success());

        let pipeline = report.pipeline("velocity").unwrap();
        let failed = pipeline.case(0.2).unwrap();
        assert!(failed.has_failure(FailureKind::Stage));
    }

    #[test]
    fn test_plan_dependent_batches() {
        let mut spec = SweepSpec::new("velocity", vec![0.1, 0.2, 0.3], "baseCase");
        spec.cases_root = PathBuf::from("runs");
        let mut dependent = SweepSpec::new("concentration", vec![], "concentration_basecase");
        dependent.cases_root = PathBuf::from("runs");
        dependent.naming = crate::naming::CaseNaming::new("concentration_case_", "m_s");
        dependent.stages = vec![StageConfig::detached("solve", argv(["foamJob"]), 8)];
        dependent.resource_budget = Some(16);
        spec.dependent = Some(Box::new(crate::spec::DependentLink {
            artifact: Default::default(),
            sweep: dependent,
        }));

        let plans = plan(&spec);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].case_cost, 0);
        assert_eq!(plans[0].batches.len(), 1);
        assert_eq!(plans[1].cases[2].1, PathBuf::from("runs/concentration_case_0.3m_s"));
        assert_eq!(plans[1].batches.len(), 2);
        assert_eq!(plans[1].batches[0].cases, vec![0, 1]);
    }
}
