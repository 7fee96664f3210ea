//! Structured lifecycle events for sweeps and cases.
//!
//! Every event carries an `event` field (`sweep.started`, `case.finished`,
//! ...) so log pipelines can filter on it regardless of message text.

use crate::case::{Case, CaseState};
use crate::runner::{DetachedJobHandle, StageResult};
use tracing::{info, warn};

/// Span tagging everything a case does with its sweep, point and directory.
///
/// Attach it with `tracing::Instrument` so it stays correct across awaits.
pub fn case_span(sweep: &str, case: &Case) -> tracing::Span {
    tracing::info_span!(
        "paramsweep.case",
        sweep = %sweep,
        point = case.point,
        case_dir = %case.case_dir.display(),
    )
}

pub fn emit_sweep_started(run_id: &str, sweep: &str, points: usize, spec_digest: &str) {
    info!(
        event = "sweep.started",
        run_id = %run_id,
        sweep = %sweep,
        points = points,
        spec_digest = %&spec_digest[..12.min(spec_digest.len())],
    );
}

pub fn emit_sweep_finished(run_id: &str, cases: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "sweep.finished",
        run_id = %run_id,
        cases = cases,
        failed = failed,
        duration_ms = duration_ms,
    );
}

pub fn emit_case_provisioned(case: &Case) {
    info!(event = "case.provisioned", case_dir = %case.case_dir.display());
}

pub fn emit_case_patched(case: &Case, inlets: usize) {
    info!(event = "case.patched", case_dir = %case.case_dir.display(), inlets = inlets);
}

pub fn emit_artifact_handed_off(from: &std::path::Path, to: &std::path::Path) {
    info!(event = "case.handoff", from = %from.display(), to = %to.display());
}

pub fn emit_stage_finished(result: &StageResult) {
    info!(
        event = "stage.finished",
        stage = %result.stage_name,
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
    );
}

pub fn emit_stage_detached(job: &DetachedJobHandle) {
    info!(
        event = "stage.detached",
        stage = %job.stage_name,
        pid = ?job.pid,
        launched_at = %job.launched_at,
        log = %job.log_path.display(),
    );
}

pub fn emit_batch_launched(sweep: &str, batch: usize, cases: usize, cost: u32) {
    info!(
        event = "batch.launched",
        sweep = %sweep,
        batch = batch,
        cases = cases,
        cost = cost,
    );
}

/// Failures are warnings: they are reported, never raised.
pub fn emit_case_failure(phase: &str, error: &dyn std::fmt::Display) {
    warn!(event = "case.failure", phase = %phase, error = %error);
}

pub fn emit_case_finished(case: &Case) {
    match case.state {
        CaseState::Done => info!(event = "case.finished", state = "done"),
        CaseState::Skipped => info!(event = "case.finished", state = "skipped"),
        _ => warn!(
            event = "case.finished",
            state = "failed",
            failures = case.failures.len(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_emitters_do_not_panic() {
        let mut case = Case::new(0.1, PathBuf::from("case_0.1m_s"));
        let _span = case_span("velocity", &case).entered();
        emit_sweep_started("run-1", "velocity", 9, "abc");
        emit_case_provisioned(&case);
        emit_case_patched(&case, 4);
        case.finish();
        emit_case_finished(&case);
        emit_sweep_finished("run-1", 9, 0, 10);
    }
}
