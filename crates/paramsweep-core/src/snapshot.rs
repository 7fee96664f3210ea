//! Snapshot discovery and artifact handoff between cases.

use crate::error::{CopyError, NoSnapshotError};
use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

fn time_name() -> Option<&'static Regex> {
    static TIME_NAME: OnceLock<Option<Regex>> = OnceLock::new();
    TIME_NAME
        .get_or_init(|| Regex::new(r"^(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").ok())
        .as_ref()
}

/// Parse a directory name as a snapshot time.
///
/// Accepts non-negative integers and decimals, optionally with an exponent
/// (`1e-05`). Signs, `inf`, `nan` and anything with trailing text are rejected.
pub fn parse_time(name: &str) -> Option<f64> {
    if !time_name().is_some_and(|re| re.is_match(name)) {
        return None;
    }
    name.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// Orders two snapshot names holding the same time: the longer name wins, then
/// the lexicographically greater one.
fn tie_break(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Path of the child directory of `case_dir` with the greatest numeric name.
pub fn latest_snapshot(case_dir: &Path) -> Result<PathBuf, NoSnapshotError> {
    latest_time(case_dir).map(|(path, _)| path)
}

/// Latest snapshot of a source case that the solver actually produced.
///
/// Time directories no later than the template's latest (or time 0 when the
/// template has none) were copied in at provisioning, so they do not count.
pub fn handoff_snapshot(source_case: &Path, template: &Path) -> Result<PathBuf, NoSnapshotError> {
    let initial = latest_time(template).map(|(_, time)| time).unwrap_or(0.0);
    let (path, time) = latest_time(source_case)?;
    if time <= initial {
        debug!(
            case_dir = %source_case.display(),
            time,
            initial,
            "Only initial snapshots present"
        );
        return Err(NoSnapshotError {
            case_dir: source_case.to_path_buf(),
            source: None,
        });
    }
    Ok(path)
}

fn latest_time(case_dir: &Path) -> Result<(PathBuf, f64), NoSnapshotError> {
    let no_snapshot = |source| NoSnapshotError {
        case_dir: case_dir.to_path_buf(),
        source,
    };

    let entries = std::fs::read_dir(case_dir).map_err(|e| no_snapshot(Some(e)))?;

    let mut best: Option<(f64, String)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| no_snapshot(Some(e)))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(time) = parse_time(&name) else {
            continue;
        };

        let replace = match &best {
            None => true,
            Some((best_time, best_name)) => match time.total_cmp(best_time) {
                Ordering::Greater => true,
                Ordering::Equal => tie_break(&name, best_name) == Ordering::Greater,
                Ordering::Less => false,
            },
        };
        if replace {
            best = Some((time, name));
        }
    }

    match best {
        Some((time, name)) => {
            debug!(case_dir = %case_dir.display(), snapshot = %name, time, "Latest snapshot");
            Ok((case_dir.join(name), time))
        }
        None => Err(no_snapshot(None)),
    }
}

/// Copy `snapshot/field` to `dest_case/dest_relative`, creating parent directories.
pub fn copy_artifact(
    snapshot: &Path,
    field: &str,
    dest_case: &Path,
    dest_relative: &Path,
) -> Result<PathBuf, CopyError> {
    let from = snapshot.join(field);
    if !from.is_file() {
        return Err(CopyError::SourceMissing(from));
    }

    let to = dest_case.join(dest_relative);
    let copy_err = |source| CopyError::Io {
        from: from.clone(),
        to: to.clone(),
        source,
    };

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(copy_err)?;
    }
    std::fs::copy(&from, &to).map_err(copy_err)?;

    debug!(from = %from.display(), to = %to.display(), "Copied artifact");
    Ok(to)
}
