//! Case provisioning - materialize a case directory from its template.
//!
//! Provisioning is destructive-then-reconstructive: whatever was at the case
//! path is removed before the template is copied, so nothing from a previous
//! run survives. The template itself is only ever read.

use crate::error::ProvisionError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Replace `case_dir` with a fresh recursive copy of `template`.
pub fn provision(template: &Path, case_dir: &Path) -> Result<(), ProvisionError> {
    if !template.is_dir() {
        return Err(ProvisionError::TemplateMissing(template.to_path_buf()));
    }

    if is_within(case_dir, template) {
        return Err(ProvisionError::CaseInsideTemplate {
            case_dir: case_dir.to_path_buf(),
            template: template.to_path_buf(),
        });
    }

    if case_dir.exists() || case_dir.is_symlink() {
        if is_within(template, case_dir) {
            return Err(ProvisionError::TemplateInsideCase {
                template: template.to_path_buf(),
                case_dir: case_dir.to_path_buf(),
            });
        }
        debug!(case_dir = %case_dir.display(), "Removing existing case directory");
        remove_path(case_dir)?;
    }

    debug!(
        template = %template.display(),
        case_dir = %case_dir.display(),
        "Copying template"
    );
    copy_tree(template, case_dir)
}

/// Remove every direct child directory of `case_dir` named `{prefix}{digits}`.
///
/// Returns the removed paths in name order. Running it again is a no-op.
pub fn clean_partitions(case_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ProvisionError> {
    if !case_dir.is_dir() {
        return Err(ProvisionError::CaseMissing(case_dir.to_path_buf()));
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(case_dir).map_err(io_at(case_dir))? {
        let entry = entry.map_err(io_at(case_dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_at(&path))?;
        if !file_type.is_dir() {
            continue;
        }
        if is_partition_name(&entry.file_name().to_string_lossy(), prefix) {
            debug!(partition = %path.display(), "Deleting partition directory");
            fs::remove_dir_all(&path).map_err(io_at(&path))?;
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}

/// `processor0`, `processor12` match prefix `processor`; `processor`, `processorX` do not.
pub fn is_partition_name(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(index) => !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), ProvisionError> {
    fs::create_dir_all(to).map_err(io_at(to))?;

    for entry in fs::read_dir(from).map_err(io_at(from))? {
        let entry = entry.map_err(io_at(from))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(io_at(&source))?;

        if file_type.is_dir() {
            copy_tree(&source, &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&source, &target)?;
        } else {
            fs::copy(&source, &target).map_err(io_at(&target))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> Result<(), ProvisionError> {
    let link = fs::read_link(source).map_err(io_at(source))?;
    std::os::unix::fs::symlink(link, target).map_err(io_at(target))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> Result<(), ProvisionError> {
    fs::copy(source, target).map_err(io_at(target))?;
    Ok(())
}

fn remove_path(path: &Path) -> Result<(), ProvisionError> {
    let meta = fs::symlink_metadata(path).map_err(io_at(path))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(io_at(path))
    } else {
        fs::remove_file(path).map_err(io_at(path))
    }
}

/// Whether `inner` resolves to a location at or below `outer`. Either path
/// may not exist yet.
pub(crate) fn is_within(inner: &Path, outer: &Path) -> bool {
    match (resolve(inner), resolve(outer)) {
        (Some(inner), Some(outer)) => inner.starts_with(outer),
        _ => false,
    }
}

/// Canonicalize the longest existing ancestor of `path` and re-append the rest.
fn resolve(path: &Path) -> Option<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(base) = current.canonicalize() {
            return Some(missing.iter().rev().fold(base, |acc, part| acc.join(part)));
        }
        missing.push(current.file_name()?);
        current = match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            Some(_) => Path::new("."),
            None => return None,
        };
    }
}

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> ProvisionError + '_ {
    move |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    }
}
