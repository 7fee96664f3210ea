//! Boundary patching - encode `scalar * normal` into each inlet's block.
//!
//! The boundary file keeps one brace group per patch:
//!
//! ```text
//!     inlet1
//!     {
//!         type            fixedValue;
//!         value           uniform (0.06 0.08 0.0);
//!     }
//! ```
//!
//! Entries are located with [`crate::dictionary`], so a name only matches a
//! whole token in key position. The whole entry is rewritten to the canonical
//! block above, which makes patching idempotent.

use crate::dictionary::{find_entry, tokenize, Lookup};
use crate::error::PatchError;
use crate::naming::render_component;
use crate::spec::Inlet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rewrites inlet blocks in a case's boundary file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundaryPatcher {
    /// Boundary file relative to the case directory.
    #[serde(default = "default_file")]
    pub file: PathBuf,

    /// Condition kind written to each patched block.
    #[serde(default = "default_condition")]
    pub condition: String,
}

fn default_file() -> PathBuf {
    Path::new("0").join("U")
}

fn default_condition() -> String {
    "fixedValue".to_string()
}

impl Default for BoundaryPatcher {
    fn default() -> Self {
        Self {
            file: default_file(),
            condition: default_condition(),
        }
    }
}

impl BoundaryPatcher {
    /// Patch every inlet in `case_dir`'s boundary file with `scalar * normal`.
    ///
    /// The file is written once, after all inlets have been located; if any
    /// inlet is missing the file is left unchanged.
    pub fn patch(&self, case_dir: &Path, inlets: &[Inlet], scalar: f64) -> Result<(), PatchError> {
        let path = case_dir.join(&self.file);
        if !path.is_file() {
            return Err(PatchError::ConfigMissing(path));
        }

        let original = std::fs::read_to_string(&path).map_err(|source| PatchError::Io {
            path: path.clone(),
            source,
        })?;
        let patched = self.apply(&original, inlets, scalar, &path)?;

        if patched != original {
            std::fs::write(&path, patched).map_err(|source| PatchError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Pure text transform behind [`BoundaryPatcher::patch`]. `file` is used for error reporting.
    pub fn apply(
        &self,
        source: &str,
        inlets: &[Inlet],
        scalar: f64,
        file: &Path,
    ) -> Result<String, PatchError> {
        let mut text = source.to_string();
        let eol = if source.contains("\r\n") { "\r\n" } else { "\n" };
        let mut updated: HashSet<&str> = HashSet::new();

        for inlet in inlets {
            if !updated.insert(inlet.name.as_str()) {
                continue;
            }

            let tokens = tokenize(&text);
            let entry = match find_entry(&text, &tokens, &inlet.name) {
                Lookup::Found(entry) => entry,
                Lookup::Missing => {
                    return Err(PatchError::InletNotFound {
                        inlet: inlet.name.clone(),
                        file: file.to_path_buf(),
                    })
                }
                Lookup::Unbalanced { at } => {
                    return Err(PatchError::Malformed {
                        file: file.to_path_buf(),
                        reason: format!("unclosed group for '{}' at byte {}", inlet.name, at),
                    })
                }
            };

            let vector = inlet.normal.map(|component| scalar * component);
            let (start, indent) = block_start(&text, entry.name.start);
            let end = block_end(&text, entry.group.end);
            let newline = text[entry.group.end..end].contains('\n');
            let block = self.render_block(&indent, &inlet.name, vector, newline, eol);

            debug!(inlet = %inlet.name, ?vector, "Patching inlet block");
            text.replace_range(start..end, &block);
        }

        Ok(text)
    }

    fn render_block(
        &self,
        indent: &str,
        name: &str,
        vector: [f64; 3],
        newline: bool,
        eol: &str,
    ) -> String {
        let mut block = format!(
            "{indent}{name}{eol}{indent}{{{eol}{indent}    {:<16}{};{eol}{indent}    {:<16}uniform ({} {} {});{eol}{indent}}}",
            "type",
            self.condition,
            "value",
            render_component(vector[0]),
            render_component(vector[1]),
            render_component(vector[2]),
        );
        if newline {
            block.push_str(eol);
        }
        block
    }
}

/// Start of the replaced span and the indentation to keep.
///
/// When only whitespace precedes the name on its line, the span starts at the
/// line start and that whitespace becomes the indentation.
fn block_start(text: &str, name_start: usize) -> (usize, String) {
    let line_start = text[..name_start].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &text[line_start..name_start];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        (line_start, prefix.to_string())
    } else {
        (name_start, String::new())
    }
}

/// End of the replaced span: through the newline after the closing brace when
/// the rest of that line is blank.
fn block_end(text: &str, group_end: usize) -> usize {
    let rest = &text[group_end..];
    let line_len = rest.find('\n').unwrap_or(rest.len());
    if rest[..line_len].trim().is_empty() {
        (group_end + line_len + 1).min(text.len())
    } else {
        group_end
    }
}
