//! Case directory naming and scalar rendering.

use serde::{Deserialize, Serialize};

/// Maps a parameter point to its case directory name: `{prefix}{value}{suffix}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseNaming {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_suffix")]
    pub suffix: String,
}

fn default_prefix() -> String {
    "case_".to_string()
}

fn default_suffix() -> String {
    "m_s".to_string()
}

impl Default for CaseNaming {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            suffix: default_suffix(),
        }
    }
}

impl CaseNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Directory name for `point`. Pure and injective over finite values.
    pub fn directory_name(&self, point: f64) -> String {
        format!("{}{}{}", self.prefix, render_scalar(point), self.suffix)
    }
}

/// Shortest round-trip rendering of an `f64`, keeping `.0` on integral values.
pub fn render_scalar(value: f64) -> String {
    format!("{value:?}")
}

/// Render a computed component, dropping binary noise below 15 significant digits.
///
/// `0.2 * 0.4` is `0.08000000000000002` in `f64`; this renders it as `0.08`.
pub fn render_component(value: f64) -> String {
    if !value.is_finite() {
        return render_scalar(value);
    }
    let rounded: f64 = format!("{value:.14e}").parse().unwrap_or(value);
    render_scalar(rounded)
}
