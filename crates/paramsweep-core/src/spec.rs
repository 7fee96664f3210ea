//! Sweep specification and identity.
//!
//! A [`SweepSpec`] is the whole definition of a study: which points, which
//! template, how to patch, which stages, and optionally which dependent sweep
//! consumes its output. It is loaded from JSON and validated before use.

use crate::error::ConfigError;
use crate::naming::{render_scalar, CaseNaming};
use crate::patch::BoundaryPatcher;
use crate::stage::{StageConfig, StageMode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One inlet of the boundary map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Inlet {
    pub name: String,
    pub normal: [f64; 3],
}

impl Inlet {
    pub fn new(name: impl Into<String>, normal: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            normal,
        }
    }
}

/// Boundary file location, condition kind, and the ordered inlet map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundaryConfig {
    #[serde(flatten)]
    pub patcher: BoundaryPatcher,

    #[serde(default)]
    pub inlets: Vec<Inlet>,
}

/// Which field moves from the source case's latest snapshot, and where to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactHandoff {
    #[serde(default = "default_field")]
    pub field: String,

    /// Destination relative to the dependent case directory.
    #[serde(default = "default_destination")]
    pub destination: PathBuf,
}

fn default_field() -> String {
    "U".to_string()
}

fn default_destination() -> PathBuf {
    Path::new("0").join("U")
}

impl Default for ArtifactHandoff {
    fn default() -> Self {
        Self {
            field: default_field(),
            destination: default_destination(),
        }
    }
}

/// A sweep that starts from another sweep's results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependentLink {
    #[serde(default)]
    pub artifact: ArtifactHandoff,

    pub sweep: SweepSpec,
}

/// Complete definition of one sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepSpec {
    pub name: String,

    /// Parameter points in processing order. A dependent sweep may leave this
    /// empty to inherit its source's points.
    #[serde(default)]
    pub points: Vec<f64>,

    pub template: PathBuf,

    /// Directory the case directories are created in.
    #[serde(default = "default_cases_root")]
    pub cases_root: PathBuf,

    #[serde(default)]
    pub naming: CaseNaming,

    #[serde(default)]
    pub boundary: BoundaryConfig,

    #[serde(default)]
    pub stages: Vec<StageConfig>,

    /// Stages for the post-processing pass over existing cases.
    #[serde(default)]
    pub post_stages: Vec<StageConfig>,

    #[serde(default = "default_partition_prefix")]
    pub partition_prefix: String,

    /// Total worker units detached launches may claim per batch.
    #[serde(default)]
    pub resource_budget: Option<u32>,

    #[serde(default)]
    pub dependent: Option<Box<DependentLink>>,
}

fn default_cases_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_partition_prefix() -> String {
    "processor".to_string()
}

impl SweepSpec {
    /// Minimal spec with defaults for everything but name, points and template.
    pub fn new(name: impl Into<String>, points: Vec<f64>, template: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            points,
            template: template.into(),
            cases_root: default_cases_root(),
            naming: CaseNaming::default(),
            boundary: BoundaryConfig::default(),
            stages: Vec::new(),
            post_stages: Vec::new(),
            partition_prefix: default_partition_prefix(),
            resource_budget: None,
            dependent: None,
        }
    }

    /// Load, resolve relative paths against the file's directory, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut spec: SweepSpec =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        spec.resolve_paths(base);
        spec.validate()?;
        Ok(spec)
    }

    /// Make `template` and `cases_root` absolute-or-base-relative, recursively.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.template.is_relative() {
            self.template = base.join(&self.template);
        }
        if self.cases_root.is_relative() {
            self.cases_root = base.join(&self.cases_root);
        }
        if let Some(link) = self.dependent.as_mut() {
            link.sweep.resolve_paths(base);
        }
    }

    /// Case directory for `point`.
    pub fn case_dir(&self, point: f64) -> PathBuf {
        self.cases_root.join(self.naming.directory_name(point))
    }

    /// Worker units one case claims through its enabled detached stages.
    pub fn detached_cost(&self) -> u32 {
        self.stages
            .iter()
            .filter(|s| s.enabled && s.mode == StageMode::Detached)
            .map(|s| s.workers)
            .sum()
    }

    /// Check the invariants the orchestrator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_own(None)?;

        let mut source = self;
        let mut source_points = self.points.clone();
        while let Some(link) = source.dependent.as_deref() {
            if link.artifact.field.is_empty() {
                return Err(invalid(&link.sweep.name, "artifact field is empty"));
            }
            if link.artifact.destination.as_os_str().is_empty() {
                return Err(invalid(&link.sweep.name, "artifact destination is empty"));
            }
            link.sweep.validate_own(Some(&source_points))?;
            if !link.sweep.points.is_empty() {
                source_points = link.sweep.points.clone();
            }
            source = &link.sweep;
        }
        Ok(())
    }

    fn validate_own(&self, source_points: Option<&[f64]>) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(invalid(&self.name, "name is empty"));
        }

        match source_points {
            None if self.points.is_empty() => {
                return Err(invalid(&self.name, "no parameter points"));
            }
            Some(source) => {
                for point in &self.points {
                    if !source.iter().any(|p| p.to_bits() == point.to_bits()) {
                        return Err(invalid(
                            &self.name,
                            &format!("point {} is not a point of the source sweep", render_scalar(*point)),
                        ));
                    }
                }
            }
            None => {}
        }

        let mut names = HashSet::new();
        for point in &self.points {
            if !point.is_finite() {
                return Err(invalid(&self.name, "parameter points must be finite"));
            }
            if !names.insert(self.naming.directory_name(*point)) {
                return Err(invalid(
                    &self.name,
                    &format!("duplicate point {}", render_scalar(*point)),
                ));
            }
        }

        let mut inlets = HashSet::new();
        for inlet in &self.boundary.inlets {
            if inlet.name.trim().is_empty() {
                return Err(invalid(&self.name, "inlet name is empty"));
            }
            if inlet.name.chars().any(|c| c.is_whitespace() || "{}();\"".contains(c)) {
                return Err(invalid(
                    &self.name,
                    &format!("inlet '{}' is not a single dictionary word", inlet.name),
                ));
            }
            if !inlet.normal.iter().all(|c| c.is_finite()) {
                return Err(invalid(&self.name, &format!("inlet '{}' has a non-finite normal", inlet.name)));
            }
            if !inlets.insert(inlet.name.as_str()) {
                return Err(invalid(&self.name, &format!("duplicate inlet '{}'", inlet.name)));
            }
        }

        for stage in self.stages.iter().chain(&self.post_stages) {
            if stage.command.is_empty() {
                return Err(invalid(&self.name, &format!("stage '{}' has an empty command", stage.name)));
            }
        }

        if crate::provision::is_within(&self.cases_root, &self.template) {
            return Err(invalid(&self.name, "cases root lies inside the template"));
        }

        if self.partition_prefix.is_empty() {
            return Err(invalid(&self.name, "partition prefix is empty"));
        }
        if self.resource_budget == Some(0) {
            return Err(invalid(&self.name, "resource budget must be positive"));
        }
        Ok(())
    }

    /// SHA-256 of the spec's JSON form. Stable for identical specs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(format!("{self:?}").as_bytes()),
        }
        hex::encode(hasher.finalize())
    }

    /// Pipelines in execution order, each paired with its source link.
    pub fn pipelines(&self) -> Vec<Pipeline<'_>> {
        let mut out = vec![Pipeline {
            spec: self,
            points: self.points.clone(),
            source: None,
        }];
        let mut source = self;
        while let Some(link) = source.dependent.as_deref() {
            let points = if link.sweep.points.is_empty() {
                out.last().map(|p| p.points.clone()).unwrap_or_default()
            } else {
                link.sweep.points.clone()
            };
            out.push(Pipeline {
                spec: &link.sweep,
                points,
                source: Some((source, &link.artifact)),
            });
            source = &link.sweep;
        }
        out
    }
}

/// One sweep in a dependent chain, with its effective points.
#[derive(Debug, Clone)]
pub struct Pipeline<'a> {
    pub spec: &'a SweepSpec,
    pub points: Vec<f64>,
    /// Source sweep and handoff, for dependent pipelines.
    pub source: Option<(&'a SweepSpec, &'a ArtifactHandoff)>,
}

fn invalid(sweep: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        sweep: sweep.to_string(),
        reason: reason.to_string(),
    }
}
