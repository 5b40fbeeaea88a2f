//! Collaborators that feed the coordinator: duration estimates and the list
//! of known projects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::io::csv_import::ImportError;
use crate::model::{PhaseEstimate, Project};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No estimate available for project '{0}'")]
    NoEstimate(String),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid project list {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies ordered phase duration estimates for a project.
///
/// Consulted only when a project has no stored timeline.
pub trait EstimationSource: Send + Sync {
    fn estimate(&self, project_id: &str) -> Result<Vec<PhaseEstimate>, SourceError>;
}

/// Enumerates every known project, in display order.
pub trait ProjectDirectory: Send + Sync {
    fn projects(&self) -> Result<Vec<Project>, SourceError>;
}

/// Estimates held in memory, keyed by project id.
#[derive(Debug, Clone, Default)]
pub struct StaticEstimationSource {
    estimates: HashMap<String, Vec<PhaseEstimate>>,
}

impl StaticEstimationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, project_id: impl Into<String>, estimates: Vec<PhaseEstimate>) -> Self {
        self.estimates.insert(project_id.into(), estimates);
        self
    }
}

impl EstimationSource for StaticEstimationSource {
    fn estimate(&self, project_id: &str) -> Result<Vec<PhaseEstimate>, SourceError> {
        self.estimates
            .get(project_id)
            .cloned()
            .ok_or_else(|| SourceError::NoEstimate(project_id.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticProjectDirectory {
    projects: Vec<Project>,
}

impl StaticProjectDirectory {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }
}

impl ProjectDirectory for StaticProjectDirectory {
    fn projects(&self) -> Result<Vec<Project>, SourceError> {
        Ok(self.projects.clone())
    }
}

/// Project list read from a JSON array of `{ "id", "name" }` objects.
///
/// The file is re-read on every call. A missing file means no projects.
#[derive(Debug, Clone)]
pub struct JsonProjectDirectory {
    path: PathBuf,
}

impl JsonProjectDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProjectDirectory for JsonProjectDirectory {
    fn projects(&self) -> Result<Vec<Project>, SourceError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SourceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&json).map_err(|source| SourceError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
