//! Durable per-project timeline persistence.
//!
//! One entry per project id holding the full serialized phase list, plus a
//! singleton entry for the [`ViewContext`]. Saves overwrite; the last writer
//! wins and nothing is merged. Two coordinators saving the same project at
//! the same time will silently clobber each other.

mod memory;

pub use memory::MemoryTimelineStore;

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Phase, ViewContext};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize timeline for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage quota exceeded writing '{key}' ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value persistence of phase lists and the shared view context.
///
/// `load` never fails for a project that simply has nothing stored, and data
/// that cannot be decoded is reported as absent.
pub trait TimelineStore: Send + Sync {
    fn load(&self, project_id: &str) -> Result<Option<Vec<Phase>>, StoreError>;

    /// Replace the whole stored list for `project_id`.
    fn save(&self, project_id: &str, phases: &[Phase]) -> Result<(), StoreError>;

    fn load_context(&self) -> Result<Option<ViewContext>, StoreError>;

    fn save_context(&self, context: &ViewContext) -> Result<(), StoreError>;
}

/// Decode a stored phase list, treating anything unusable as absent.
pub(crate) fn decode_phases(project_id: &str, raw: &str) -> Option<Vec<Phase>> {
    let phases: Vec<Phase> = match serde_json::from_str(raw) {
        Ok(phases) => phases,
        Err(e) => {
            tracing::warn!(project = %project_id, error = %e, "discarding unreadable timeline");
            return None;
        }
    };
    if let Some(bad) = phases
        .iter()
        .find(|p| p.duration_days == 0 || p.planned_end < p.planned_start)
    {
        tracing::warn!(
            project = %project_id,
            phase = %bad.name,
            "discarding timeline with inconsistent planned range"
        );
        return None;
    }
    Some(phases)
}

pub(crate) fn decode_context(raw: &str) -> Option<ViewContext> {
    match serde_json::from_str(raw) {
        Ok(context) => Some(context),
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable view context");
            None
        }
    }
}

pub(crate) fn encode<T: serde::Serialize + ?Sized>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })
}
