use std::collections::HashMap;
use std::sync::RwLock;

use super::{decode_context, decode_phases, encode, StoreError, TimelineStore};
use crate::model::{Phase, ViewContext};

const CONTEXT_KEY: &str = "view_context";

/// In-process store holding serialized entries, like browser session storage.
///
/// Values are kept as JSON text so unreadable data behaves the same way it
/// does on disk. An optional byte quota makes saves fail once the stored
/// total would exceed it.
#[derive(Debug, Default)]
pub struct MemoryTimelineStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: RwLock<Option<usize>>,
}

impl MemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::default(),
            quota_bytes: RwLock::new(Some(quota_bytes)),
        }
    }

    /// Change or lift the byte quota.
    pub fn set_quota(&self, quota_bytes: Option<usize>) -> Result<(), StoreError> {
        let mut quota = self.quota_bytes.write().map_err(poisoned)?;
        *quota = quota_bytes;
        Ok(())
    }

    /// Store raw text under a project key, bypassing serialization.
    pub fn put_raw(&self, project_id: &str, raw: impl Into<String>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(project_key(project_id), raw.into());
        Ok(())
    }

    /// Number of stored project timelines.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.keys().filter(|k| k.as_str() != CONTEXT_KEY).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: String, value: String) -> Result<(), StoreError> {
        let quota = *self.quota_bytes.read().map_err(poisoned)?;
        let mut entries = self.entries.write().map_err(poisoned)?;

        if let Some(limit) = quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| **k != key)
                .map(|(_, v)| v.len())
                .sum();
            let available = limit.saturating_sub(used);
            if value.len() > available {
                return Err(StoreError::QuotaExceeded {
                    key,
                    needed: value.len(),
                    available,
                });
            }
        }

        entries.insert(key, value);
        Ok(())
    }
}

fn project_key(project_id: &str) -> String {
    format!("timeline:{}", project_id)
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl TimelineStore for MemoryTimelineStore {
    fn load(&self, project_id: &str) -> Result<Option<Vec<Phase>>, StoreError> {
        Ok(self
            .read(&project_key(project_id))?
            .and_then(|raw| decode_phases(project_id, &raw)))
    }

    fn save(&self, project_id: &str, phases: &[Phase]) -> Result<(), StoreError> {
        let key = project_key(project_id);
        let value = encode(&key, phases)?;
        self.write(key, value)
    }

    fn load_context(&self) -> Result<Option<ViewContext>, StoreError> {
        Ok(self.read(CONTEXT_KEY)?.and_then(|raw| decode_context(&raw)))
    }

    fn save_context(&self, context: &ViewContext) -> Result<(), StoreError> {
        let value = encode(CONTEXT_KEY, context)?;
        self.write(CONTEXT_KEY.to_string(), value)
    }
}
