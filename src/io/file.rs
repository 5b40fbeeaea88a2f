use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::escape_file_stem;
use crate::model::{Phase, ViewContext};
use crate::store::{decode_context, decode_phases, encode, StoreError, TimelineStore};

/// Timeline store keeping one JSON file per project under a data directory.
///
/// ```text
/// <root>/timelines/<project>.timeline.json
/// <root>/view_context.json
/// ```
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader sees either the old file or the new one.
#[derive(Debug, Clone)]
pub struct FileTimelineStore {
    root: PathBuf,
}

impl FileTimelineStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let timelines = root.join("timelines");
        fs::create_dir_all(&timelines).map_err(|source| StoreError::Io {
            path: timelines.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the timeline of `project_id`.
    pub fn path_for(&self, project_id: &str) -> PathBuf {
        self.root
            .join("timelines")
            .join(format!("{}.timeline.json", escape_file_stem(project_id)))
    }

    fn context_path(&self) -> PathBuf {
        self.root.join("view_context.json")
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write through a temp file in the target directory, then rename over
/// `path`. The temp file is removed on drop if anything fails first.
fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let io_error = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(parent).map_err(io_error)?;
    temp.write_all(content.as_bytes()).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}

impl TimelineStore for FileTimelineStore {
    fn load(&self, project_id: &str) -> Result<Option<Vec<Phase>>, StoreError> {
        Ok(read_optional(&self.path_for(project_id))?
            .and_then(|raw| decode_phases(project_id, &raw)))
    }

    fn save(&self, project_id: &str, phases: &[Phase]) -> Result<(), StoreError> {
        let content = encode(project_id, phases)?;
        write_atomic(&self.path_for(project_id), &content)?;
        tracing::debug!(project = %project_id, phases = phases.len(), "timeline saved");
        Ok(())
    }

    fn load_context(&self) -> Result<Option<ViewContext>, StoreError> {
        Ok(read_optional(&self.context_path())?.and_then(|raw| decode_context(&raw)))
    }

    fn save_context(&self, context: &ViewContext) -> Result<(), StoreError> {
        let content = encode("view_context", context)?;
        write_atomic(&self.context_path(), &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhaseEstimate;
    use crate::schedule::schedule;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn phases(project_id: &str) -> Vec<Phase> {
        let estimates = vec![
            PhaseEstimate::new("Foundation", 5),
            PhaseEstimate::new("Structure", 10),
        ];
        schedule(project_id, &estimates, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()).phases
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileTimelineStore::open(dir.path()).unwrap();
        let saved = phases("house");
        store.save("house", &saved).unwrap();
        assert_eq!(store.load("house").unwrap(), Some(saved));
    }

    #[test]
    fn test_unknown_project_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileTimelineStore::open(dir.path()).unwrap();
        assert_eq!(store.load("unknown-project").unwrap(), None);
        assert_eq!(store.load_context().unwrap(), None);
    }

    #[test]
    fn test_unreadable_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileTimelineStore::open(dir.path()).unwrap();
        fs::write(store.path_for("house"), "[{\"id\": 3}]").unwrap();
        assert_eq!(store.load("house").unwrap(), None);
    }

    #[test]
    fn test_project_ids_cannot_escape_the_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileTimelineStore::open(dir.path()).unwrap();
        let path = store.path_for("../etc/passwd");
        assert_eq!(path.parent().unwrap(), dir.path().join("timelines"));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "%2E%2E%2Fetc%2Fpasswd.timeline.json"
        );

        store.save("../etc/passwd", &phases("x")).unwrap();
        assert!(store.load("../etc/passwd").unwrap().is_some());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileTimelineStore::open(dir.path()).unwrap();
        store.save("house", &phases("house")).unwrap();
        store.save("house", &phases("house")).unwrap();
        store.save_context(&ViewContext::active("house")).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("timelines"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["house.timeline.json".to_string()]);
        assert_eq!(
            store.load_context().unwrap(),
            Some(ViewContext::active("house"))
        );
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let saved = phases("house");
        FileTimelineStore::open(dir.path())
            .unwrap()
            .save("house", &saved)
            .unwrap();
        let reopened = FileTimelineStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load("house").unwrap(), Some(saved));
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileTimelineStore::open(dir.path()).unwrap();
        // A directory where the timeline file should be makes the rename fail.
        fs::create_dir(store.path_for("house")).unwrap();

        assert!(matches!(
            store.save("house", &phases("house")),
            Err(StoreError::Io { .. })
        ));
        let names: Vec<String> = fs::read_dir(dir.path().join("timelines"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["house.timeline.json".to_string()]);
    }
}
