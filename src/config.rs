use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::Deserialize;

use crate::coordinator::CoordinatorConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "GANTT_SYNC_DATA_DIR";

const DEFAULT_SLOW_LISTENER_MS: u64 = 250;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Holds `timelines/`, `estimates/`, `projects.json` and the view context.
    pub data_dir: PathBuf,
    /// Start date for newly seeded schedules; today when unset.
    pub project_start: Option<NaiveDate>,
    pub slow_listener_threshold: Option<Duration>,
    pub load_timeout: Option<Duration>,
}

/// Raw TOML file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    project_start: Option<NaiveDate>,
    slow_listener_threshold_ms: Option<u64>,
    load_timeout_ms: Option<u64>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gantt-phase-sync")
}

/// Default config file location, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("gantt-data"))
}

impl Config {
    /// Load configuration from `path` (or the default location) and the
    /// environment. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);

        let file_config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                toml::from_str::<ConfigFile>(&content)
                    .with_context(|| format!("failed to parse config: {}", path.display()))?
            }
            _ => ConfigFile::default(),
        };

        Ok(Self::from_file_and_env(
            file_config,
            std::env::var(DATA_DIR_ENV).ok(),
        ))
    }

    fn from_file_and_env(file: ConfigFile, env_data_dir: Option<String>) -> Self {
        let data_dir = env_data_dir
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(default_data_dir);

        Self {
            data_dir,
            project_start: file.project_start,
            slow_listener_threshold: Some(Duration::from_millis(
                file.slow_listener_threshold_ms
                    .unwrap_or(DEFAULT_SLOW_LISTENER_MS),
            )),
            load_timeout: file.load_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn estimates_dir(&self) -> PathBuf {
        self.data_dir.join("estimates")
    }

    pub fn projects_file(&self) -> PathBuf {
        self.data_dir.join("projects.json")
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            project_start: self.project_start,
            load_timeout: self.load_timeout,
            slow_listener_threshold: self.slow_listener_threshold,
        }
    }
}
