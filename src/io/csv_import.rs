use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::PhaseEstimate;
use crate::source::{EstimationSource, SourceError};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV is missing required columns. Found headers: {0:?}. Need columns for: phase name, duration.")]
    MissingColumns(Vec<String>),

    #[error("CSV file is empty or has no data rows")]
    Empty,

    #[error("No valid phases found in CSV ({0} rows skipped)")]
    NoValidRows(usize),
}

/// Column roles recognised in an estimate sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    Duration,
    Dependencies,
    Critical,
}

/// Detect delimiter by checking the first line for common separators.
fn detect_delimiter(first_line: &str) -> u8 {
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    let tabs = first_line.matches('\t').count();

    if semicolons >= commas && semicolons >= tabs {
        b';'
    } else if tabs >= commas {
        b'\t'
    } else {
        b','
    }
}

/// Normalize a header string to a canonical column key.
fn normalize_header(h: &str) -> String {
    h.trim().to_lowercase().replace([' ', '-', '_'], "")
}

fn header_to_column(normalized: &str) -> Option<Column> {
    match normalized {
        "phase" | "phasename" | "name" | "task" | "taskname" | "label" | "activity" => {
            Some(Column::Name)
        }

        "duration" | "durationdays" | "days" | "estimate" | "estimateddays" => {
            Some(Column::Duration)
        }

        "dependencies" | "dependson" | "depends" | "predecessors" | "after" => {
            Some(Column::Dependencies)
        }

        "critical" | "criticalpath" | "iscriticalpath" => Some(Column::Critical),

        _ => None,
    }
}

/// Split a dependency cell on `|` or `,`, dropping blanks.
fn split_dependencies(cell: &str) -> Vec<String> {
    cell.split(['|', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(cell: &str) -> bool {
    matches!(
        cell.trim().to_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x" | "critical"
    )
}

/// Parse phase estimates from CSV text.
///
/// Auto-detects delimiter (comma, semicolon, tab) and matches headers
/// loosely. A duration cell that is not an integer is kept as missing so the
/// scheduler can report the coercion. Returns `(estimates, skipped_rows)`.
pub fn parse_estimates(content: &str) -> Result<(Vec<PhaseEstimate>, usize), ImportError> {
    let first_line = content.lines().next().unwrap_or("");
    if first_line.trim().is_empty() {
        return Err(ImportError::Empty);
    }
    let delimiter = detect_delimiter(first_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let columns: Vec<Option<Column>> = headers
        .iter()
        .map(|h| header_to_column(&normalize_header(h)))
        .collect();

    let has = |c: Column| columns.contains(&Some(c));
    if !has(Column::Name) || !has(Column::Duration) {
        return Err(ImportError::MissingColumns(
            headers.iter().map(str::to_string).collect(),
        ));
    }

    let mut estimates = Vec::new();
    let mut skipped = 0usize;

    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(row = i + 2, error = %e, "skipping CSV row");
                skipped += 1;
                continue;
            }
        };

        let mut name = None;
        let mut duration = None;
        let mut dependencies = Vec::new();
        let mut critical = false;

        for (field, column) in record.iter().zip(&columns) {
            match column {
                Some(Column::Name) => name = Some(field.to_string()),
                Some(Column::Duration) => duration = field.parse::<i64>().ok(),
                Some(Column::Dependencies) => dependencies = split_dependencies(field),
                Some(Column::Critical) => critical = parse_flag(field),
                None => {}
            }
        }

        let phase_name = match name {
            Some(n) if !n.is_empty() => n,
            _ => {
                skipped += 1;
                continue;
            }
        };

        estimates.push(PhaseEstimate {
            phase_name,
            duration_days: duration,
            dependencies,
            is_critical_path: critical,
        });
    }

    if estimates.is_empty() {
        return Err(if skipped > 0 {
            ImportError::NoValidRows(skipped)
        } else {
            ImportError::Empty
        });
    }

    Ok((estimates, skipped))
}

/// Import phase estimates from a CSV file.
pub fn import_estimates(path: &Path) -> Result<(Vec<PhaseEstimate>, usize), ImportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_estimates(&content)
}

/// Estimation source reading `<dir>/<project id>.csv`.
#[derive(Debug, Clone)]
pub struct CsvEstimationSource {
    dir: PathBuf,
}

impl CsvEstimationSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, project_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.csv", super::escape_file_stem(project_id)))
    }
}

impl EstimationSource for CsvEstimationSource {
    fn estimate(&self, project_id: &str) -> Result<Vec<PhaseEstimate>, SourceError> {
        let path = self.path_for(project_id);
        if !path.exists() {
            return Err(SourceError::NoEstimate(project_id.to_string()));
        }
        let (estimates, skipped) = import_estimates(&path)?;
        if skipped > 0 {
            tracing::warn!(project = %project_id, skipped, "estimate rows skipped");
        }
        Ok(estimates)
    }
}
