use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;

use crate::model::Phase;

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Write phases as semicolon-delimited CSV to any writer.
///
/// Columns: Project ; Phase ; Planned Start ; Planned End ; Actual Start ;
/// Actual End ; Progress ; Status. Returns the number of phases written.
pub fn write_csv<W: Write>(phases: &[Phase], writer: W) -> Result<usize, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record([
        "Project",
        "Phase",
        "Planned Start",
        "Planned End",
        "Actual Start",
        "Actual End",
        "Progress",
        "Status",
    ])?;

    for phase in phases {
        wtr.write_record([
            phase.project_id.clone(),
            phase.name.clone(),
            format_date(Some(phase.planned_start)),
            format_date(Some(phase.planned_end)),
            format_date(phase.actual_start),
            format_date(phase.actual_end),
            phase.progress_percentage.to_string(),
            phase.status().label().to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(phases.len())
}

/// Export phases to a CSV file.
pub fn export_csv(phases: &[Phase], path: &Path) -> Result<usize, csv::Error> {
    let file = std::fs::File::create(path)?;
    write_csv(phases, file)
}
