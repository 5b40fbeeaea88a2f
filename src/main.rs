use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use gantt_phase_sync::io::{export_csv, CsvEstimationSource, FileTimelineStore};
use gantt_phase_sync::layout::PhaseBar;
use gantt_phase_sync::model::timeline::{parse_date, today};
use gantt_phase_sync::model::TimelineScale;
use gantt_phase_sync::source::JsonProjectDirectory;
use gantt_phase_sync::{Config, CoordinatorError, Phase, ProjectDirectory, ViewCoordinator};

const BAR_WIDTH: usize = 60;

#[derive(Parser)]
#[command(name = "gantt-sync", version, about = "Project phase timelines and Gantt layout")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding config and environment
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List known projects
    Projects,

    /// Print the Gantt layout of a project or of every project
    Show {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, conflicts_with = "project")]
        all: bool,
        /// Axis scale: days, weeks or months
        #[arg(long, default_value = "weeks")]
        scale: TimelineScale,
    },

    /// Record actual start and/or end dates for a phase
    Actual {
        phase_id: Uuid,
        #[arg(long, value_parser = parse_date_arg)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        end: Option<NaiveDate>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, conflicts_with = "project")]
        all: bool,
    },

    /// Export phases to a semicolon-delimited CSV file
    Export {
        path: PathBuf,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, conflicts_with = "project")]
        all: bool,
    },
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).ok_or_else(|| format!("unrecognised date '{}'", s))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    info!(data_dir = %config.data_dir.display(), "loaded config");

    let store = FileTimelineStore::open(&config.data_dir)
        .with_context(|| format!("failed to open data dir {}", config.data_dir.display()))?;
    let directory = Arc::new(JsonProjectDirectory::new(config.projects_file()));
    let estimates = Arc::new(CsvEstimationSource::new(config.estimates_dir()));

    if let Command::Projects = cli.command {
        for project in directory.projects()? {
            println!("{}\t{}", project.id, project.name);
        }
        return Ok(());
    }

    let mut coordinator = ViewCoordinator::new(
        Arc::new(store),
        estimates,
        directory,
        config.coordinator_config(),
    );
    coordinator.bus().subscribe(|event| {
        tracing::debug!(kind = ?event.kind(), "sync event");
        Ok(())
    });

    match cli.command {
        Command::Projects => {}
        Command::Show {
            project,
            all,
            scale,
        } => {
            open_view(&mut coordinator, project, all)?;
            report_warnings(&mut coordinator);
            print_layout(&coordinator, scale);
        }
        Command::Actual {
            phase_id,
            start,
            end,
            project,
            all,
        } => {
            if start.is_none() && end.is_none() {
                bail!("give --start, --end or both");
            }
            open_view(&mut coordinator, project, all)?;
            report_warnings(&mut coordinator);
            match coordinator.update_phase_actual_dates(phase_id, start, end) {
                Ok(phase) => print_phase(&phase),
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "save failed, retrying once");
                    coordinator.retry_pending_saves()?;
                    if let Some(phase) = coordinator.phase(phase_id) {
                        print_phase(phase);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Export { path, project, all } => {
            open_view(&mut coordinator, project, all)?;
            report_warnings(&mut coordinator);
            let phases: Vec<Phase> = coordinator.visible_phases().into_iter().cloned().collect();
            let count = export_csv(&phases, &path)
                .with_context(|| format!("failed to export {}", path.display()))?;
            println!("Exported {} phases to {}", count, path.display());
        }
    }
    Ok(())
}

fn open_view(
    coordinator: &mut ViewCoordinator,
    project: Option<String>,
    all: bool,
) -> Result<(), CoordinatorError> {
    if all {
        coordinator.show_consolidated()?;
    } else if let Some(project) = project {
        coordinator.select_project(project)?;
    } else {
        coordinator.open()?;
    }
    Ok(())
}

fn report_warnings(coordinator: &mut ViewCoordinator) {
    for warning in coordinator.take_warnings() {
        eprintln!("warning: {}", warning);
    }
}

fn print_phase(phase: &Phase) {
    let fmt = |d: Option<NaiveDate>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    println!(
        "{} '{}' [{}] planned {} .. {}, actual {} .. {}, {}%",
        phase.id,
        phase.name,
        phase.status().label(),
        phase.planned_start,
        phase.planned_end,
        fmt(phase.actual_start),
        fmt(phase.actual_end),
        phase.progress_percentage
    );
}

/// Fill the cells of `row` covered by a percentage range.
fn paint(row: &mut [char], left_pct: f64, width_pct: f64, fill: char) {
    let cells = row.len() as f64;
    let from = (left_pct / 100.0 * cells).floor() as usize;
    let to = (((left_pct + width_pct) / 100.0 * cells).ceil() as usize).max(from + 1);
    for cell in row.iter_mut().take(to).skip(from) {
        *cell = fill;
    }
}

fn render_row(bar: &PhaseBar) -> String {
    let mut row = vec![' '; BAR_WIDTH];
    let fill = if bar.is_milestone { '◆' } else { '=' };
    paint(&mut row, bar.planned.left_pct, bar.planned.width_pct, fill);
    if let Some(actual) = &bar.actual {
        paint(&mut row, actual.left_pct, actual.width_pct, '#');
    }
    row.into_iter().collect()
}

fn print_layout(coordinator: &ViewCoordinator, scale: TimelineScale) {
    let layout = coordinator.layout(today());
    println!(
        "{} .. {} ({} days)",
        layout.span_start, layout.span_end, layout.total_days
    );

    let mut axis = vec![' '; BAR_WIDTH];
    for tick in layout.ticks(scale) {
        paint(&mut axis, tick.left_pct, 0.0, '|');
    }
    if let Some(pct) = layout.today_pct() {
        paint(&mut axis, pct, 0.0, 'T');
    }
    println!("{:<32} {}", "", axis.into_iter().collect::<String>());

    for bar in &layout.bars {
        let marker = if bar.is_critical_path { '!' } else { ' ' };
        println!(
            "{}{:<31} {} {:>3}% {}",
            marker,
            truncate(&format!("{} / {}", bar.project_id, bar.label), 31),
            render_row(bar),
            bar.progress_percentage,
            bar.phase_id
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
