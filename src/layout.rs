//! Gantt bar geometry.
//!
//! Every position is a percentage of the chart width, so the rendering layer
//! only has to scale by its own pixel width.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::model::timeline::days_between;
use crate::model::{Phase, PhaseStatus, TimelineScale};

/// Horizontal placement of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarGeometry {
    pub left_pct: f64,
    pub width_pct: f64,
}

impl BarGeometry {
    pub fn right_pct(&self) -> f64 {
        self.left_pct + self.width_pct
    }
}

/// Render-ready row for one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseBar {
    pub phase_id: Uuid,
    pub project_id: String,
    pub label: String,
    pub planned: BarGeometry,
    /// Present only when both actual dates are recorded.
    pub actual: Option<BarGeometry>,
    pub progress_percentage: u8,
    pub status: PhaseStatus,
    pub is_milestone: bool,
    pub is_critical_path: bool,
}

/// A labelled grid line on the time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisTick {
    pub date: NaiveDate,
    pub left_pct: f64,
    pub label: String,
}

/// Geometry for a whole chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GanttLayout {
    pub span_start: NaiveDate,
    pub span_end: NaiveDate,
    /// Inclusive day count of the span, never zero.
    pub total_days: i64,
    pub today: NaiveDate,
    pub bars: Vec<PhaseBar>,
}

impl GanttLayout {
    /// Percentage offset of `date` from the span start, unclamped.
    pub fn date_to_pct(&self, date: NaiveDate) -> f64 {
        days_between(self.span_start, date) as f64 / self.total_days as f64 * 100.0
    }

    /// Where the today marker goes, if today falls inside the span.
    pub fn today_pct(&self) -> Option<f64> {
        if self.today < self.span_start || self.today > self.span_end {
            return None;
        }
        Some(self.date_to_pct(self.today))
    }

    pub fn bar(&self, phase_id: Uuid) -> Option<&PhaseBar> {
        self.bars.iter().find(|b| b.phase_id == phase_id)
    }

    /// Axis grid lines for the requested scale, limited to the span.
    pub fn ticks(&self, scale: TimelineScale) -> Vec<AxisTick> {
        let mut ticks = Vec::new();
        let mut date = self.span_start;

        match scale {
            TimelineScale::Days => {
                while date <= self.span_end {
                    ticks.push(self.tick(date, date.format("%d").to_string()));
                    match date.checked_add_days(Days::new(1)) {
                        Some(next) => date = next,
                        None => break,
                    }
                }
            }
            TimelineScale::Weeks => {
                let weekday = date.weekday().num_days_from_monday();
                if weekday != 0 {
                    match date.checked_add_days(Days::new(u64::from(7 - weekday))) {
                        Some(monday) => date = monday,
                        None => return ticks,
                    }
                }
                while date <= self.span_end {
                    ticks.push(self.tick(date, date.format("W%V").to_string()));
                    match date.checked_add_days(Days::new(7)) {
                        Some(next) => date = next,
                        None => break,
                    }
                }
            }
            TimelineScale::Months => {
                if date.day() != 1 {
                    match first_of_next_month(date) {
                        Some(next) => date = next,
                        None => return ticks,
                    }
                }
                while date <= self.span_end {
                    ticks.push(self.tick(date, date.format("%b %Y").to_string()));
                    match first_of_next_month(date) {
                        Some(next) => date = next,
                        None => break,
                    }
                }
            }
        }
        ticks
    }

    fn tick(&self, date: NaiveDate, label: String) -> AxisTick {
        AxisTick {
            date,
            left_pct: self.date_to_pct(date),
            label,
        }
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
}

/// Compute bar geometry for `phases`.
///
/// The span covers every planned and actual date present. With no phases the
/// span collapses to the single day `today`.
pub fn compute_layout(phases: &[Phase], today: NaiveDate) -> GanttLayout {
    let span_start = phases.iter().flat_map(Phase::dates).min().unwrap_or(today);
    let span_end = phases
        .iter()
        .flat_map(Phase::dates)
        .max()
        .unwrap_or(today)
        .max(span_start);
    let total_days = days_between(span_start, span_end) + 1;

    let bars = phases
        .iter()
        .map(|phase| PhaseBar {
            phase_id: phase.id,
            project_id: phase.project_id.clone(),
            label: phase.name.clone(),
            planned: geometry(
                span_start,
                total_days,
                phase.planned_start,
                phase.planned_end,
            ),
            actual: phase
                .actual_range()
                .map(|(start, end)| geometry(span_start, total_days, start, end)),
            progress_percentage: phase.progress_percentage,
            status: phase.status(),
            is_milestone: phase.is_milestone(),
            is_critical_path: phase.is_critical_path,
        })
        .collect();

    GanttLayout {
        span_start,
        span_end,
        total_days,
        today,
        bars,
    }
}

fn geometry(span_start: NaiveDate, total_days: i64, start: NaiveDate, end: NaiveDate) -> BarGeometry {
    let total = total_days.max(1) as f64;
    let offset = days_between(span_start, start) as f64;
    let duration = (days_between(start, end) + 1).max(1) as f64;

    let left_pct = (offset / total * 100.0).clamp(0.0, 100.0);
    let width_pct = (duration / total * 100.0).clamp(0.0, 100.0 - left_pct);
    BarGeometry {
        left_pct,
        width_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::timeline::add_days;
    use crate::model::PhaseEstimate;
    use crate::schedule::schedule;

    const EPS: f64 = 1e-6;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn house() -> Vec<Phase> {
        let estimates = vec![
            PhaseEstimate::new("Foundation", 5),
            PhaseEstimate::new("Structure", 10),
        ];
        schedule("house", &estimates, date(2024, 6, 1)).phases
    }

    fn assert_bounds(bar: &BarGeometry) {
        assert!(bar.left_pct >= 0.0, "left {} < 0", bar.left_pct);
        assert!(bar.width_pct >= 0.0, "width {} < 0", bar.width_pct);
        assert!(bar.right_pct() <= 100.0 + EPS, "right {} > 100", bar.right_pct());
    }

    #[test]
    fn test_structure_bar_percentages() {
        let layout = compute_layout(&house(), date(2024, 6, 3));
        assert_eq!(layout.span_start, date(2024, 6, 1));
        assert_eq!(layout.span_end, date(2024, 6, 15));
        assert_eq!(layout.total_days, 15);

        let structure = &layout.bars[1];
        assert!((structure.planned.left_pct - 33.333_333).abs() < 1e-3);
        assert!((structure.planned.width_pct - 66.666_667).abs() < 1e-3);
        assert_eq!(format!("{:.2}", structure.planned.left_pct), "33.33");
        assert_eq!(format!("{:.2}", structure.planned.width_pct), "66.67");

        let foundation = &layout.bars[0];
        assert!(foundation.planned.left_pct.abs() < EPS);
        assert!(foundation.actual.is_none());
    }

    #[test]
    fn test_empty_input_uses_single_day_span() {
        let today = date(2024, 6, 1);
        let layout = compute_layout(&[], today);
        assert_eq!(layout.total_days, 1);
        assert_eq!(layout.span_start, today);
        assert_eq!(layout.span_end, today);
        assert!(layout.bars.is_empty());
        assert_eq!(layout.today_pct(), Some(0.0));
    }

    #[test]
    fn test_actual_dates_widen_span() {
        let mut phases = house();
        phases[1].actual_start = Some(date(2024, 6, 10));
        phases[1].actual_end = Some(date(2024, 6, 30));
        let layout = compute_layout(&phases, date(2024, 6, 1));

        assert_eq!(layout.span_end, date(2024, 6, 30));
        assert_eq!(layout.total_days, 30);
        let actual = layout.bars[1].actual.unwrap();
        assert!((actual.left_pct - 30.0).abs() < EPS);
        assert!((actual.width_pct - 70.0).abs() < EPS);
        assert_bounds(&actual);
    }

    #[test]
    fn test_half_recorded_actual_emits_no_bar() {
        let mut phases = house();
        phases[0].actual_start = Some(date(2024, 5, 20));
        let layout = compute_layout(&phases, date(2024, 6, 1));
        // The lone actual start still counts toward the span.
        assert_eq!(layout.span_start, date(2024, 5, 20));
        assert!(layout.bars[0].actual.is_none());
        assert_eq!(layout.bars[0].status, PhaseStatus::InProgress);
    }

    #[test]
    fn test_bounds_and_monotonicity_hold() {
        let durations = [3, 1, 12, 7, 1, 1, 40, 2];
        let estimates: Vec<PhaseEstimate> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| PhaseEstimate::new(format!("P{}", i), *d))
            .collect();
        let mut phases = schedule("p", &estimates, date(2024, 1, 29)).phases;
        phases[2].actual_start = Some(date(2024, 1, 1));
        phases[2].actual_end = Some(date(2024, 4, 30));
        phases[5].actual_start = Some(date(2024, 3, 1));
        phases[5].actual_end = Some(date(2024, 3, 1));

        let layout = compute_layout(&phases, date(2024, 2, 14));
        for bar in &layout.bars {
            assert_bounds(&bar.planned);
            if let Some(actual) = &bar.actual {
                assert_bounds(actual);
            }
        }
        for pair in layout.bars.windows(2) {
            assert!(pair[0].planned.left_pct <= pair[1].planned.left_pct);
        }
    }

    #[test]
    fn test_milestone_and_critical_flags_pass_through() {
        let mut estimates = vec![
            PhaseEstimate::new("Excavation", 2),
            PhaseEstimate::new("Milestone: Slab poured", 1),
        ];
        estimates[0].is_critical_path = true;
        let phases = schedule("p", &estimates, date(2024, 6, 1)).phases;
        let layout = compute_layout(&phases, date(2024, 6, 1));
        assert!(layout.bars[0].is_critical_path);
        assert!(!layout.bars[0].is_milestone);
        assert!(layout.bars[1].is_milestone);
        assert_eq!(layout.bar(phases[1].id).unwrap().label, "Milestone: Slab poured");
    }

    #[test]
    fn test_today_outside_span_has_no_marker() {
        let layout = compute_layout(&house(), date(2025, 1, 1));
        assert_eq!(layout.today_pct(), None);
        let layout = compute_layout(&house(), date(2024, 6, 4));
        assert!((layout.today_pct().unwrap() - 20.0).abs() < EPS);
    }

    #[test]
    fn test_ticks_stay_inside_span() {
        let layout = compute_layout(&house(), date(2024, 6, 1));

        let days = layout.ticks(TimelineScale::Days);
        assert_eq!(days.len(), 15);
        assert_eq!(days[0].label, "01");

        // 2024-06-01 is a Saturday; the first Monday is 06-03.
        let weeks = layout.ticks(TimelineScale::Weeks);
        assert_eq!(weeks[0].date, date(2024, 6, 3));
        assert_eq!(weeks.len(), 2);

        let months = layout.ticks(TimelineScale::Months);
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].label, "Jun 2024");

        for tick in days.iter().chain(&weeks).chain(&months) {
            assert!(tick.left_pct >= 0.0 && tick.left_pct < 100.0);
        }
    }

    #[test]
    fn test_ticks_stop_at_calendar_end() {
        let mut phase = house().remove(0);
        phase.planned_end = NaiveDate::MAX;
        phase.planned_start = add_days(NaiveDate::MAX, -40);
        let layout = compute_layout(&[phase], date(2024, 6, 1));
        assert_eq!(layout.span_end, NaiveDate::MAX);

        assert_eq!(layout.ticks(TimelineScale::Days).len(), 41);
        assert!(layout.ticks(TimelineScale::Weeks).len() <= 6);
        let months = layout.ticks(TimelineScale::Months);
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].date.day(), 1);
    }
}
