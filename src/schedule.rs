//! Planned schedule derivation.
//!
//! Phases are laid end to end in list order starting from the project start
//! date. Dependencies travel with each phase but never move it.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::model::timeline::{add_days, days_between};
use crate::model::{Phase, PhaseEstimate};

/// Longest single phase the scheduler will plan, in days (about a century).
pub const MAX_PHASE_DAYS: u32 = 36_525;

/// Something the scheduler quietly corrected or could not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleWarning {
    /// The estimate had no usable positive duration; one day was used.
    DurationCoerced {
        project_id: String,
        phase: String,
        raw: Option<i64>,
    },
    /// The duration was longer than the calendar allows; it was shortened.
    DurationCapped {
        project_id: String,
        phase: String,
        raw: u32,
        capped: u32,
    },
    /// A dependency names no phase of the same project.
    UnknownDependency {
        project_id: String,
        phase: String,
        dependency: String,
    },
}

impl fmt::Display for ScheduleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleWarning::DurationCoerced {
                project_id,
                phase,
                raw: Some(raw),
            } => write!(
                f,
                "{}: phase '{}' has invalid duration {}, using 1 day",
                project_id, phase, raw
            ),
            ScheduleWarning::DurationCoerced {
                project_id, phase, ..
            } => write!(
                f,
                "{}: phase '{}' has no duration, using 1 day",
                project_id, phase
            ),
            ScheduleWarning::DurationCapped {
                project_id,
                phase,
                raw,
                capped,
            } => write!(
                f,
                "{}: phase '{}' duration {} is too long, using {} days",
                project_id, phase, raw, capped
            ),
            ScheduleWarning::UnknownDependency {
                project_id,
                phase,
                dependency,
            } => write!(
                f,
                "{}: phase '{}' depends on unknown phase '{}'",
                project_id, phase, dependency
            ),
        }
    }
}

/// Scheduled phases plus whatever was corrected on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub phases: Vec<Phase>,
    pub warnings: Vec<ScheduleWarning>,
}

impl Schedule {
    /// First planned start and last planned end.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.phases.first()?;
        let last = self.phases.last()?;
        Some((first.planned_start, last.planned_end))
    }
}

/// Stable id for the phase at `index` of a project's estimate.
pub fn phase_id(project_id: &str, index: usize, name: &str) -> Uuid {
    let key = format!("{}/{}/{}", project_id, index, name);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// Lay the estimated phases out back to back from `start`.
pub fn schedule(project_id: &str, estimates: &[PhaseEstimate], start: NaiveDate) -> Schedule {
    let known: HashSet<&str> = estimates.iter().map(|e| e.phase_name.as_str()).collect();
    let mut phases = Vec::with_capacity(estimates.len());
    let mut warnings = Vec::new();
    let mut cursor = start;

    for (index, estimate) in estimates.iter().enumerate() {
        if estimate.needs_coercion() {
            warnings.push(ScheduleWarning::DurationCoerced {
                project_id: project_id.to_string(),
                phase: estimate.phase_name.clone(),
                raw: estimate.duration_days,
            });
        }
        let requested = estimate.effective_days();
        let room = days_between(cursor, NaiveDate::MAX).saturating_add(1);
        let days = requested
            .min(MAX_PHASE_DAYS)
            .min(u32::try_from(room).unwrap_or(u32::MAX))
            .max(1);
        if days != requested {
            warnings.push(ScheduleWarning::DurationCapped {
                project_id: project_id.to_string(),
                phase: estimate.phase_name.clone(),
                raw: requested,
                capped: days,
            });
        }
        let id = phase_id(project_id, index, &estimate.phase_name);

        for dependency in &estimate.dependencies {
            let by_id = phases
                .iter()
                .any(|p: &Phase| p.id.to_string() == *dependency);
            if !known.contains(dependency.as_str()) && !by_id {
                warnings.push(ScheduleWarning::UnknownDependency {
                    project_id: project_id.to_string(),
                    phase: estimate.phase_name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let planned_end = add_days(cursor, i64::from(days) - 1);
        phases.push(Phase {
            id,
            project_id: project_id.to_string(),
            name: estimate.phase_name.clone(),
            duration_days: days,
            planned_start: cursor,
            planned_end,
            actual_start: None,
            actual_end: None,
            dependencies: estimate.dependencies.clone(),
            progress_percentage: 0,
            is_critical_path: estimate.is_critical_path,
        });
        cursor = add_days(planned_end, 1);
    }

    Schedule { phases, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::timeline::days_between;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_foundation_then_structure() {
        let estimates = vec![
            PhaseEstimate::new("Foundation", 5),
            PhaseEstimate::new("Structure", 10).depends_on("Foundation"),
        ];
        let schedule = schedule("house", &estimates, date(2024, 6, 1));

        let foundation = &schedule.phases[0];
        assert_eq!(foundation.planned_start, date(2024, 6, 1));
        assert_eq!(foundation.planned_end, date(2024, 6, 5));

        let structure = &schedule.phases[1];
        assert_eq!(structure.planned_start, date(2024, 6, 6));
        assert_eq!(structure.planned_end, date(2024, 6, 15));
        assert_eq!(structure.dependencies, vec!["Foundation".to_string()]);

        assert!(schedule.warnings.is_empty());
        assert_eq!(schedule.span(), Some((date(2024, 6, 1), date(2024, 6, 15))));
    }

    #[test]
    fn test_span_equals_total_duration() {
        let durations = [1, 3, 7, 2, 30, 1, 14];
        let estimates: Vec<PhaseEstimate> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| PhaseEstimate::new(format!("Phase {}", i), *d))
            .collect();
        let schedule = schedule("p", &estimates, date(2024, 12, 20));

        for (phase, d) in schedule.phases.iter().zip(durations) {
            assert_eq!(days_between(phase.planned_start, phase.planned_end) + 1, d);
        }
        let (first, last) = schedule.span().unwrap();
        assert_eq!(days_between(first, last) + 1, durations.iter().sum::<i64>());
    }

    #[test]
    fn test_schedule_is_deterministic() {
        let estimates = vec![
            PhaseEstimate::new("Design", 4),
            PhaseEstimate::new("Build", 9),
            PhaseEstimate::new("Inspect", 2),
        ];
        let a = schedule("p", &estimates, date(2024, 6, 1));
        let b = schedule("p", &estimates, date(2024, 6, 1));
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.phases).unwrap(),
            serde_json::to_string(&b.phases).unwrap()
        );
    }

    #[test]
    fn test_invalid_durations_become_one_day_with_warning() {
        let mut missing = PhaseEstimate::new("Permits", 0);
        missing.duration_days = None;
        let estimates = vec![PhaseEstimate::new("Survey", -2), missing];
        let schedule = schedule("p", &estimates, date(2024, 6, 1));

        assert_eq!(schedule.phases[0].duration_days, 1);
        assert_eq!(schedule.phases[0].planned_end, date(2024, 6, 1));
        assert_eq!(schedule.phases[1].planned_start, date(2024, 6, 2));
        assert_eq!(schedule.phases[1].planned_end, date(2024, 6, 2));
        assert_eq!(
            schedule.warnings,
            vec![
                ScheduleWarning::DurationCoerced {
                    project_id: "p".to_string(),
                    phase: "Survey".to_string(),
                    raw: Some(-2),
                },
                ScheduleWarning::DurationCoerced {
                    project_id: "p".to_string(),
                    phase: "Permits".to_string(),
                    raw: None,
                },
            ]
        );
    }

    #[test]
    fn test_dependencies_do_not_reorder() {
        // Build depends on a later phase; order stays as given.
        let estimates = vec![
            PhaseEstimate::new("Build", 3).depends_on("Design"),
            PhaseEstimate::new("Design", 2),
        ];
        let schedule = schedule("p", &estimates, date(2024, 6, 1));
        assert_eq!(schedule.phases[0].name, "Build");
        assert_eq!(schedule.phases[0].planned_start, date(2024, 6, 1));
        assert_eq!(schedule.phases[1].planned_start, date(2024, 6, 4));
        assert!(schedule.warnings.is_empty());
    }

    #[test]
    fn test_unknown_dependency_is_kept_and_reported() {
        let estimates = vec![PhaseEstimate::new("Roof", 3).depends_on("Walls")];
        let schedule = schedule("p", &estimates, date(2024, 6, 1));
        assert_eq!(schedule.phases[0].dependencies, vec!["Walls".to_string()]);
        assert!(matches!(
            &schedule.warnings[0],
            ScheduleWarning::UnknownDependency { dependency, .. } if dependency == "Walls"
        ));
    }

    #[test]
    fn test_phase_ids_are_stable_and_unique() {
        let estimates = vec![PhaseEstimate::new("Same", 1), PhaseEstimate::new("Same", 1)];
        let a = schedule("p", &estimates, date(2024, 6, 1));
        let b = schedule("p", &estimates, date(2025, 1, 1));
        assert_ne!(a.phases[0].id, a.phases[1].id);
        assert_eq!(a.phases[0].id, b.phases[0].id);
        assert_ne!(a.phases[0].id, schedule("q", &estimates, date(2024, 6, 1)).phases[0].id);
    }

    #[test]
    fn test_empty_estimate() {
        let schedule = schedule("p", &[], date(2024, 6, 1));
        assert!(schedule.phases.is_empty());
        assert_eq!(schedule.span(), None);
    }

    #[test]
    fn test_huge_duration_is_capped_and_order_kept() {
        let estimates = vec![
            PhaseEstimate::new("Forever", 1_000_000_000),
            PhaseEstimate::new("After", 5),
        ];
        let result = schedule("p1", &estimates, date(2024, 6, 1));

        let forever = &result.phases[0];
        let after = &result.phases[1];
        assert_eq!(forever.duration_days, MAX_PHASE_DAYS);
        assert_eq!(
            days_between(forever.planned_start, forever.planned_end) + 1,
            i64::from(MAX_PHASE_DAYS)
        );
        assert_eq!(after.planned_start, add_days(forever.planned_end, 1));
        assert_eq!(days_between(after.planned_start, after.planned_end), 4);
        assert_eq!(
            result.warnings,
            vec![ScheduleWarning::DurationCapped {
                project_id: "p1".to_string(),
                phase: "Forever".to_string(),
                raw: 1_000_000_000,
                capped: MAX_PHASE_DAYS,
            }]
        );
    }
}
