use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a phase sits in its lifecycle. Derived from the phase fields, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    /// Planned dates only.
    Scheduled,
    /// Work has started (actual start recorded or partial progress).
    InProgress,
    /// Both actual dates recorded; progress is 100.
    Completed,
}

impl PhaseStatus {
    pub fn label(self) -> &'static str {
        match self {
            PhaseStatus::Scheduled => "Scheduled",
            PhaseStatus::InProgress => "In Progress",
            PhaseStatus::Completed => "Completed",
        }
    }
}

/// One scheduled unit of project work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: Uuid,
    pub project_id: String,
    pub name: String,
    /// Always at least 1.
    pub duration_days: u32,
    pub planned_start: NaiveDate,
    pub planned_end: NaiveDate,
    #[serde(default)]
    pub actual_start: Option<NaiveDate>,
    #[serde(default)]
    pub actual_end: Option<NaiveDate>,
    /// Names or ids of other phases. Display-only; scheduling ignores them.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 0 to 100.
    #[serde(default)]
    pub progress_percentage: u8,
    #[serde(default)]
    pub is_critical_path: bool,
}

impl Phase {
    pub fn status(&self) -> PhaseStatus {
        if self.actual_start.is_some() && self.actual_end.is_some() {
            PhaseStatus::Completed
        } else if self.actual_start.is_some()
            || self.actual_end.is_some()
            || (self.progress_percentage > 0 && self.progress_percentage < 100)
        {
            PhaseStatus::InProgress
        } else {
            PhaseStatus::Scheduled
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status() == PhaseStatus::Completed
    }

    /// Milestones are recognised by name.
    pub fn is_milestone(&self) -> bool {
        self.name.to_lowercase().contains("milestone")
    }

    /// The recorded execution range, when both ends are known.
    pub fn actual_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.actual_start, self.actual_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Every date this phase carries, planned first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        [
            Some(self.planned_start),
            Some(self.planned_end),
            self.actual_start,
            self.actual_end,
        ]
        .into_iter()
        .flatten()
    }
}

/// A duration estimate for one phase, as supplied by the estimation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEstimate {
    #[serde(alias = "name")]
    pub phase_name: String,
    /// `None` when the source gave nothing usable.
    #[serde(default, with = "lenient_days")]
    pub duration_days: Option<i64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub is_critical_path: bool,
}

impl PhaseEstimate {
    pub fn new(phase_name: impl Into<String>, duration_days: i64) -> Self {
        Self {
            phase_name: phase_name.into(),
            duration_days: Some(duration_days),
            dependencies: Vec::new(),
            is_critical_path: false,
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// The duration the scheduler will use: anything missing or below 1 becomes 1.
    pub fn effective_days(&self) -> u32 {
        match self.duration_days {
            Some(days) if days >= 1 => u32::try_from(days).unwrap_or(u32::MAX),
            _ => 1,
        }
    }

    pub fn needs_coercion(&self) -> bool {
        !matches!(self.duration_days, Some(days) if days >= 1)
    }
}

/// Serde helper accepting numbers, numeric strings, or garbage for a day count.
mod lenient_days {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(days: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        days.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(name: &str) -> Phase {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        Phase {
            id: Uuid::nil(),
            project_id: "p1".to_string(),
            name: name.to_string(),
            duration_days: 1,
            planned_start: day,
            planned_end: day,
            actual_start: None,
            actual_end: None,
            dependencies: Vec::new(),
            progress_percentage: 0,
            is_critical_path: false,
        }
    }

    #[test]
    fn test_status_follows_actual_dates() {
        let mut p = phase("Foundation");
        assert_eq!(p.status(), PhaseStatus::Scheduled);

        p.progress_percentage = 40;
        assert_eq!(p.status(), PhaseStatus::InProgress);

        p.progress_percentage = 0;
        p.actual_start = NaiveDate::from_ymd_opt(2024, 6, 2);
        assert_eq!(p.status(), PhaseStatus::InProgress);

        p.actual_end = NaiveDate::from_ymd_opt(2024, 6, 4);
        assert_eq!(p.status(), PhaseStatus::Completed);
    }

    #[test]
    fn test_milestone_matches_name_substring() {
        assert!(phase("Handover Milestone").is_milestone());
        assert!(phase("milestone: roof").is_milestone());
        assert!(!phase("Roofing").is_milestone());
    }

    #[test]
    fn test_estimate_parses_lenient_durations() {
        let json = r#"[
            {"phaseName": "A", "durationDays": 5},
            {"phaseName": "B", "durationDays": "7"},
            {"phaseName": "C", "durationDays": "soon"},
            {"phaseName": "D"},
            {"phaseName": "E", "durationDays": 2.9, "dependencies": ["A"]}
        ]"#;
        let estimates: Vec<PhaseEstimate> = serde_json::from_str(json).unwrap();

        let days: Vec<Option<i64>> = estimates.iter().map(|e| e.duration_days).collect();
        assert_eq!(days, vec![Some(5), Some(7), None, None, Some(2)]);
        assert_eq!(estimates[4].dependencies, vec!["A".to_string()]);
    }

    #[test]
    fn test_effective_days_coerces_invalid_values() {
        assert_eq!(PhaseEstimate::new("A", 4).effective_days(), 4);
        assert_eq!(PhaseEstimate::new("A", 0).effective_days(), 1);
        assert_eq!(PhaseEstimate::new("A", -3).effective_days(), 1);
        assert!(PhaseEstimate::new("A", -3).needs_coercion());
        assert!(!PhaseEstimate::new("A", 1).needs_coercion());
    }

    #[test]
    fn test_phase_defaults_optional_fields() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-000000000000",
            "project_id": "p1",
            "name": "Foundation",
            "duration_days": 5,
            "planned_start": "2024-06-01",
            "planned_end": "2024-06-05"
        }"#;
        let p: Phase = serde_json::from_str(json).unwrap();
        assert_eq!(p.actual_start, None);
        assert!(p.dependencies.is_empty());
        assert_eq!(p.progress_percentage, 0);
    }
}
