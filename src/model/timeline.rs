use std::str::FromStr;

use chrono::NaiveDate;

/// Granularity of the axis ticks under a Gantt chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineScale {
    Days,
    #[default]
    Weeks,
    Months,
}

impl FromStr for TimelineScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" | "d" => Ok(TimelineScale::Days),
            "week" | "weeks" | "w" => Ok(TimelineScale::Weeks),
            "month" | "months" | "m" => Ok(TimelineScale::Months),
            other => Err(format!("unknown timeline scale '{}'", other)),
        }
    }
}

/// Signed whole days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// `date` shifted by `days` (negative moves backwards), saturating at the
/// calendar limits.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    chrono::Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// The local calendar date.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Try parsing a date string with several common formats.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_between_is_signed() {
        assert_eq!(days_between(date(2024, 6, 1), date(2024, 6, 15)), 14);
        assert_eq!(days_between(date(2024, 6, 15), date(2024, 6, 1)), -14);
        assert_eq!(days_between(date(2024, 2, 28), date(2024, 3, 1)), 2);
    }

    #[test]
    fn test_add_days_crosses_months() {
        assert_eq!(add_days(date(2024, 6, 28), 5), date(2024, 7, 3));
        assert_eq!(add_days(date(2024, 7, 3), -5), date(2024, 6, 28));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-06-01"), Some(date(2024, 6, 1)));
        assert_eq!(parse_date(" 15/06/2024 "), Some(date(2024, 6, 15)));
        assert_eq!(parse_date("15.06.2024"), Some(date(2024, 6, 15)));
        assert_eq!(parse_date("next week"), None);
    }

    #[test]
    fn test_scale_from_str() {
        assert_eq!("Weeks".parse::<TimelineScale>(), Ok(TimelineScale::Weeks));
        assert_eq!("d".parse::<TimelineScale>(), Ok(TimelineScale::Days));
        assert!("fortnights".parse::<TimelineScale>().is_err());
    }
}
