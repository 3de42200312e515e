//! 5-field cron expression parsing and next-occurrence search.
//!
//! Supports the subset the schedule generator emits plus what users
//! reasonably write by hand: `*`, `*/N`, single values, ranges `A-B`,
//! and comma-separated lists. Day-of-month and day-of-week follow the
//! standard cron rule: when both are restricted, a day matching either
//! fires.

use crate::config::{ScheduleType, ScheduleValues, generate_cron_expression};
use crate::error::ScheduleError;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Search horizon for the next occurrence: a full leap year of minutes.
const SEARCH_HORIZON_MINUTES: i64 = 366 * 24 * 60;

/// One field of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CronField {
    /// `*` — matches every value.
    Any,
    /// An explicit set of matching values.
    Values(Vec<u32>),
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Values(values) => values.contains(&value),
        }
    }

    fn is_restricted(&self) -> bool {
        matches!(self, Self::Values(_))
    }
}

/// A parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronExpression {
    /// Parses a 5-field cron expression (`MIN HOUR DOM MON DOW`).
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not have exactly five
    /// fields or a field cannot be parsed.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let invalid = |reason: String| ScheduleError::InvalidCronExpression {
            expression: expression.to_string(),
            reason,
        };

        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(format!("expected 5 fields, got {}", parts.len())));
        }

        Ok(Self {
            minute: parse_field(parts[0], 0, 59)
                .ok_or_else(|| invalid(format!("bad minute field '{}'", parts[0])))?,
            hour: parse_field(parts[1], 0, 23)
                .ok_or_else(|| invalid(format!("bad hour field '{}'", parts[1])))?,
            day_of_month: parse_field(parts[2], 1, 31)
                .ok_or_else(|| invalid(format!("bad day-of-month field '{}'", parts[2])))?,
            month: parse_field(parts[3], 1, 12)
                .ok_or_else(|| invalid(format!("bad month field '{}'", parts[3])))?,
            day_of_week: parse_field(parts[4], 0, 6)
                .ok_or_else(|| invalid(format!("bad day-of-week field '{}'", parts[4])))?,
        })
    }

    /// Returns true if the expression matches the given local time.
    fn matches<T: TimeZone>(&self, at: &DateTime<T>) -> bool {
        if !self.minute.matches(at.minute())
            || !self.hour.matches(at.hour())
            || !self.month.matches(at.month())
        {
            return false;
        }

        let dom_match = self.day_of_month.matches(at.day());
        let dow_match = self
            .day_of_week
            .matches(at.weekday().num_days_from_sunday());

        // Standard cron: both restricted means either may fire the day.
        match (
            self.day_of_month.is_restricted(),
            self.day_of_week.is_restricted(),
        ) {
            (true, true) => dom_match || dow_match,
            (true, false) => dom_match,
            (false, true) => dow_match,
            (false, false) => true,
        }
    }

    /// Finds the first occurrence strictly after the given time.
    ///
    /// The search walks minute by minute in the supplied timezone, so
    /// DST transitions are handled by chrono's timezone arithmetic.
    #[must_use]
    pub fn next_after<T: TimeZone>(&self, after: DateTime<T>) -> Option<DateTime<T>> {
        let mut candidate = (after + Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;

        for _ in 0..SEARCH_HORIZON_MINUTES {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate = candidate + Duration::minutes(1);
        }

        None
    }
}

/// Parses a cron field into a matcher over `min..=max`.
fn parse_field(field: &str, min: u32, max: u32) -> Option<CronField> {
    if field == "*" {
        return Some(CronField::Any);
    }

    // */N — every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some(CronField::Values(
            (min..=max).step_by(n as usize).collect(),
        ));
    }

    // Comma-separated list of single values or ranges.
    let mut values = Vec::new();
    for part in field.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.parse().ok()?;
            let end: u32 = end.parse().ok()?;
            if start > end || start < min || end > max {
                return None;
            }
            values.extend(start..=end);
        } else {
            let n: u32 = part.parse().ok()?;
            if n < min || n > max {
                return None;
            }
            values.push(n);
        }
    }

    if values.is_empty() {
        return None;
    }
    Some(CronField::Values(values))
}

/// Calculates the next run time for a schedule, strictly after `now`.
///
/// The configured timezone is applied before the occurrence search, so a
/// `daily 09:30` schedule in `America/New_York` fires at 09:30 New York
/// time regardless of the server clock.
///
/// # Errors
///
/// Returns an error if the schedule config is incomplete, the generated
/// or literal cron expression is invalid, the timezone is unknown, or no
/// occurrence exists within the search horizon.
pub fn calculate_next_run_time(
    schedule_type: ScheduleType,
    values: &ScheduleValues,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let expression = generate_cron_expression(schedule_type, values)?;
    let cron = CronExpression::parse(&expression)?;

    let timezone = values.timezone.as_deref().unwrap_or("UTC");
    let tz: Tz = timezone
        .parse()
        .map_err(|_| ScheduleError::InvalidTimezone {
            timezone: timezone.to_string(),
        })?;

    let next_local = cron
        .next_after(now.with_timezone(&tz))
        .ok_or(ScheduleError::NoUpcomingOccurrence {
            expression: expression.clone(),
        })?;

    Ok(next_local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeFields;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        assert!(CronExpression::parse("0 9 * *").is_err());
        assert!(CronExpression::parse("not a cron at all").is_err());
    }

    #[test]
    fn parse_accepts_ranges_and_lists() {
        let expr = CronExpression::parse("0,30 9-11 * * 1,3,5").unwrap();
        let monday_nine_thirty = utc(2024, 1, 1, 9, 29, 0);
        let next = expr.next_after(monday_nine_thirty).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 9, 30, 0));
    }

    #[test]
    fn next_after_daily() {
        let expr = CronExpression::parse("30 9 * * *").unwrap();
        // Already past 09:30 today, so tomorrow.
        let next = expr.next_after(utc(2024, 1, 1, 10, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 2, 9, 30, 0));
    }

    #[test]
    fn next_after_every_15_minutes() {
        let expr = CronExpression::parse("*/15 * * * *").unwrap();
        let next = expr.next_after(utc(2024, 1, 1, 10, 2, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 10, 15, 0));
    }

    #[test]
    fn next_after_is_strictly_after() {
        let expr = CronExpression::parse("0 * * * *").unwrap();
        // Exactly on an occurrence: next must be the following hour.
        let next = expr.next_after(utc(2024, 1, 1, 10, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 11, 0, 0));
    }

    #[test]
    fn day_of_week_matching() {
        // 2024-01-01 is a Monday; DOW 3 is Wednesday.
        let expr = CronExpression::parse("0 12 * * 3").unwrap();
        let next = expr.next_after(utc(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 3, 12, 0, 0));
    }

    #[test]
    fn day_of_month_matching() {
        let expr = CronExpression::parse("0 6 15 * *").unwrap();
        let next = expr.next_after(utc(2024, 1, 20, 0, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 2, 15, 6, 0, 0));
    }

    fn daily_nine_thirty(timezone: Option<&str>) -> ScheduleValues {
        ScheduleValues {
            daily_time: TimeFields {
                hour: Some(9),
                minute: Some(30),
            },
            timezone: timezone.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn next_run_daily_utc() {
        let values = daily_nine_thirty(Some("UTC"));
        let next = calculate_next_run_time(
            ScheduleType::Daily,
            &values,
            utc(2024, 1, 1, 10, 0, 0),
        )
        .unwrap();
        assert_eq!(next, utc(2024, 1, 2, 9, 30, 0));
    }

    #[test]
    fn next_run_applies_timezone() {
        // 09:30 New York (EST, UTC-5) is 14:30 UTC. At 10:00 UTC it is
        // still 05:00 in New York, so today's occurrence is upcoming.
        let values = daily_nine_thirty(Some("America/New_York"));
        let next = calculate_next_run_time(
            ScheduleType::Daily,
            &values,
            utc(2024, 1, 1, 10, 0, 0),
        )
        .unwrap();
        assert_eq!(next, utc(2024, 1, 1, 14, 30, 0));
    }

    #[test]
    fn next_run_is_always_after_now() {
        let values = ScheduleValues {
            minutes_interval: Some(1),
            ..Default::default()
        };
        let now = utc(2024, 6, 15, 23, 59, 59);
        let next =
            calculate_next_run_time(ScheduleType::Minutes, &values, now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn next_run_rejects_unknown_timezone() {
        let values = daily_nine_thirty(Some("Mars/Olympus_Mons"));
        let result =
            calculate_next_run_time(ScheduleType::Daily, &values, utc(2024, 1, 1, 0, 0, 0));
        assert!(matches!(result, Err(ScheduleError::InvalidTimezone { .. })));
    }

    #[test]
    fn next_run_custom_literal() {
        let values = ScheduleValues {
            cron_expression: Some("0 7 * * *".to_string()),
            ..Default::default()
        };
        let next = calculate_next_run_time(
            ScheduleType::Custom,
            &values,
            utc(2024, 1, 1, 8, 0, 0),
        )
        .unwrap();
        assert_eq!(next, utc(2024, 1, 2, 7, 0, 0));
    }
}
