//! Schedule configuration extracted from a worker's starter block.
//!
//! The starter block stores schedule settings as sub-block fields
//! (`scheduleType`, `dailyTime`, `timezone`, ...). This module turns those
//! loosely-typed fields into structured values, validates them per schedule
//! type, and generates the canonical cron expression.

use crate::error::ScheduleError;
use nusoma_graph::Block;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// The kind of schedule a starter block is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    /// Every N minutes.
    Minutes,
    /// Once per hour at a fixed minute.
    Hourly,
    /// Once per day at a fixed time.
    Daily,
    /// Once per week on a fixed day and time.
    Weekly,
    /// Once per month on a fixed day and time.
    Monthly,
    /// A literal cron expression supplied by the user.
    Custom,
}

impl FromStr for ScheduleType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minutes" => Ok(Self::Minutes),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "custom" => Ok(Self::Custom),
            _ => Err(()),
        }
    }
}

impl ScheduleType {
    /// The persisted string form of this schedule type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Custom => "custom",
        }
    }
}

/// An hour/minute pair where either side may be unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeFields {
    /// Hour of day (0-23).
    pub hour: Option<u32>,
    /// Minute of hour (0-59).
    pub minute: Option<u32>,
}

impl TimeFields {
    /// Returns true if at least one side is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.hour.is_some() || self.minute.is_some()
    }
}

/// Structured schedule values read from a starter block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleValues {
    /// Interval for the `minutes` type.
    pub minutes_interval: Option<u32>,
    /// Minute-of-hour for the `hourly` type.
    pub hourly_minute: Option<u32>,
    /// Time of day for the `daily` type.
    pub daily_time: TimeFields,
    /// Day of week (0 = Sunday) for the `weekly` type.
    pub weekly_day: Option<u32>,
    /// Time of day for the `weekly` type.
    pub weekly_time: TimeFields,
    /// Day of month (1-31) for the `monthly` type.
    pub monthly_day: Option<u32>,
    /// Time of day for the `monthly` type.
    pub monthly_time: TimeFields,
    /// Literal cron expression for the `custom` type.
    pub cron_expression: Option<String>,
    /// IANA timezone name; UTC when unset.
    pub timezone: Option<String>,
}

impl ScheduleValues {
    /// Reads schedule values from a starter block's sub-block fields.
    #[must_use]
    pub fn from_starter_block(block: &Block) -> Self {
        Self {
            minutes_interval: parse_u32(block.sub_block_value("minutesInterval")),
            hourly_minute: parse_u32(block.sub_block_value("hourlyMinute")),
            daily_time: parse_time(block.sub_block_value("dailyTime")),
            weekly_day: block
                .sub_block_str("weeklyDay")
                .and_then(parse_weekday),
            weekly_time: parse_time(block.sub_block_value("weeklyDayTime")),
            monthly_day: parse_u32(block.sub_block_value("monthlyDay")),
            monthly_time: parse_time(block.sub_block_value("monthlyTime")),
            cron_expression: block
                .sub_block_str("cronExpression")
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            timezone: block
                .sub_block_str("timezone")
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
        }
    }
}

/// Reads the schedule type from a starter block, if one is configured.
#[must_use]
pub fn schedule_type_of(block: &Block) -> Option<ScheduleType> {
    block
        .sub_block_str("scheduleType")
        .and_then(|s| ScheduleType::from_str(s).ok())
}

/// Returns true if the starter block's effective trigger is "schedule".
#[must_use]
pub fn is_schedule_trigger(block: &Block) -> bool {
    block.sub_block_str("startWorkflow") == Some("schedule")
}

/// Checks whether the schedule values are complete enough to schedule.
///
/// Per schedule type, at least one concrete time field must be present:
/// an interval for `minutes`, a minute-of-hour for `hourly`, an hour or
/// minute for `daily`, a day plus a time field for `weekly`/`monthly`,
/// and a non-empty literal expression for `custom`.
#[must_use]
pub fn has_valid_schedule_config(schedule_type: ScheduleType, values: &ScheduleValues) -> bool {
    match schedule_type {
        ScheduleType::Minutes => values.minutes_interval.is_some(),
        ScheduleType::Hourly => values.hourly_minute.is_some(),
        ScheduleType::Daily => values.daily_time.is_set(),
        ScheduleType::Weekly => values.weekly_day.is_some() && values.weekly_time.is_set(),
        ScheduleType::Monthly => values.monthly_day.is_some() && values.monthly_time.is_set(),
        ScheduleType::Custom => values
            .cron_expression
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty()),
    }
}

/// Default hour of day when only a minute is configured.
const DEFAULT_HOUR: u32 = 9;

/// Generates the canonical 5-field cron expression for a schedule.
///
/// Pure and deterministic: identical inputs always produce identical
/// output. `custom` passes the literal expression through unchanged.
///
/// # Errors
///
/// Returns an error if a field the schedule type requires is missing.
pub fn generate_cron_expression(
    schedule_type: ScheduleType,
    values: &ScheduleValues,
) -> Result<String, ScheduleError> {
    let missing = |field| ScheduleError::MissingField {
        schedule_type: schedule_type.as_str().to_string(),
        field,
    };

    match schedule_type {
        ScheduleType::Minutes => {
            let interval = values.minutes_interval.ok_or(missing("minutesInterval"))?;
            Ok(format!("*/{interval} * * * *"))
        }
        ScheduleType::Hourly => {
            let minute = values.hourly_minute.ok_or(missing("hourlyMinute"))?;
            Ok(format!("{minute} * * * *"))
        }
        ScheduleType::Daily => {
            if !values.daily_time.is_set() {
                return Err(missing("dailyTime"));
            }
            let hour = values.daily_time.hour.unwrap_or(DEFAULT_HOUR);
            let minute = values.daily_time.minute.unwrap_or(0);
            Ok(format!("{minute} {hour} * * *"))
        }
        ScheduleType::Weekly => {
            let day = values.weekly_day.ok_or(missing("weeklyDay"))?;
            if !values.weekly_time.is_set() {
                return Err(missing("weeklyDayTime"));
            }
            let hour = values.weekly_time.hour.unwrap_or(DEFAULT_HOUR);
            let minute = values.weekly_time.minute.unwrap_or(0);
            Ok(format!("{minute} {hour} * * {day}"))
        }
        ScheduleType::Monthly => {
            let day = values.monthly_day.ok_or(missing("monthlyDay"))?;
            if !values.monthly_time.is_set() {
                return Err(missing("monthlyTime"));
            }
            let hour = values.monthly_time.hour.unwrap_or(DEFAULT_HOUR);
            let minute = values.monthly_time.minute.unwrap_or(0);
            Ok(format!("{minute} {hour} {day} * *"))
        }
        ScheduleType::Custom => values
            .cron_expression
            .as_deref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(missing("cronExpression")),
    }
}

/// Parses a numeric field that may arrive as a JSON number or a string.
fn parse_u32(value: Option<&JsonValue>) -> Option<u32> {
    match value? {
        JsonValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a `["09", "30"]`-style time pair; empty strings stay unset.
fn parse_time(value: Option<&JsonValue>) -> TimeFields {
    let Some(JsonValue::Array(parts)) = value else {
        return TimeFields::default();
    };

    let component = |index: usize| -> Option<u32> {
        parts
            .get(index)
            .and_then(|v| match v {
                JsonValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                JsonValue::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
                _ => None,
            })
    };

    TimeFields {
        hour: component(0),
        minute: component(1),
    }
}

/// Maps a weekday name to the cron day-of-week number (0 = Sunday).
fn parse_weekday(name: &str) -> Option<u32> {
    match name.to_ascii_uppercase().get(..3)? {
        "SUN" => Some(0),
        "MON" => Some(1),
        "TUE" => Some(2),
        "WED" => Some(3),
        "THU" => Some(4),
        "FRI" => Some(5),
        "SAT" => Some(6),
        _ => None,
    }
}
