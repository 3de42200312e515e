//! The persisted schedule row and the save-time reconcile decision.
//!
//! Each worker has at most one schedule row, keyed by worker id. On every
//! worker save the row is reconciled against the starter block: removed
//! when the trigger is no longer a valid schedule, upserted otherwise.
//! Upserting always resets `failed_count` and re-activates the row, so a
//! schedule the external runner auto-disabled comes back whenever the
//! user edits it.

use crate::config::{
    ScheduleValues, generate_cron_expression, has_valid_schedule_config, is_schedule_trigger,
    schedule_type_of,
};
use crate::cron::calculate_next_run_time;
use crate::error::ScheduleError;
use chrono::{DateTime, Utc};
use nusoma_core::{ScheduleId, WorkerId};
use nusoma_graph::Block;
use serde::{Deserialize, Serialize};

/// Status of a persisted schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// The schedule is live and will be picked up by the cron runner.
    Active,
    /// Disabled by the external runner after repeated failures.
    Disabled,
}

impl ScheduleStatus {
    /// The persisted string form of this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            _ => Err(()),
        }
    }
}

/// A worker's schedule row. At most one per worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Row identifier.
    pub id: ScheduleId,
    /// The worker this schedule runs.
    pub worker_id: WorkerId,
    /// Canonical cron expression.
    pub cron_expression: String,
    /// Always "schedule"; kept for the trigger-type column.
    pub trigger_type: String,
    /// Next time the cron runner should fire this schedule.
    pub next_run_at: DateTime<Utc>,
    /// IANA timezone the expression is evaluated in.
    pub timezone: String,
    /// Live/disabled status.
    pub status: ScheduleStatus,
    /// Consecutive failures recorded by the external runner.
    pub failed_count: i32,
}

/// The reconcile decision for a worker's schedule row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleChange {
    /// Insert or update the schedule row (keyed by worker id).
    Upsert(Schedule),
    /// Delete any existing schedule row. Idempotent if none exists.
    Remove,
}

/// Plans the schedule change for a worker save.
///
/// If the starter block's effective trigger is not "schedule", or the
/// schedule config is incomplete, the row is removed. Otherwise a fresh
/// row is produced with `failed_count = 0` and `status = active` — a user
/// edit always re-enables a schedule the runner had disabled.
///
/// # Errors
///
/// Returns an error only when a valid-looking config fails cron or
/// timezone evaluation (e.g., an unparseable custom expression).
pub fn plan_schedule_change(
    worker_id: WorkerId,
    starter: Option<&Block>,
    now: DateTime<Utc>,
) -> Result<ScheduleChange, ScheduleError> {
    let Some(block) = starter else {
        return Ok(ScheduleChange::Remove);
    };

    if !is_schedule_trigger(block) {
        return Ok(ScheduleChange::Remove);
    }

    let Some(schedule_type) = schedule_type_of(block) else {
        return Ok(ScheduleChange::Remove);
    };

    let values = ScheduleValues::from_starter_block(block);
    if !has_valid_schedule_config(schedule_type, &values) {
        return Ok(ScheduleChange::Remove);
    }

    let cron_expression = generate_cron_expression(schedule_type, &values)?;
    let next_run_at = calculate_next_run_time(schedule_type, &values, now)?;
    let timezone = values.timezone.unwrap_or_else(|| "UTC".to_string());

    Ok(ScheduleChange::Upsert(Schedule {
        id: ScheduleId::new(),
        worker_id,
        cron_expression,
        trigger_type: "schedule".to_string(),
        next_run_at,
        timezone,
        status: ScheduleStatus::Active,
        failed_count: 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nusoma_graph::SubBlock;
    use serde_json::json;

    fn schedule_starter() -> Block {
        Block::new("start", "starter", "Start")
            .with_sub_block(SubBlock::new("startWorkflow", "dropdown", json!("schedule")))
            .with_sub_block(SubBlock::new("scheduleType", "dropdown", json!("daily")))
            .with_sub_block(SubBlock::new("dailyTime", "time-input", json!(["09", "30"])))
            .with_sub_block(SubBlock::new("timezone", "dropdown", json!("UTC")))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn valid_schedule_plans_upsert() {
        let worker_id = WorkerId::new();
        let change = plan_schedule_change(worker_id, Some(&schedule_starter()), now()).unwrap();

        let ScheduleChange::Upsert(schedule) = change else {
            panic!("expected upsert");
        };
        assert_eq!(schedule.worker_id, worker_id);
        assert_eq!(schedule.cron_expression, "30 9 * * *");
        assert_eq!(
            schedule.next_run_at,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
        );
        assert_eq!(schedule.status, ScheduleStatus::Active);
        assert_eq!(schedule.failed_count, 0);
    }

    #[test]
    fn manual_trigger_plans_remove() {
        let mut block = schedule_starter();
        block
            .sub_blocks
            .insert(
                "startWorkflow".to_string(),
                SubBlock::new("startWorkflow", "dropdown", json!("manual")),
            );

        let change = plan_schedule_change(WorkerId::new(), Some(&block), now()).unwrap();
        assert_eq!(change, ScheduleChange::Remove);
    }

    #[test]
    fn missing_starter_plans_remove() {
        let change = plan_schedule_change(WorkerId::new(), None, now()).unwrap();
        assert_eq!(change, ScheduleChange::Remove);
    }

    #[test]
    fn incomplete_config_plans_remove() {
        let block = Block::new("start", "starter", "Start")
            .with_sub_block(SubBlock::new("startWorkflow", "dropdown", json!("schedule")))
            .with_sub_block(SubBlock::new("scheduleType", "dropdown", json!("custom")))
            .with_sub_block(SubBlock::new("cronExpression", "short-input", json!("")));

        let change = plan_schedule_change(WorkerId::new(), Some(&block), now()).unwrap();
        assert_eq!(change, ScheduleChange::Remove);
    }

    #[test]
    fn upsert_always_resets_failure_state() {
        // Whatever the runner did to the previous row, an edit produces a
        // fresh active row with zero failures.
        let change =
            plan_schedule_change(WorkerId::new(), Some(&schedule_starter()), now()).unwrap();
        let ScheduleChange::Upsert(schedule) = change else {
            panic!("expected upsert");
        };
        assert_eq!(schedule.failed_count, 0);
        assert_eq!(schedule.status, ScheduleStatus::Active);
    }

    #[test]
    fn malformed_custom_expression_errors() {
        let block = Block::new("start", "starter", "Start")
            .with_sub_block(SubBlock::new("startWorkflow", "dropdown", json!("schedule")))
            .with_sub_block(SubBlock::new("scheduleType", "dropdown", json!("custom")))
            .with_sub_block(SubBlock::new(
                "cronExpression",
                "short-input",
                json!("not a cron"),
            ));

        let result = plan_schedule_change(WorkerId::new(), Some(&block), now());
        assert!(matches!(
            result,
            Err(ScheduleError::InvalidCronExpression { .. })
        ));
    }
}
