//! The `worker_schedule` table: one row per scheduled worker.

use super::decode_error;
use chrono::{DateTime, Utc};
use nusoma_core::WorkerId;
use nusoma_scheduler::{Schedule, ScheduleChange, ScheduleStatus};
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct ScheduleRow {
    id: String,
    worker_id: String,
    cron_expression: String,
    trigger_type: String,
    next_run_at: DateTime<Utc>,
    timezone: String,
    status: String,
    failed_count: i32,
}

impl ScheduleRow {
    fn try_into_record(self) -> Result<Schedule, sqlx::Error> {
        let status = self.status.parse().unwrap_or_else(|()| {
            tracing::warn!(status = %self.status, "unknown schedule status, treating as active");
            ScheduleStatus::Active
        });
        Ok(Schedule {
            id: self.id.parse().map_err(decode_error)?,
            worker_id: self.worker_id.parse().map_err(decode_error)?,
            cron_expression: self.cron_expression,
            trigger_type: self.trigger_type,
            next_run_at: self.next_run_at,
            timezone: self.timezone,
            status,
            failed_count: self.failed_count,
        })
    }
}

/// Reads and reconciles schedule rows.
#[derive(Clone)]
pub struct ScheduleRepository {
    pool: PgPool,
}

impl ScheduleRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_for_worker(
        &self,
        worker_id: WorkerId,
    ) -> Result<Option<Schedule>, sqlx::Error> {
        let row: Option<ScheduleRow> =
            sqlx::query_as("SELECT * FROM worker_schedule WHERE worker_id = $1")
                .bind(worker_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(ScheduleRow::try_into_record).transpose()
    }

    /// Applies a reconcile decision.
    ///
    /// An upsert is keyed by worker id and always resets failure state;
    /// a remove is idempotent when no row exists.
    pub async fn apply_change(
        &self,
        worker_id: WorkerId,
        change: &ScheduleChange,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        match change {
            ScheduleChange::Remove => {
                sqlx::query("DELETE FROM worker_schedule WHERE worker_id = $1")
                    .bind(worker_id.to_string())
                    .execute(&self.pool)
                    .await?;
            }
            ScheduleChange::Upsert(schedule) => {
                sqlx::query(
                    r#"
                    INSERT INTO worker_schedule
                        (id, worker_id, cron_expression, trigger_type, next_run_at,
                         timezone, status, failed_count, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (worker_id) DO UPDATE SET
                        cron_expression = EXCLUDED.cron_expression,
                        trigger_type = EXCLUDED.trigger_type,
                        next_run_at = EXCLUDED.next_run_at,
                        timezone = EXCLUDED.timezone,
                        status = EXCLUDED.status,
                        failed_count = EXCLUDED.failed_count,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(schedule.id.to_string())
                .bind(schedule.worker_id.to_string())
                .bind(&schedule.cron_expression)
                .bind(&schedule.trigger_type)
                .bind(schedule.next_run_at)
                .bind(&schedule.timezone)
                .bind(schedule.status.as_str())
                .bind(schedule.failed_count)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}
