//! Worker rows: metadata plus deployment state. Graph content lives in
//! the normalized tables managed by [`super::GraphStore`].

use super::decode_error;
use chrono::{DateTime, Utc};
use nusoma_core::{UserId, WorkerId};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};

/// A worker as the API sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub user_id: UserId,
    pub name: String,
    pub color: String,
    pub variables: JsonValue,
    pub is_deployed: bool,
    pub deployed_at: Option<DateTime<Utc>>,
    /// State hash captured at the last deploy; the live hash is compared
    /// against this to decide whether a redeploy is needed.
    pub deployed_state_hash: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct WorkerRow {
    id: String,
    user_id: String,
    name: String,
    color: String,
    variables: JsonValue,
    is_deployed: bool,
    deployed_at: Option<DateTime<Utc>>,
    deployed_state_hash: Option<String>,
    last_synced: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkerRow {
    fn try_into_record(self) -> Result<WorkerRecord, sqlx::Error> {
        Ok(WorkerRecord {
            id: self.id.parse().map_err(decode_error)?,
            user_id: self.user_id.parse().map_err(decode_error)?,
            name: self.name,
            color: self.color,
            variables: self.variables,
            is_deployed: self.is_deployed,
            deployed_at: self.deployed_at,
            deployed_state_hash: self.deployed_state_hash,
            last_synced: self.last_synced,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// CRUD over the `workers` table.
#[derive(Clone)]
pub struct WorkerRepository {
    pool: PgPool,
}

impl WorkerRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, record: &WorkerRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO workers
                (id, user_id, name, color, variables, is_deployed,
                 deployed_at, deployed_state_hash, last_synced, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.user_id.to_string())
        .bind(&record.name)
        .bind(&record.color)
        .bind(&record.variables)
        .bind(record.is_deployed)
        .bind(record.deployed_at)
        .bind(&record.deployed_state_hash)
        .bind(record.last_synced)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, worker_id: WorkerId) -> Result<Option<WorkerRecord>, sqlx::Error> {
        let row: Option<WorkerRow> = sqlx::query_as("SELECT * FROM workers WHERE id = $1")
            .bind(worker_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkerRow::try_into_record).transpose()
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<WorkerRecord>, sqlx::Error> {
        let rows: Vec<WorkerRow> =
            sqlx::query_as("SELECT * FROM workers WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(WorkerRow::try_into_record).collect()
    }

    /// Updates name, color, and variables. `None` leaves a field as is.
    pub async fn update_meta(
        &self,
        worker_id: WorkerId,
        name: Option<&str>,
        color: Option<&str>,
        variables: Option<&JsonValue>,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE workers
            SET name = COALESCE($2, name),
                color = COALESCE($3, color),
                variables = COALESCE($4, variables),
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(worker_id.to_string())
        .bind(name)
        .bind(color)
        .bind(variables)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a deploy: flips the flag and pins the deployed state hash.
    pub async fn mark_deployed(
        &self,
        worker_id: WorkerId,
        state_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE workers
            SET is_deployed = TRUE,
                deployed_at = $2,
                deployed_state_hash = $3,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(worker_id.to_string())
        .bind(now)
        .bind(state_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes a worker. Graph rows, schedule, and execution logs cascade.
    pub async fn delete(&self, worker_id: WorkerId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workers WHERE id = $1")
            .bind(worker_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
