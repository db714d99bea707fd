use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::config::PersistenceConfig;
use crate::error::PersistenceError;
use crate::run::{Run, RunId};
use crate::store::{decode_run, encode_run, RunStore};

const SCHEMA: &str = include_str!("../../migrations/001_runward_runs.sql");

/// PostgreSQL-backed run store.
///
/// Each run is one row in `runward_runs`, holding the whole record as JSONB.
/// Writes are upserts with no version check, so the last writer wins. The
/// status is duplicated into its own column for operators' queries.
#[derive(Debug, Clone)]
pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool using the given persistence settings.
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.connection_string)
            .await
            .map_err(PersistenceError::backend)?;
        Ok(Self::new(pool))
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `runward_runs` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::backend)?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn get(&self, run_id: &RunId) -> Result<Option<Run>, PersistenceError> {
        let row = sqlx::query("SELECT record FROM runward_runs WHERE id = $1")
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::backend)?;

        match row {
            Some(row) => {
                let record: serde_json::Value =
                    row.try_get("record").map_err(PersistenceError::backend)?;
                decode_run(run_id, record).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, run: &Run) -> Result<(), PersistenceError> {
        let record = encode_run(run)?;

        sqlx::query(
            r#"
            INSERT INTO runward_runs (id, record, status, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE
            SET record = EXCLUDED.record,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(run.id.as_str())
        .bind(record)
        .bind(run.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::backend)?;

        debug!(run_id = %run.id, status = %run.status, "run record written");
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<RunId>, PersistenceError> {
        let rows = sqlx::query("SELECT id FROM runward_runs")
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::backend)?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("id")
                    .map(RunId::from)
                    .map_err(PersistenceError::backend)
            })
            .collect()
    }
}
