//! SQLite-based run history store

use crate::core::ExecutionStatus;
use crate::persistence::{ExecutionSummary, PersistenceBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const SUMMARY_COLUMNS: &str = "id, pipeline_name, tag, version, status, failed_step, published, \
     started_at, completed_at, completed_steps, total_steps";

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        // An in-memory database lives and dies with its connection
        let pool = if db_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
        } else {
            SqlitePoolOptions::new()
                .connect(&format!("sqlite:{}?mode=rwc", db_path))
                .await
        }
        .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("tagrelease");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        let db_path = db_dir.join("runs.db");
        let db_path = db_path
            .to_str()
            .context("History database path is not valid UTF-8")?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                tag TEXT NOT NULL,
                version TEXT NOT NULL,
                status TEXT NOT NULL,
                failed_step TEXT,
                published INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                completed_steps INTEGER NOT NULL DEFAULT 0,
                total_steps INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn parse_status(status: &str) -> ExecutionStatus {
        match status {
            "Pending" => ExecutionStatus::Pending,
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            "Cancelled" => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Pending,
        }
    }

    fn summary_from_row(row: &SqliteRow) -> Result<ExecutionSummary> {
        Ok(ExecutionSummary {
            execution_id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            pipeline_name: row.try_get("pipeline_name")?,
            tag: row.try_get("tag")?,
            version: row.try_get("version")?,
            status: Self::parse_status(&row.try_get::<String, _>("status")?),
            failed_step: row.try_get("failed_step")?,
            published: row.try_get::<i64, _>("published")? != 0,
            started_at: Self::from_naive(row.try_get("started_at")?),
            completed_at: row
                .try_get::<Option<NaiveDateTime>, _>("completed_at")?
                .map(Self::from_naive),
            completed_steps: row.try_get::<i64, _>("completed_steps")? as usize,
            total_steps: row.try_get::<i64, _>("total_steps")? as usize,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, tag, version, status, failed_step, published,
             started_at, completed_at, completed_steps, total_steps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.pipeline_name)
        .bind(&execution.tag)
        .bind(&execution.version)
        .bind(format!("{:?}", execution.status))
        .bind(&execution.failed_step)
        .bind(execution.published as i64)
        .bind(Self::to_naive(execution.started_at))
        .bind(execution.completed_at.map(Self::to_naive))
        .bind(execution.completed_steps as i64)
        .bind(execution.total_steps as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?1", SUMMARY_COLUMNS))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::summary_from_row).transpose()
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs WHERE pipeline_name = ?1 ORDER BY started_at DESC",
            SUMMARY_COLUMNS
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT pipeline_name FROM runs ORDER BY pipeline_name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(tag: &str, status: ExecutionStatus, published: bool) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: Uuid::new_v4(),
            pipeline_name: "Release".to_string(),
            tag: tag.to_string(),
            version: tag.trim_start_matches('v').to_string(),
            status,
            failed_step: (!published).then(|| "test".to_string()),
            published,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            completed_steps: if published { 4 } else { 2 },
            total_steps: 4,
        }
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let store = SqliteExecutionStore::new(":memory:").await.unwrap();

        let run = summary("v1.2.3", ExecutionStatus::Completed, true);
        store.save_execution(&run).await.unwrap();

        let loaded = store.load_execution(run.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.pipeline_name, run.pipeline_name);
        assert_eq!(loaded.status, run.status);
        assert_eq!(loaded.version, "1.2.3");
        assert!(loaded.published);
        assert_eq!(loaded.failed_step, None);
    }

    #[tokio::test]
    async fn test_sqlite_lists_failed_runs() {
        let store = SqliteExecutionStore::new(":memory:").await.unwrap();
        store
            .save_execution(&summary("v1.2.4", ExecutionStatus::Failed, false))
            .await
            .unwrap();

        let runs = store.list_executions("Release").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].failed_step.as_deref(), Some("test"));
        assert!(!runs[0].published);
        assert_eq!(store.list_pipelines().await.unwrap(), vec!["Release"]);
    }
}
