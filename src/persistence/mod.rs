//! Persistence layer for release run history
//!
//! Only run metadata is kept. Nothing here is read back into a job, so
//! each run starts from a fresh workspace.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::Pipeline;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a release run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Triggering tag
    pub tag: String,

    /// Version the run was publishing
    pub version: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// Step that ended the run, if any
    pub failed_step: Option<String>,

    /// Whether the publish step succeeded
    pub published: bool,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List runs of a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
    by_pipeline: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        let is_new = execs
            .insert(execution.execution_id, execution.clone())
            .is_none();

        if is_new {
            let mut by_pipeline = self.by_pipeline.write().await;
            by_pipeline
                .entry(execution.pipeline_name.clone())
                .or_default()
                .push(execution.execution_id);
        }

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        let mut result: Vec<ExecutionSummary> = by_pipeline
            .get(pipeline_name)
            .map(|ids| ids.iter().filter_map(|id| execs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let by_pipeline = self.by_pipeline.read().await;
        let mut names: Vec<String> = by_pipeline.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Create a summary from a pipeline
pub fn create_summary(pipeline: &Pipeline) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: pipeline.state.execution_id,
        pipeline_name: pipeline.name.clone(),
        tag: pipeline.tag.name.clone(),
        version: pipeline.tag.version.clone(),
        status: pipeline.state.status,
        failed_step: pipeline.failed_step().map(str::to_string),
        published: pipeline.published(),
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        completed_steps: pipeline.state.completed_steps,
        total_steps: pipeline.state.total_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{config::PipelineConfig, PushEvent};

    fn summary(name: &str, tag: &str) -> ExecutionSummary {
        let event = PushEvent::new(format!("refs/tags/{}", tag), "repo");
        let mut config = PipelineConfig::default();
        config.name = name.to_string();
        let mut pipeline = Pipeline::for_push(&config, &event).unwrap().unwrap();
        pipeline.state.start(4);
        pipeline.state.fail();
        create_summary(&pipeline)
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryPersistence::new();
        let run = summary("Release", "v1.2.4");
        store.save_execution(&run).await.unwrap();

        let loaded = store.load_execution(run.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(loaded.version, "1.2.4");
        assert!(!loaded.published);
        assert_eq!(store.list_pipelines().await.unwrap(), vec!["Release"]);
    }

    #[tokio::test]
    async fn test_resave_does_not_duplicate() {
        let store = InMemoryPersistence::new();
        let mut run = summary("Release", "v1.0.0");
        store.save_execution(&run).await.unwrap();
        run.status = ExecutionStatus::Completed;
        store.save_execution(&run).await.unwrap();

        let runs = store.list_executions("Release").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ExecutionStatus::Completed);
    }
}
