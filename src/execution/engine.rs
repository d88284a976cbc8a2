//! Main execution engine - runs one release job from start to teardown

use crate::{
    core::{ExecutionStatus, Pipeline, SecretStore, StepContext, StepKind, StepState},
    execution::{
        executor::{ExecutionResult, StepExecutor},
        runner::{CommandRunner, OutputSink, OutputStream},
    },
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a run failed; every variant is terminal for the run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Checkout failed: {0}")]
    Checkout(String),

    #[error("Toolchain provisioning failed: {0}")]
    Toolchain(String),

    #[error("Tests failed: {0}")]
    Test(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Could not provision the job workspace: {0}")]
    Workspace(String),

    #[error("Job exceeded its timeout of {0:?}")]
    Timeout(Duration),
}

impl PipelineError {
    fn for_step(kind: StepKind, error: String) -> Self {
        match kind {
            StepKind::Checkout => PipelineError::Checkout(error),
            StepKind::Toolchain => PipelineError::Toolchain(error),
            StepKind::Test => PipelineError::Test(error),
            StepKind::Publish => PipelineError::Publish(error),
        }
    }
}

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        tag: String,
    },
    StepStarted {
        step_id: String,
        name: String,
        position: usize,
        total: usize,
    },
    StepOutput {
        step_id: String,
        stream: OutputStream,
        line: String,
    },
    StepCompleted {
        step_id: String,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    JobTornDown {
        execution_id: Uuid,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Forwards a step's output lines to the event handlers, redacted
struct EventSink<'a> {
    handlers: &'a [EventHandler],
    context: &'a StepContext,
}

impl OutputSink for EventSink<'_> {
    fn on_line(&self, stream: OutputStream, line: &str) {
        let event = ExecutionEvent::StepOutput {
            step_id: self.context.step_id.clone(),
            stream,
            line: self.context.redact(line),
        };
        for handler in self.handlers {
            handler(event.clone());
        }
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    executor: StepExecutor<R>,
    secrets: SecretStore,
    workspace_root: Option<PathBuf>,
    event_handlers: Vec<EventHandler>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    pub fn new(runner: R, secrets: SecretStore) -> Self {
        Self {
            executor: StepExecutor::new(runner),
            secrets,
            workspace_root: None,
            event_handlers: Vec::new(),
        }
    }

    /// Create job workspaces under `root` instead of the system temp dir
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn runner(&self) -> &R {
        self.executor.runner()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    fn create_workspace(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tagrelease-job-");
        match &self.workspace_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    /// Execute the job
    ///
    /// Steps run strictly in order and the first failure ends the run: the
    /// failing step is marked failed, every later step skipped, and the
    /// error returned. The workspace is removed whatever the outcome,
    /// including when this future is dropped mid-run.
    pub async fn execute(&self, pipeline: &mut Pipeline) -> Result<(), PipelineError> {
        let execution_id = pipeline.state.execution_id;
        let pipeline_name = pipeline.name.clone();

        info!(
            "Starting pipeline execution: {} for {} ({})",
            pipeline_name, pipeline.tag.name, execution_id
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline_name.clone(),
            tag: pipeline.tag.name.clone(),
        });

        pipeline.state.start(pipeline.steps.len());

        let workspace = match self.create_workspace() {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Failed to create workspace: {}", e);
                let error = PipelineError::Workspace(e.to_string());
                self.skip_remaining(pipeline, "job workspace could not be created");
                self.finish(pipeline, Err(&error));
                return Err(error);
            }
        };
        debug!("Job workspace: {}", workspace.path().display());

        let limit = pipeline.timeout;
        let outcome = tokio::time::timeout(limit, self.run_steps(pipeline, workspace.path())).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                error!("Pipeline {} exceeded its timeout of {:?}", pipeline_name, limit);
                let error = PipelineError::Timeout(limit);
                if let Some(index) = pipeline
                    .steps
                    .iter()
                    .position(|s| matches!(s.state, StepState::Running { .. }))
                {
                    self.mark_step_failed(pipeline, index, error.to_string());
                }
                self.skip_remaining(pipeline, "job timed out");
                Err(error)
            }
        };

        self.teardown(execution_id, workspace);
        self.finish(pipeline, result.as_ref().map(|_| ()));
        result
    }

    /// Run pending steps in order until one fails
    async fn run_steps(&self, pipeline: &mut Pipeline, workdir: &Path) -> Result<(), PipelineError> {
        let total = pipeline.steps.len();

        while let Some(index) = pipeline.next_step() {
            let step = pipeline.steps[index].clone();
            let context = pipeline.create_context_for_step(index, workdir, &self.secrets);

            pipeline.steps[index].state = StepState::Running {
                started_at: chrono::Utc::now(),
            };
            self.emit_event(ExecutionEvent::StepStarted {
                step_id: step.id.clone(),
                name: step.name.clone(),
                position: index + 1,
                total,
            });

            let sink = EventSink {
                handlers: &self.event_handlers,
                context: &context,
            };
            let result = self
                .executor
                .execute(&step, &context, Some(&sink as &dyn OutputSink))
                .await;

            match result {
                ExecutionResult::Success { output } => {
                    self.mark_step_success(pipeline, index, output);
                }
                ExecutionResult::Failed { error, .. } => {
                    self.mark_step_failed(pipeline, index, error.clone());
                    self.skip_remaining(pipeline, &format!("step '{}' failed", step.id));
                    return Err(PipelineError::for_step(step.kind, error));
                }
            }

            self.update_state_counts(pipeline);
        }

        Ok(())
    }

    /// Mark a step as completed successfully
    fn mark_step_success(&self, pipeline: &mut Pipeline, index: usize, output: String) {
        let step = &mut pipeline.steps[index];
        let started_at = match &step.state {
            StepState::Running { started_at } => *started_at,
            _ => chrono::Utc::now(),
        };
        step.state = StepState::Completed {
            output,
            started_at,
            completed_at: chrono::Utc::now(),
        };
        self.emit_event(ExecutionEvent::StepCompleted {
            step_id: step.id.clone(),
        });
    }

    /// Mark a step as failed; fails the whole pipeline
    fn mark_step_failed(&self, pipeline: &mut Pipeline, index: usize, error: String) {
        let step = &mut pipeline.steps[index];
        let started_at = match &step.state {
            StepState::Running { started_at } => *started_at,
            _ => chrono::Utc::now(),
        };
        step.state = StepState::Failed {
            error: error.clone(),
            started_at,
            failed_at: chrono::Utc::now(),
        };
        let step_id = step.id.clone();

        self.emit_event(ExecutionEvent::StepFailed { step_id, error });
        pipeline.state.fail();
    }

    /// Skip every step that has not run yet
    fn skip_remaining(&self, pipeline: &mut Pipeline, reason: &str) {
        for step in pipeline.steps.iter_mut().filter(|s| s.is_pending()) {
            step.state = StepState::Skipped {
                reason: reason.to_string(),
            };
            self.emit_event(ExecutionEvent::StepSkipped {
                step_id: step.id.clone(),
                reason: reason.to_string(),
            });
        }
        self.update_state_counts(pipeline);
    }

    fn teardown(&self, execution_id: Uuid, workspace: TempDir) {
        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
        } else {
            debug!("Removed workspace {}", path.display());
        }
        self.emit_event(ExecutionEvent::JobTornDown { execution_id });
    }

    fn finish(&self, pipeline: &mut Pipeline, result: Result<(), &PipelineError>) {
        let status = match result {
            Ok(()) => {
                pipeline.state.complete();
                ExecutionStatus::Completed
            }
            Err(e) => {
                error!("Pipeline {} failed: {}", pipeline.name, self.secrets.redact(&e.to_string()));
                pipeline.state.fail();
                ExecutionStatus::Failed
            }
        };
        self.update_state_counts(pipeline);

        info!(
            "Pipeline execution finished: {} - {:?}",
            pipeline.name, status
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: pipeline.state.execution_id,
            status,
        });
    }

    /// Update pipeline state counts
    fn update_state_counts(&self, pipeline: &mut Pipeline) {
        let mut completed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for step in &pipeline.steps {
            match &step.state {
                StepState::Completed { .. } => completed += 1,
                StepState::Failed { .. } => failed += 1,
                StepState::Skipped { .. } => skipped += 1,
                _ => {}
            }
        }

        pipeline.state.update_counts(completed, failed, skipped);
    }
}
