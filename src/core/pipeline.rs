//! Pipeline domain model - one release job

use crate::core::{
    config::PipelineConfig,
    context::StepContext,
    secret::SecretStore,
    state::{ExecutionStatus, PipelineState, StepState},
    step::Step,
    trigger::{PushEvent, ReleaseTag},
};
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A release job instantiated for one matching push
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Tag that triggered this job
    pub tag: ReleaseTag,

    /// Repository identity from the push event
    pub repository: String,

    /// Commit from the push event
    pub commit: Option<String>,

    /// Job-wide environment variables
    pub variables: HashMap<String, String>,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Job timeout ceiling
    pub timeout: Duration,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Instantiate the job for a push, or `None` when the trigger does not match
    pub fn for_push(config: &PipelineConfig, event: &PushEvent) -> Result<Option<Self>> {
        let trigger = config.trigger()?;
        Ok(trigger
            .evaluate(event)
            .map(|tag| Self::from_config(config, tag, event)))
    }

    /// Create a pipeline from configuration for an already-matched tag
    pub fn from_config(config: &PipelineConfig, tag: ReleaseTag, event: &PushEvent) -> Self {
        Pipeline {
            name: config.name.clone(),
            tag,
            repository: event.repository.clone(),
            commit: event.commit.clone(),
            variables: config.env.clone(),
            steps: config.steps.iter().map(Step::from_config).collect(),
            timeout: config.timeout(),
            state: PipelineState::new(),
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Index of the next step to run
    pub fn next_step(&self) -> Option<usize> {
        if self.has_failed() {
            return None;
        }
        self.steps.iter().position(Step::is_pending)
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Check if pipeline has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Whether the publish step ran to completion
    pub fn published(&self) -> bool {
        self.steps.iter().any(|s| {
            s.kind == crate::core::step::StepKind::Publish
                && matches!(s.state, StepState::Completed { .. })
        })
    }

    /// Id of the step that failed, if any
    pub fn failed_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| matches!(s.state, StepState::Failed { .. }))
            .map(|s| s.id.as_str())
    }

    /// Record an interrupted run
    ///
    /// The step that was running is failed with `reason`; steps that never
    /// started are skipped.
    pub fn cancel(&mut self, reason: &str) {
        let now = chrono::Utc::now();
        for step in &mut self.steps {
            step.state = match &step.state {
                StepState::Running { started_at } => StepState::Failed {
                    error: reason.to_string(),
                    started_at: *started_at,
                    failed_at: now,
                },
                StepState::Pending => StepState::Skipped {
                    reason: reason.to_string(),
                },
                _ => continue,
            };
        }

        let count = |f: fn(&StepState) -> bool| self.steps.iter().filter(|s| f(&s.state)).count();
        let completed = count(|s| matches!(s, StepState::Completed { .. }));
        let failed = count(|s| matches!(s, StepState::Failed { .. }));
        let skipped = count(|s| matches!(s, StepState::Skipped { .. }));
        self.state.update_counts(completed, failed, skipped);
        self.state.cancel();
    }

    /// Every secret name declared anywhere in the job
    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .steps
            .iter()
            .flat_map(|s| s.secrets.iter().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Release metadata exported to every step
    fn release_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("RELEASE_TAG".to_string(), self.tag.name.clone());
        env.insert("RELEASE_VERSION".to_string(), self.tag.version.clone());
        env.insert("RELEASE_REPOSITORY".to_string(), self.repository.clone());
        if let Some(commit) = &self.commit {
            env.insert("RELEASE_COMMIT".to_string(), commit.clone());
        }
        env
    }

    /// Create execution context for the step at `index`
    ///
    /// Only the secrets that step declares are bound; every declared
    /// secret name is stripped from what the child inherits.
    pub fn create_context_for_step(
        &self,
        index: usize,
        workdir: &Path,
        secrets: &SecretStore,
    ) -> StepContext {
        let step = &self.steps[index];

        let mut env = self.variables.clone();
        env.extend(step.env.clone());
        env.extend(self.release_env());

        let mut bound = Vec::new();
        let mut missing = Vec::new();
        for name in &step.secrets {
            match secrets.get(name) {
                Some(secret) => bound.push((name.clone(), secret.clone())),
                None => missing.push(name.clone()),
            }
        }

        StepContext {
            step_id: step.id.clone(),
            tag: self.tag.clone(),
            repository: self.repository.clone(),
            commit: self.commit.clone(),
            workdir: workdir.to_path_buf(),
            env,
            secrets: bound,
            env_remove: self.secret_names(),
            missing_secrets: missing,
        }
    }
}
