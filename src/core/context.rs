//! Step context - what a step sees of the job

use crate::core::{
    secret::{redact_all, Secret},
    trigger::ReleaseTag,
};
use std::collections::HashMap;
use std::path::PathBuf;

/// Execution context for one step
///
/// The environment holds only plain variables. Secrets travel separately
/// so they can be bound into the child process and redacted from its
/// output without ever entering logs or history.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Step being executed
    pub step_id: String,

    /// Tag that triggered the job
    pub tag: ReleaseTag,

    /// Repository to check out
    pub repository: String,

    /// Commit reported by the push event
    pub commit: Option<String>,

    /// Job workspace; every command runs here
    pub workdir: PathBuf,

    /// Plain environment variables (job, step and release metadata)
    pub env: HashMap<String, String>,

    /// Secrets bound into this step only
    pub secrets: Vec<(String, Secret)>,

    /// Inherited variables to strip from the child environment
    pub env_remove: Vec<String>,

    /// Secrets this step declares that the store could not provide
    pub missing_secrets: Vec<String>,
}

impl StepContext {
    /// Full child environment, secrets included
    pub fn process_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        for (name, secret) in &self.secrets {
            env.insert(name.clone(), secret.expose().to_string());
        }
        env
    }

    /// Redact this step's secret values from `text`
    pub fn redact(&self, text: &str) -> String {
        redact_all(text, self.secrets.iter().map(|(_, secret)| secret))
    }
}
