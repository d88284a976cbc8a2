//! Release pipeline configuration from YAML

use crate::core::{step::StepKind, trigger::Trigger};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Job ceiling applied when the configuration sets none (six hours)
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 360;

/// Top-level release pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Which pushes start a job
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Job timeout ceiling in minutes
    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    /// Job-wide environment variables (never secrets)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Pipeline steps, in execution order
    pub steps: Vec<StepConfig>,
}

/// Tag filters of the push trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub tags: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            tags: vec!["v*.*.*".to_string()],
        }
    }
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// What the step does
    pub kind: StepKind,

    /// Unique step identifier (defaults to the kind)
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// Command line replacing the built-in one, split on whitespace
    #[serde(default)]
    pub run: Option<String>,

    /// Toolchain channel (toolchain steps only)
    #[serde(default)]
    pub channel: Option<String>,

    /// Make the toolchain the directory override (toolchain steps only)
    #[serde(default, rename = "override")]
    pub set_override: bool,

    /// Step environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Names of secrets bound into this step's environment
    #[serde(default)]
    pub secrets: Vec<String>,
}

impl StepConfig {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            id: None,
            name: None,
            run: None,
            channel: None,
            set_override: false,
            env: HashMap::new(),
            secrets: Vec::new(),
        }
    }

    pub fn step_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.kind.as_str().to_string())
    }

    /// Parsed `run` command line
    pub fn argv(&self) -> Option<Vec<String>> {
        self.run
            .as_ref()
            .map(|run| run.split_whitespace().map(str::to_string).collect())
    }
}

impl Default for PipelineConfig {
    /// The stock release workflow: nightly toolchain, verbose tests,
    /// publish authenticated by `CARGO_REGISTRY_TOKEN`
    fn default() -> Self {
        let toolchain = StepConfig {
            channel: Some("nightly".to_string()),
            set_override: true,
            ..StepConfig::new(StepKind::Toolchain)
        };
        let test = StepConfig {
            run: Some("cargo test --verbose".to_string()),
            ..StepConfig::new(StepKind::Test)
        };
        let publish = StepConfig {
            run: Some("cargo publish".to_string()),
            secrets: vec!["CARGO_REGISTRY_TOKEN".to_string()],
            ..StepConfig::new(StepKind::Publish)
        };

        Self {
            name: "Release".to_string(),
            trigger: TriggerConfig::default(),
            timeout_minutes: None,
            env: HashMap::new(),
            steps: vec![StepConfig::new(StepKind::Checkout), toolchain, test, publish],
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Load from a file when given, otherwise the stock workflow
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        Trigger::from_config(&self.trigger)?;

        let kinds: Vec<StepKind> = self.steps.iter().map(|s| s.kind).collect();
        if kinds != StepKind::SEQUENCE {
            anyhow::bail!(
                "Steps must be exactly checkout, toolchain, test, publish in that order (found: {})",
                kinds
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        if self.timeout_minutes == Some(0) {
            anyhow::bail!("timeout_minutes must be greater than zero");
        }
        if self.timeout_minutes().checked_mul(60).is_none() {
            anyhow::bail!("timeout_minutes {} is too large", self.timeout_minutes());
        }

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            let id = step.step_id();
            if !seen_ids.insert(id.clone()) {
                anyhow::bail!("Duplicate step ID: {}", id);
            }

            if step.kind != StepKind::Publish && !step.secrets.is_empty() {
                anyhow::bail!(
                    "Step '{}' declares secrets; only the publish step may receive secrets",
                    id
                );
            }

            if let Some(argv) = step.argv() {
                if argv.is_empty() {
                    anyhow::bail!("Step '{}' has an empty run command", id);
                }
            }

            if step.kind == StepKind::Toolchain {
                match step.channel.as_deref().map(str::trim) {
                    Some(channel) if !channel.is_empty() => {}
                    _ if step.run.is_some() => {}
                    _ => anyhow::bail!("Step '{}' needs a toolchain channel", id),
                }
            }
        }

        let secrets: HashSet<&String> = self.steps.iter().flat_map(|s| s.secrets.iter()).collect();
        let publish_has_secret = self
            .steps
            .iter()
            .any(|s| s.kind == StepKind::Publish && !s.secrets.is_empty());
        if !publish_has_secret {
            anyhow::bail!("The publish step must declare its registry token secret");
        }

        for secret in &secrets {
            if secret.trim().is_empty() {
                anyhow::bail!("Secret names must not be empty");
            }
            let shadowed = self.env.contains_key(*secret)
                || self.steps.iter().any(|s| s.env.contains_key(*secret));
            if shadowed {
                anyhow::bail!(
                    "Secret '{}' is also set as a plain environment variable",
                    secret
                );
            }
        }

        Ok(())
    }

    /// Job timeout ceiling in minutes
    pub fn timeout_minutes(&self) -> u64 {
        self.timeout_minutes.unwrap_or(DEFAULT_TIMEOUT_MINUTES)
    }

    /// Job timeout ceiling; saturates for configs that skipped validation
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes().saturating_mul(60))
    }

    /// Every secret name declared by any step
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

    pub fn trigger(&self) -> Result<Trigger> {
        Ok(Trigger::from_config(&self.trigger)?)
    }
}
