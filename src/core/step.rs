//! Step domain model

use crate::core::{config::StepConfig, context::StepContext, state::StepState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a step does; the job always runs these in `SEQUENCE` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Materialize the tagged commit in the workspace
    Checkout,
    /// Install the toolchain and put it on PATH
    Toolchain,
    /// Run the test suite; the gate in front of publish
    Test,
    /// Upload the package to the registry
    Publish,
}

impl StepKind {
    pub const SEQUENCE: [StepKind; 4] = [
        StepKind::Checkout,
        StepKind::Toolchain,
        StepKind::Test,
        StepKind::Publish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Checkout => "checkout",
            StepKind::Toolchain => "toolchain",
            StepKind::Test => "test",
            StepKind::Publish => "publish",
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            StepKind::Checkout => "Checkout",
            StepKind::Toolchain => "Install toolchain",
            StepKind::Test => "Run tests",
            StepKind::Publish => "Publish",
        }
    }
}

/// How a step is carried out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Shallow clone of the tag into the workspace
    Checkout,
    /// rustup install, optionally followed by a directory override
    Toolchain { channel: String, set_override: bool },
    /// A single command line
    Run { argv: Vec<String> },
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    pub kind: StepKind,

    pub action: StepAction,

    /// Step environment, layered over the job environment
    pub env: HashMap<String, String>,

    /// Secret names bound into this step's environment
    pub secrets: Vec<String>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig) -> Self {
        let action = match (config.kind, config.argv()) {
            (_, Some(argv)) => StepAction::Run { argv },
            (StepKind::Checkout, None) => StepAction::Checkout,
            (StepKind::Toolchain, None) => StepAction::Toolchain {
                channel: config.channel.clone().unwrap_or_default().trim().to_string(),
                set_override: config.set_override,
            },
            (StepKind::Test, None) => StepAction::Run {
                argv: vec!["cargo".into(), "test".into(), "--verbose".into()],
            },
            (StepKind::Publish, None) => StepAction::Run {
                argv: vec!["cargo".into(), "publish".into()],
            },
        };

        Step {
            id: config.step_id(),
            name: config
                .name
                .clone()
                .unwrap_or_else(|| config.kind.default_name().to_string()),
            kind: config.kind,
            action,
            env: config.env.clone(),
            secrets: config.secrets.clone(),
            state: StepState::Pending,
        }
    }

    /// Command lines this step runs, in order
    pub fn commands(&self, context: &StepContext) -> Vec<Vec<String>> {
        match &self.action {
            StepAction::Checkout => {
                let mut commands = vec![vec![
                    "git".to_string(),
                    "clone".to_string(),
                    "--depth".to_string(),
                    "1".to_string(),
                    "--branch".to_string(),
                    context.tag.name.clone(),
                    context.repository.clone(),
                    ".".to_string(),
                ]];
                if let Some(commit) = &context.commit {
                    commands.push(vec![
                        "git".to_string(),
                        "-c".to_string(),
                        "advice.detachedHead=false".to_string(),
                        "checkout".to_string(),
                        "--detach".to_string(),
                        commit.clone(),
                    ]);
                }
                commands
            }
            StepAction::Toolchain {
                channel,
                set_override,
            } => {
                let mut commands = vec![vec![
                    "rustup".to_string(),
                    "toolchain".to_string(),
                    "install".to_string(),
                    channel.clone(),
                    "--profile".to_string(),
                    "minimal".to_string(),
                ]];
                if *set_override {
                    commands.push(vec![
                        "rustup".to_string(),
                        "override".to_string(),
                        "set".to_string(),
                        channel.clone(),
                    ]);
                }
                commands
            }
            StepAction::Run { argv } => vec![argv.clone()],
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, StepState::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trigger::ReleaseTag;
    use std::path::PathBuf;

    fn context(commit: Option<&str>) -> StepContext {
        StepContext {
            step_id: "checkout".to_string(),
            tag: ReleaseTag::new("v1.2.3"),
            repository: "https://example.com/relay.git".to_string(),
            commit: commit.map(str::to_string),
            workdir: PathBuf::from("/tmp/job"),
            env: HashMap::new(),
            secrets: Vec::new(),
            env_remove: Vec::new(),
            missing_secrets: Vec::new(),
        }
    }

    #[test]
    fn test_checkout_clones_tag() {
        let step = Step::from_config(&StepConfig::new(StepKind::Checkout));
        let commands = step.commands(&context(None));
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0],
            vec![
                "git",
                "clone",
                "--depth",
                "1",
                "--branch",
                "v1.2.3",
                "https://example.com/relay.git",
                "."
            ]
        );

        let commands = step.commands(&context(Some("abc123")));
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].last().map(String::as_str), Some("abc123"));
    }

    #[test]
    fn test_toolchain_override() {
        let config = StepConfig {
            channel: Some("nightly".to_string()),
            set_override: true,
            ..StepConfig::new(StepKind::Toolchain)
        };
        let step = Step::from_config(&config);
        let commands = step.commands(&context(None));
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0][..4], ["rustup", "toolchain", "install", "nightly"]);
        assert_eq!(commands[1], vec!["rustup", "override", "set", "nightly"]);

        let config = StepConfig {
            channel: Some("stable".to_string()),
            ..StepConfig::new(StepKind::Toolchain)
        };
        assert_eq!(Step::from_config(&config).commands(&context(None)).len(), 1);
    }

    #[test]
    fn test_run_overrides_builtin_action() {
        let config = StepConfig {
            run: Some("make check".to_string()),
            ..StepConfig::new(StepKind::Test)
        };
        let step = Step::from_config(&config);
        assert_eq!(step.name, "Run tests");
        assert_eq!(step.commands(&context(None)), vec![vec!["make", "check"]]);
    }

    #[test]
    fn test_default_commands() {
        let test = Step::from_config(&StepConfig::new(StepKind::Test));
        assert_eq!(
            test.commands(&context(None)),
            vec![vec!["cargo", "test", "--verbose"]]
        );
        let publish = Step::from_config(&StepConfig::new(StepKind::Publish));
        assert_eq!(
            publish.commands(&context(None)),
            vec![vec!["cargo", "publish"]]
        );
    }
}
