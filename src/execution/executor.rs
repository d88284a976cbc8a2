//! Step executor - runs the commands of a single step

use crate::{
    core::{Step, StepContext},
    execution::runner::{CommandRunner, Invocation, OutputSink},
};
use tracing::{debug, error, info};

/// Result of executing a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Every command exited with status 0
    Success { output: String },
    /// A command failed or could not be run; the run stops here
    Failed { error: String, output: String },
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a step and return the result
    ///
    /// Commands run in order and the first non-zero exit stops the step.
    /// Output and error text come back with the step's secrets masked.
    pub async fn execute(
        &self,
        step: &Step,
        context: &StepContext,
        sink: Option<&dyn OutputSink>,
    ) -> ExecutionResult {
        info!("Executing step: {}", step.id);

        if !context.missing_secrets.is_empty() {
            let error = format!(
                "Secret(s) not available: {}",
                context.missing_secrets.join(", ")
            );
            error!("Step {}: {}", step.id, error);
            return ExecutionResult::Failed {
                error,
                output: String::new(),
            };
        }

        let env = context.process_env();
        let mut transcript = Vec::new();

        for argv in step.commands(context) {
            let mut invocation = match Invocation::from_argv(&argv, context.workdir.clone()) {
                Ok(invocation) => invocation,
                Err(e) => {
                    return ExecutionResult::Failed {
                        error: e.to_string(),
                        output: context.redact(&transcript.join("\n")),
                    }
                }
            };
            invocation.env = env.clone();
            invocation.env_remove = context.env_remove.clone();

            let command_line = context.redact(&invocation.command_line());
            debug!("Step {} running `{}`", step.id, command_line);

            match self.runner.run(&invocation, sink).await {
                Ok(result) => {
                    transcript.push(result.output.clone());
                    if !result.success() {
                        let error = match result.exit_code {
                            Some(code) => format!("`{}` exited with code {}", command_line, code),
                            None => format!("`{}` was terminated by a signal", command_line),
                        };
                        error!("Step {} failed: {}", step.id, error);
                        return ExecutionResult::Failed {
                            error,
                            output: context.redact(&transcript.join("\n")),
                        };
                    }
                }
                Err(e) => {
                    let error = context.redact(&e.to_string());
                    error!("Step {} failed: {}", step.id, error);
                    return ExecutionResult::Failed {
                        error,
                        output: context.redact(&transcript.join("\n")),
                    };
                }
            }
        }

        info!("Step {} completed successfully", step.id);
        ExecutionResult::Success {
            output: context.redact(&transcript.join("\n")),
        }
    }
}
