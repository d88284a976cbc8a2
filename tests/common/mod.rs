//! Shared helpers for release scenario tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tagrelease::core::config::PipelineConfig;
use tagrelease::execution::{
    CommandOutput, CommandRunner, Invocation, OutputSink, OutputStream, RunnerError,
};
use tagrelease::{ExecutionEngine, ExecutionEvent, Pipeline, PipelineError, PushEvent, SecretStore};

pub const REGISTRY_TOKEN: &str = "CARGO_REGISTRY_TOKEN";
pub const TOKEN_VALUE: &str = "cio-s3cr3t-token";
pub const REPOSITORY: &str = "https://example.com/relay.git";

/// One recorded process invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub env_remove: Vec<String>,
}

impl Call {
    /// `program subcommand`, e.g. `cargo publish`
    pub fn command(&self) -> String {
        match self.args.first() {
            Some(sub) => format!("{} {}", self.program, sub),
            None => self.program.clone(),
        }
    }
}

/// Runner that records every invocation instead of spawning it
///
/// Calls whose `program subcommand` matches `fail_on` exit with code 101.
/// Every call prints one line naming itself; with `echo_env` set it also
/// prints the value of that variable, as a leaky build script would.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<Call>>,
    fail_on: Option<String>,
    echo_env: Option<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(command: &str) -> Self {
        Self {
            fail_on: Some(command.to_string()),
            ..Self::default()
        }
    }

    pub fn echoing(mut self, variable: &str) -> Self {
        self.echo_env = Some(variable.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded `program subcommand` strings, in order
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(Call::command).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError> {
        let call = Call {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            cwd: invocation.cwd.clone(),
            env: invocation.env.clone(),
            env_remove: invocation.env_remove.clone(),
        };
        let command = call.command();
        self.calls.lock().unwrap().push(call);

        let mut lines = vec![format!("running {}", command)];
        if let Some(value) = self.echo_env.as_ref().and_then(|v| invocation.env.get(v)) {
            lines.push(format!("token is {}", value));
        }
        if let Some(sink) = sink {
            for line in &lines {
                sink.on_line(OutputStream::Stdout, line);
            }
        }

        let failed = self.fail_on.as_deref() == Some(command.as_str());
        Ok(CommandOutput {
            exit_code: Some(if failed { 101 } else { 0 }),
            output: lines.join("\n"),
        })
    }
}

/// Outcome of one dispatched push
pub struct RunOutcome {
    pub pipeline: Pipeline,
    pub result: Result<(), PipelineError>,
    pub events: Vec<ExecutionEvent>,
    pub runner_calls: Vec<Call>,
}

impl RunOutcome {
    pub fn publish_calls(&self) -> Vec<&Call> {
        self.runner_calls
            .iter()
            .filter(|c| c.command() == "cargo publish")
            .collect()
    }
}

pub fn tag_push(tag: &str) -> PushEvent {
    PushEvent::new(format!("refs/tags/{}", tag), REPOSITORY)
}

pub fn secrets() -> SecretStore {
    SecretStore::new().with(REGISTRY_TOKEN, TOKEN_VALUE)
}

/// Dispatch `event` through the stock workflow
///
/// Returns `None` when the trigger does not match.
pub async fn dispatch(
    event: &PushEvent,
    runner: ScriptedRunner,
    secrets: SecretStore,
) -> Option<RunOutcome> {
    dispatch_with(&PipelineConfig::default(), event, runner, secrets).await
}

pub async fn dispatch_with(
    config: &PipelineConfig,
    event: &PushEvent,
    runner: ScriptedRunner,
    secrets: SecretStore,
) -> Option<RunOutcome> {
    let mut pipeline = Pipeline::for_push(config, event).unwrap()?;

    let events = Arc::new(Mutex::new(Vec::new()));
    let mut engine = ExecutionEngine::new(runner, secrets);
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let result = engine.execute(&mut pipeline).await;
    let runner_calls = engine.runner().calls();
    let events = events.lock().unwrap().clone();

    Some(RunOutcome {
        pipeline,
        result,
        events,
        runner_calls,
    })
}
