//! Process runner - spawns step commands and streams their output

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Error types for process execution
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Empty command line")]
    EmptyCommand,
}

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives output lines as they are produced
pub trait OutputSink: Send + Sync {
    fn on_line(&self, stream: OutputStream, line: &str);
}

/// A fully described process invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,

    /// Variables set for the child (may include bound secrets)
    pub env: HashMap<String, String>,

    /// Inherited variables removed before `env` is applied
    pub env_remove: Vec<String>,
}

impl Invocation {
    pub fn from_argv(argv: &[String], cwd: PathBuf) -> Result<Self, RunnerError> {
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd,
            env: HashMap::new(),
            env_remove: Vec::new(),
        })
    }

    /// Command line for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Interleaved stdout and stderr lines
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run an invocation to completion, streaming lines to `sink`
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError>;
}

/// Runs invocations as local child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError> {
        debug!(
            "Spawning `{}` in {}",
            invocation.command_line(),
            invocation.cwd.display()
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for name in &invocation.env_remove {
            command.env_remove(name);
        }
        command.envs(&invocation.env);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let io_error = |source| RunnerError::Io {
            program: invocation.program.clone(),
            source,
        };

        let stdout = child.stdout.take().ok_or_else(|| {
            io_error(std::io::Error::new(std::io::ErrorKind::Other, "stdout not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            io_error(std::io::Error::new(std::io::ErrorKind::Other, "stderr not captured"))
        })?;

        let collected = std::sync::Mutex::new(Vec::new());
        let (out, err) = tokio::join!(
            pump(stdout, OutputStream::Stdout, sink, &collected),
            pump(stderr, OutputStream::Stderr, sink, &collected)
        );
        out.map_err(io_error)?;
        err.map_err(io_error)?;

        let status = child.wait().await.map_err(io_error)?;
        if !status.success() {
            warn!(
                "`{}` exited with {}",
                invocation.command_line(),
                status
                    .code()
                    .map(|c| format!("code {}", c))
                    .unwrap_or_else(|| "a signal".to_string())
            );
        }

        let lines = collected
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Ok(CommandOutput {
            exit_code: status.code(),
            output: lines.join("\n"),
        })
    }
}

async fn pump<R>(
    reader: R,
    stream: OutputStream,
    sink: Option<&dyn OutputSink>,
    collected: &std::sync::Mutex<Vec<String>>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(sink) = sink {
            sink.on_line(stream, &line);
        }
        collected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
    Ok(())
}
