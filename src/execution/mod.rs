//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod runner;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, PipelineError};
pub use executor::{ExecutionResult, StepExecutor};
pub use runner::{CommandOutput, CommandRunner, Invocation, OutputSink, OutputStream, ProcessRunner, RunnerError};
