//! tagrelease - runs the release pipeline for version tag pushes

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use crate::core::config::PipelineConfig;
pub use crate::core::{ExecutionStatus, Pipeline, PushEvent, ReleaseTag, SecretStore, Step, StepState, Trigger};
pub use crate::execution::{CommandRunner, ExecutionEngine, ExecutionEvent, PipelineError, ProcessRunner};
