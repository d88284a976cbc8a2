//! Core domain models for the release pipeline
//!
//! This module defines the trigger, the job (pipeline), its steps and
//! their configuration.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod secret;
pub mod state;
pub mod step;
pub mod trigger;

pub use context::*;
pub use pipeline::*;
pub use secret::{Secret, SecretStore};
pub use state::*;
pub use step::*;
pub use trigger::{PushEvent, ReleaseTag, TagPattern, Trigger, TriggerError};
