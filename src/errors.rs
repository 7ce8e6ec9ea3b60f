//! Typed error hierarchy for the setup orchestrator.
//!
//! Most application code uses `anyhow` directly; `SetupError` covers the
//! failure cases the orchestrator needs to distinguish by kind, such as
//! missing step programs and state-store write failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid version format: {input}. Expected format: major.minor.patch")]
    InvalidVersion { input: String },

    #[error("{step} step is not available: {path} not found")]
    StepUnavailable { step: &'static str, path: PathBuf },

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write setup state at {path}: {source}")]
    StateWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
