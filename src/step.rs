//! Step collaborators: the update and verification programs.
//!
//! Each step wraps exactly one invocation of a bundled program, run under
//! the bundled interpreter with stdout and stderr fully captured so the
//! step's output never interleaves with the orchestrator's own.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::errors::SetupError;

/// Full captured output of one step invocation.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait SetupStep: Send + Sync {
    async fn run(&self) -> Result<StepOutput>;
}

pub struct UpdateStep {
    runtime: PathBuf,
    program: PathBuf,
    version: String,
    env: Vec<(&'static str, String)>,
}

impl UpdateStep {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runtime: config.runtime_path(),
            program: config.update_program(),
            version: config.version.to_string(),
            env: config.updater_env().to_vec(),
        }
    }
}

#[async_trait]
impl SetupStep for UpdateStep {
    async fn run(&self) -> Result<StepOutput> {
        run_captured(
            "update",
            &self.runtime,
            &self.program,
            &[self.version.clone()],
            &self.env,
        )
        .await
    }
}

pub struct VerificationStep {
    runtime: PathBuf,
    program: PathBuf,
    env: Vec<(&'static str, String)>,
}

impl VerificationStep {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runtime: config.runtime_path(),
            program: config.verification_program(),
            env: config.updater_env().to_vec(),
        }
    }
}

#[async_trait]
impl SetupStep for VerificationStep {
    async fn run(&self) -> Result<StepOutput> {
        run_captured("verification", &self.runtime, &self.program, &[], &self.env).await
    }
}

async fn run_captured(
    step: &'static str,
    runtime: &Path,
    program: &Path,
    args: &[String],
    env: &[(&'static str, String)],
) -> Result<StepOutput> {
    if !runtime.exists() {
        return Err(SetupError::StepUnavailable {
            step,
            path: runtime.to_path_buf(),
        }
        .into());
    }
    if !program.exists() {
        return Err(SetupError::StepUnavailable {
            step,
            path: program.to_path_buf(),
        }
        .into());
    }

    debug!("Running {step} step: {} {}", runtime.display(), program.display());

    let mut cmd = Command::new(runtime);
    cmd.arg(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = cmd.output().await.map_err(|e| SetupError::SpawnFailed {
        program: program.display().to_string(),
        source: e,
    })?;

    Ok(StepOutput {
        // A signal-terminated step has no code; surface it as a failure.
        exit_code: Some(output.status.code().unwrap_or(-1)),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
