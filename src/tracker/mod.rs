//! Progress tracking for external monitoring.
//!
//! The orchestrator reports through the [`StatusReporter`] trait; the
//! default implementation persists a JSON document the frontend polls.
//! When no store is available the engine runs against [`NoopReporter`]
//! and still completes normally (standalone mode).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SetupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            status: PhaseStatus::Pending,
            progress: 0,
            message: String::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupState {
    pub overall_status: OverallStatus,
    pub overall_progress: u8,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseState>,
}

impl Default for SetupState {
    fn default() -> Self {
        Self {
            overall_status: OverallStatus::NotStarted,
            overall_progress: 0,
            message: String::new(),
            updated_at: Utc::now(),
            phases: BTreeMap::new(),
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverallStatus::NotStarted => "not_started",
            OverallStatus::Running => "running",
            OverallStatus::Completed => "completed",
            OverallStatus::Failed => "failed",
            OverallStatus::Error => "error",
        })
    }
}

pub trait StatusReporter: Send + Sync {
    fn load_setup_state(&self) -> Result<SetupState>;
    fn update_overall_status(&self, status: OverallStatus, message: &str) -> Result<()>;
    fn update_phase_progress(
        &self,
        phase: &str,
        message: &str,
        is_running: bool,
        progress: u8,
    ) -> Result<()>;
    fn mark_phase_failed(&self, phase: &str, error: &str) -> Result<()>;
}

/// Standalone mode: every operation succeeds without effect.
pub struct NoopReporter;

impl StatusReporter for NoopReporter {
    fn load_setup_state(&self) -> Result<SetupState> {
        Ok(SetupState::default())
    }

    fn update_overall_status(&self, _status: OverallStatus, _message: &str) -> Result<()> {
        Ok(())
    }

    fn update_phase_progress(
        &self,
        _phase: &str,
        _message: &str,
        _is_running: bool,
        _progress: u8,
    ) -> Result<()> {
        Ok(())
    }

    fn mark_phase_failed(&self, _phase: &str, _error: &str) -> Result<()> {
        Ok(())
    }
}

/// JSON-file-backed status store.
pub struct FileTracker {
    state_file: PathBuf,
}

impl FileTracker {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    /// Missing or corrupt state loads as a fresh default so a damaged store
    /// never wedges the setup flow.
    fn load(&self) -> SetupState {
        fs::read_to_string(&self.state_file)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn store(&self, state: &SetupState) -> Result<()> {
        let write_err = |source: std::io::Error| SetupError::StateWriteFailed {
            path: self.state_file.clone(),
            source,
        };
        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        // Temp file plus rename keeps readers from observing partial writes.
        let temp_path = self.state_file.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(write_err)?;
        fs::rename(&temp_path, &self.state_file).map_err(write_err)?;
        Ok(())
    }

    fn mutate(&self, apply: impl FnOnce(&mut SetupState)) -> Result<()> {
        let mut state = self.load();
        apply(&mut state);
        state.updated_at = Utc::now();
        self.store(&state)
    }

    fn recompute_overall(state: &mut SetupState) {
        if state.phases.is_empty() {
            return;
        }
        let total: u32 = state.phases.values().map(|p| u32::from(p.progress)).sum();
        state.overall_progress = (total / state.phases.len() as u32) as u8;
    }
}

impl StatusReporter for FileTracker {
    fn load_setup_state(&self) -> Result<SetupState> {
        Ok(self.load())
    }

    fn update_overall_status(&self, status: OverallStatus, message: &str) -> Result<()> {
        self.mutate(|state| {
            state.overall_status = status;
            state.message = message.to_string();
            if status == OverallStatus::Completed {
                state.overall_progress = 100;
            }
        })
    }

    fn update_phase_progress(
        &self,
        phase: &str,
        message: &str,
        is_running: bool,
        progress: u8,
    ) -> Result<()> {
        self.mutate(|state| {
            let entry = state.phases.entry(phase.to_string()).or_default();
            entry.progress = progress.min(100);
            entry.message = message.to_string();
            entry.status = if entry.progress >= 100 {
                PhaseStatus::Completed
            } else if is_running && entry.progress > 0 {
                PhaseStatus::Running
            } else {
                PhaseStatus::Pending
            };
            if entry.status == PhaseStatus::Completed {
                entry.error = None;
            }
            Self::recompute_overall(state);
        })
    }

    fn mark_phase_failed(&self, phase: &str, error: &str) -> Result<()> {
        self.mutate(|state| {
            let entry = state.phases.entry(phase.to_string()).or_default();
            entry.status = PhaseStatus::Failed;
            entry.message = error.to_string();
            entry.error = Some(error.to_string());
            Self::recompute_overall(state);
        })
    }
}
