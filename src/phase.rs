//! Phase identities and per-phase execution results.

use crate::classify::classify_failure;
use crate::step::StepOutput;

/// One discrete, independently reportable unit of the setup workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    CodebaseUpdate,
    EnvironmentVerification,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 2] = [
        PhaseKind::CodebaseUpdate,
        PhaseKind::EnvironmentVerification,
    ];

    /// Stable key used by the progress store.
    pub fn key(&self) -> &'static str {
        match self {
            PhaseKind::CodebaseUpdate => "codebase_update",
            PhaseKind::EnvironmentVerification => "environment_verification",
        }
    }

    pub fn banner(&self) -> &'static str {
        match self {
            PhaseKind::CodebaseUpdate => "PHASE 1: CODEBASE UPDATE",
            PhaseKind::EnvironmentVerification => "PHASE 2: ENVIRONMENT VERIFICATION",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PhaseKind::CodebaseUpdate => "Codebase update",
            PhaseKind::EnvironmentVerification => "Environment verification",
        }
    }

    pub fn process_label(&self) -> &'static str {
        match self {
            PhaseKind::CodebaseUpdate => "Update",
            PhaseKind::EnvironmentVerification => "Verification",
        }
    }

    pub fn preparing_message(&self) -> &'static str {
        match self {
            PhaseKind::CodebaseUpdate => "Preparing for codebase setup",
            PhaseKind::EnvironmentVerification => "Preparing for environment verification",
        }
    }

    pub fn start_message(&self) -> &'static str {
        match self {
            PhaseKind::CodebaseUpdate => "Starting codebase setup process",
            PhaseKind::EnvironmentVerification => "Starting environment verification",
        }
    }

    pub fn start_progress(&self) -> u8 {
        match self {
            PhaseKind::CodebaseUpdate => 5,
            PhaseKind::EnvironmentVerification => 10,
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            PhaseKind::CodebaseUpdate => "Codebase update completed successfully",
            PhaseKind::EnvironmentVerification => "Environment verification completed successfully",
        }
    }
}

/// Result of one phase run, consumed by the orchestrator and then discarded.
#[derive(Debug)]
pub struct PhaseResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl PhaseResult {
    /// Build a result from a step that ran to completion.
    ///
    /// A missing exit code means the step returned normally; otherwise only
    /// code zero counts as success, and failures get a classified reason.
    pub fn from_output(kind: PhaseKind, output: StepOutput) -> Self {
        let success = output.exit_code.map_or(true, |code| code == 0);
        let error = if success {
            None
        } else {
            Some(classify_failure(
                kind,
                &output.stdout,
                &output.stderr,
                output.exit_code.unwrap_or(1),
            ))
        };
        Self {
            success,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            error,
        }
    }

    /// Build a result for a step invocation that faulted before producing
    /// any exit status.
    pub fn from_fault(kind: PhaseKind, fault: &anyhow::Error) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(format!(
                "Exception during {}: {fault:#}",
                kind.title().to_lowercase()
            )),
        }
    }
}
