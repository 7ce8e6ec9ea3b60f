//! The setup state machine: initialize, pre-step, phases, finalize,
//! supervise.
//!
//! Phases run strictly in sequence and verification is only attempted
//! after a successful update. A failed phase is classified and recorded,
//! never retried; the only way to re-attempt is a fresh invocation.

mod supervisor;

pub use supervisor::{ChildSupervisor, SuperviseOutcome};

use anyhow::Result;
use console::style;
use tracing::warn;

use crate::config::Config;
use crate::phase::{PhaseKind, PhaseResult};
use crate::presetup;
use crate::step::SetupStep;
use crate::tracker::{OverallStatus, PhaseStatus, StatusReporter};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;
pub const EXIT_UNEXPECTED: i32 = 99;

pub struct SetupOrchestrator {
    config: Config,
    reporter: Box<dyn StatusReporter>,
    update_step: Box<dyn SetupStep>,
    verification_step: Box<dyn SetupStep>,
}

impl SetupOrchestrator {
    pub fn new(
        config: Config,
        reporter: Box<dyn StatusReporter>,
        update_step: Box<dyn SetupStep>,
        verification_step: Box<dyn SetupStep>,
    ) -> Self {
        Self {
            config,
            reporter,
            update_step,
            verification_step,
        }
    }

    /// Run the whole setup flow and return the process exit code.
    ///
    /// Any fault that escapes the phase and supervision paths is caught
    /// here, reported as status "error", and mapped to [`EXIT_UNEXPECTED`].
    pub async fn run_complete_setup(&self) -> i32 {
        match self.run_inner().await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("\nUnexpected error during setup orchestration: {e:#}");
                self.report(self.reporter.update_overall_status(
                    OverallStatus::Error,
                    &format!("Unexpected orchestration error: {e:#}"),
                ));
                EXIT_UNEXPECTED
            }
        }
    }

    async fn run_inner(&self) -> Result<i32> {
        println!("Starting Setup Orchestration Process");
        println!("Target Version: {}", self.config.version);

        if !self.initialize_setup_state() {
            return Ok(EXIT_FAILURE);
        }

        presetup::run_pre_setup_script(&self.config).await;

        let update_success = self
            .run_phase(PhaseKind::CodebaseUpdate, self.update_step.as_ref())
            .await;

        let verification_success = if update_success {
            self.run_phase(
                PhaseKind::EnvironmentVerification,
                self.verification_step.as_ref(),
            )
            .await
        } else {
            println!("[SKIP] Environment verification skipped due to codebase update failure");
            false
        };

        let exit_code = self.finalize_setup(update_success, verification_success);
        if exit_code != EXIT_SUCCESS {
            return Ok(exit_code);
        }

        self.supervise_agent().await
    }

    /// Initialize the state store for external monitoring.
    ///
    /// A prior completed or failed run is preserved untouched; a running
    /// record is resumed. Only an unset (or corrupt, hence defaulted)
    /// record transitions to running.
    fn initialize_setup_state(&self) -> bool {
        match self.try_initialize() {
            Ok(()) => {
                println!("[OK] Setup state initialized successfully");
                true
            }
            Err(e) => {
                self.report(self.reporter.update_overall_status(
                    OverallStatus::Error,
                    &format!("Failed to initialize setup state: {e:#}"),
                ));
                println!("[FAIL] Failed to initialize setup state: {e:#}");
                false
            }
        }
    }

    fn try_initialize(&self) -> Result<()> {
        let state = self.reporter.load_setup_state()?;
        match state.overall_status {
            OverallStatus::Completed | OverallStatus::Failed => {
                println!(
                    "Preserving final state: {} ({}%)",
                    state.overall_status, state.overall_progress
                );
            }
            OverallStatus::Running => {
                println!("Resuming setup: {}%", state.overall_progress);
            }
            OverallStatus::NotStarted | OverallStatus::Error => {
                println!("Starting fresh setup");
                self.reporter
                    .update_overall_status(OverallStatus::Running, "Initializing setup process")?;
                for kind in PhaseKind::ALL {
                    let pending = state
                        .phases
                        .get(kind.key())
                        .is_none_or(|p| p.status == PhaseStatus::Pending);
                    if pending {
                        self.reporter.update_phase_progress(
                            kind.key(),
                            kind.preparing_message(),
                            true,
                            0,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_phase(&self, kind: PhaseKind, step: &dyn SetupStep) -> bool {
        self.report(self.reporter.update_phase_progress(
            kind.key(),
            kind.start_message(),
            true,
            kind.start_progress(),
        ));

        println!("\n{}", "=".repeat(60));
        println!("{}", style(kind.banner()).bold());
        println!("{}", "=".repeat(60));

        let result = match step.run().await {
            Ok(output) => PhaseResult::from_output(kind, output),
            Err(fault) => PhaseResult::from_fault(kind, &fault),
        };

        // Surface the captured step output for operator visibility.
        if !result.stdout.trim().is_empty() {
            println!("{}", result.stdout.trim_end());
        }

        if result.success {
            println!("{}", kind.success_message());
            self.report(self.reporter.update_phase_progress(
                kind.key(),
                kind.success_message(),
                true,
                100,
            ));
            true
        } else {
            let reason = result.error.unwrap_or_else(|| {
                format!(
                    "{} process failed with exit code {}",
                    kind.process_label(),
                    result.exit_code.unwrap_or(1)
                )
            });
            println!(
                "[FAIL] {} failed with exit code {}",
                kind.title(),
                result.exit_code.unwrap_or(1)
            );
            println!("[ERROR] {reason}");
            self.report(self.reporter.mark_phase_failed(kind.key(), &reason));
            false
        }
    }

    fn finalize_setup(&self, update_success: bool, verification_success: bool) -> i32 {
        if update_success && verification_success {
            self.report(
                self.reporter
                    .update_overall_status(OverallStatus::Completed, "Setup completed successfully"),
            );
            println!("\n{}", "=".repeat(60));
            println!("{}", style("SETUP COMPLETED SUCCESSFULLY!").green().bold());
            println!("{}", "=".repeat(60));
            println!(
                "Version {} has been installed and verified.",
                self.config.version
            );
            println!("Your environment is ready to use.");
            EXIT_SUCCESS
        } else {
            let message = if update_success {
                "Setup failed during environment verification"
            } else {
                "Setup failed during codebase update"
            };
            self.report(
                self.reporter
                    .update_overall_status(OverallStatus::Failed, message),
            );
            println!("\n[FAIL] {message}");
            EXIT_FAILURE
        }
    }

    /// Hand off to the agent supervisor after a successful setup.
    ///
    /// A missing runtime or entry point skips supervision; a spawn or
    /// supervision fault is logged. Neither demotes the finalized success.
    async fn supervise_agent(&self) -> Result<i32> {
        let runtime = self.config.runtime_path();
        let entry_point = self.config.agent_entry_point();
        if !runtime.exists() || !entry_point.exists() {
            println!("[INITIATE] Cannot start: runtime or entry point not found");
            return Ok(EXIT_SUCCESS);
        }

        println!(
            "Starting {}...",
            entry_point.file_name().unwrap_or_default().to_string_lossy()
        );
        let supervisor = match ChildSupervisor::spawn(&runtime, &entry_point) {
            Ok(s) => s,
            Err(e) => {
                println!("[INITIATE] Failed to start: {e:#}");
                return Ok(EXIT_SUCCESS);
            }
        };

        println!("\n[INFO] Setup orchestrator will continue running while the agent is active");
        println!("[INFO] Press Ctrl+C to stop both setup and agent processes");
        match supervisor.supervise(wait_for_interrupt()).await {
            Ok(SuperviseOutcome::Exited(code)) => Ok(code),
            Ok(SuperviseOutcome::Cancelled) => Ok(EXIT_INTERRUPTED),
            Err(e) => {
                println!("[INITIATE] Supervision error: {e:#}");
                Ok(EXIT_SUCCESS)
            }
        }
    }

    /// Reporter failures after initialization are logged, not fatal.
    fn report(&self, result: Result<()>) {
        if let Err(e) = result {
            warn!("Failed to update setup state: {e:#}");
        }
    }
}

async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for interrupt signal: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepOutput;
    use crate::tracker::{FileTracker, NoopReporter};
    use crate::version::Version;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedStep {
        exit_code: Option<i32>,
        stdout: &'static str,
        stderr: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedStep {
        fn new(exit_code: Option<i32>, stdout: &'static str, stderr: &'static str) -> Self {
            Self {
                exit_code,
                stdout,
                stderr,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn succeeding() -> Self {
            Self::new(Some(0), "ok\n", "")
        }

        fn call_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl SetupStep for ScriptedStep {
        async fn run(&self) -> Result<StepOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StepOutput {
                exit_code: self.exit_code,
                stdout: self.stdout.to_string(),
                stderr: self.stderr.to_string(),
            })
        }
    }

    struct FaultingStep;

    #[async_trait]
    impl SetupStep for FaultingStep {
        async fn run(&self) -> Result<StepOutput> {
            Err(anyhow::anyhow!("interpreter exploded"))
        }
    }

    /// Install root with a version file matching the target so the
    /// pre-setup step skips without touching the network.
    fn fixture_config(root: &std::path::Path) -> Config {
        let config = Config::with_install_root(
            Version::parse("3.0.0").unwrap(),
            root.join(".codemate"),
            "http://192.0.2.1:9".to_string(),
            false,
        );
        fs::create_dir_all(config.version_file().parent().unwrap()).unwrap();
        fs::write(config.version_file(), "3.0.0\n").unwrap();
        config
    }

    fn orchestrator_with(
        config: &Config,
        update: ScriptedStep,
        verification: ScriptedStep,
    ) -> SetupOrchestrator {
        SetupOrchestrator::new(
            config.clone(),
            Box::new(FileTracker::new(config.state_file())),
            Box::new(update),
            Box::new(verification),
        )
    }

    fn load_state(config: &Config) -> crate::tracker::SetupState {
        FileTracker::new(config.state_file())
            .load_setup_state()
            .unwrap()
    }

    #[tokio::test]
    async fn both_phases_succeed_completes_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());
        let orchestrator = orchestrator_with(
            &config,
            ScriptedStep::succeeding(),
            ScriptedStep::succeeding(),
        );

        let code = orchestrator.run_complete_setup().await;
        assert_eq!(code, EXIT_SUCCESS);

        let state = load_state(&config);
        assert_eq!(state.overall_status, OverallStatus::Completed);
        assert_eq!(state.overall_progress, 100);
        assert_eq!(
            state.phases["codebase_update"].status,
            PhaseStatus::Completed
        );
        assert_eq!(
            state.phases["environment_verification"].status,
            PhaseStatus::Completed
        );
    }

    #[tokio::test]
    async fn update_failure_skips_verification() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());
        let update = ScriptedStep::new(Some(1), "Invalid version format '1.x'\n", "");
        let verification = ScriptedStep::succeeding();
        let verification_calls = verification.call_counter();
        let orchestrator = orchestrator_with(&config, update, verification);

        let code = orchestrator.run_complete_setup().await;
        assert_eq!(code, EXIT_FAILURE);
        assert_eq!(verification_calls.load(Ordering::SeqCst), 0);

        let state = load_state(&config);
        assert_eq!(state.overall_status, OverallStatus::Failed);
        let update_phase = &state.phases["codebase_update"];
        assert_eq!(update_phase.status, PhaseStatus::Failed);
        assert_eq!(
            update_phase.error.as_deref(),
            Some("Invalid version format specified")
        );
        assert_eq!(
            state.phases["environment_verification"].status,
            PhaseStatus::Pending
        );
    }

    #[tokio::test]
    async fn step_fault_is_reported_as_exception() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());
        let orchestrator = SetupOrchestrator::new(
            config.clone(),
            Box::new(FileTracker::new(config.state_file())),
            Box::new(FaultingStep),
            Box::new(ScriptedStep::succeeding()),
        );

        let code = orchestrator.run_complete_setup().await;
        assert_eq!(code, EXIT_FAILURE);

        let state = load_state(&config);
        let error = state.phases["codebase_update"].error.clone().unwrap();
        assert!(
            error.starts_with("Exception during codebase update:"),
            "unexpected error: {error}"
        );
    }

    #[tokio::test]
    async fn initialization_preserves_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());
        let orchestrator = orchestrator_with(
            &config,
            ScriptedStep::succeeding(),
            ScriptedStep::succeeding(),
        );
        assert_eq!(orchestrator.run_complete_setup().await, EXIT_SUCCESS);
        let before = load_state(&config);

        // Two more initializations over a completed record must not touch it.
        orchestrator.try_initialize().unwrap();
        orchestrator.try_initialize().unwrap();

        let after = load_state(&config);
        assert_eq!(after.overall_status, OverallStatus::Completed);
        assert_eq!(after.overall_progress, before.overall_progress);
        assert_eq!(
            after.phases["codebase_update"].progress,
            before.phases["codebase_update"].progress
        );
        assert_eq!(
            after.phases["environment_verification"].progress,
            before.phases["environment_verification"].progress
        );
    }

    #[tokio::test]
    async fn fresh_initialization_seeds_pending_phases() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());
        let orchestrator = orchestrator_with(
            &config,
            ScriptedStep::succeeding(),
            ScriptedStep::succeeding(),
        );
        orchestrator.try_initialize().unwrap();

        let state = load_state(&config);
        assert_eq!(state.overall_status, OverallStatus::Running);
        for kind in PhaseKind::ALL {
            let phase = &state.phases[kind.key()];
            assert_eq!(phase.status, PhaseStatus::Pending);
            assert_eq!(phase.progress, 0);
        }
    }

    #[tokio::test]
    async fn runs_standalone_against_noop_reporter() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path());
        let orchestrator = SetupOrchestrator::new(
            config,
            Box::new(NoopReporter),
            Box::new(ScriptedStep::succeeding()),
            Box::new(ScriptedStep::succeeding()),
        );
        assert_eq!(orchestrator.run_complete_setup().await, EXIT_SUCCESS);
    }
}
