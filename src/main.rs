use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use codemate_setup::config::Config;
use codemate_setup::orchestrator::SetupOrchestrator;
use codemate_setup::step::{UpdateStep, VerificationStep};
use codemate_setup::tracker::{FileTracker, NoopReporter, StatusReporter};
use codemate_setup::version::Version;

#[derive(Parser)]
#[command(name = "codemate-setup")]
#[command(
    version,
    about = "Orchestrate the CodeMate setup process with version installation and verification"
)]
struct Cli {
    /// Target version to install (e.g. 3.0.0, 1.2.3)
    #[arg(value_name = "VERSION")]
    target_version: Option<String>,

    /// Base URL of the middleware server
    #[arg(long, default_value = "http://34.41.78.205:9001")]
    middleware_url: String,

    /// Print per-step diagnostics
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(raw_version) = cli.target_version else {
        eprintln!("Error: Version argument is required");
        eprintln!("Usage: codemate-setup <version>");
        return ExitCode::from(1);
    };

    let version = match parse_target_version(&raw_version) {
        Some(v) => v,
        None => {
            eprintln!(
                "Error: Invalid version format '{raw_version}'. Expected format: major.minor.patch"
            );
            return ExitCode::from(1);
        }
    };

    let config = match Config::new(version, cli.middleware_url, cli.verbose) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(1);
        }
    };

    let reporter: Box<dyn StatusReporter> = match std::fs::create_dir_all(&config.install_root) {
        Ok(()) => Box::new(FileTracker::new(config.state_file())),
        Err(e) => {
            println!("Warning: setup tracker not available ({e}). Running in standalone mode.");
            Box::new(NoopReporter)
        }
    };

    println!("Setup Orchestrator initialized for version {version}");

    let update_step = Box::new(UpdateStep::from_config(&config));
    let verification_step = Box::new(VerificationStep::from_config(&config));
    let orchestrator = SetupOrchestrator::new(config, reporter, update_step, verification_step);

    let code = orchestrator.run_complete_setup().await;
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// The CLI only accepts plain `major.minor.patch` with digits-only
/// segments; prefixes tolerated elsewhere are rejected here.
fn parse_target_version(raw: &str) -> Option<Version> {
    let digits_only = raw
        .split('.')
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if !digits_only {
        return None;
    }
    Version::parse(raw).ok()
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("codemate_setup=debug")
    } else {
        EnvFilter::new("codemate_setup=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
