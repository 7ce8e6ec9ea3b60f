//! Best-effort pre-setup script fetch and execution.
//!
//! The middleware may ship a one-off script to run before the phases
//! start. This step never blocks the run: every failure is logged and
//! swallowed, and nothing downstream consumes its result.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::config::Config;

#[derive(Debug, Deserialize)]
struct PreSetupScript {
    script: String,
    script_type: String,
}

pub async fn run_pre_setup_script(config: &Config) {
    if let Err(e) = try_run(config).await {
        warn!("Pre-setup script failed: {e:#}");
        println!("Error running setup: {e:#}");
    }
}

async fn try_run(config: &Config) -> Result<()> {
    let os = if cfg!(windows) { "windows" } else { "linux" };
    let is_fresh_install = !config.install_root.exists();
    let current_version = if is_fresh_install {
        None
    } else {
        read_current_version(config)
    };

    if current_version.as_deref() == Some(config.version.to_string().as_str()) {
        println!(
            "[INFO] Already at target version {}, skipping pre-setup",
            config.version
        );
        return Ok(());
    }

    let url = format!(
        "{}/setup_script?os={}&install_version={}&is_fresh_install={}&current_version={}",
        config.middleware_url,
        os,
        config.version,
        is_fresh_install,
        current_version.as_deref().unwrap_or(""),
    );
    let payload: PreSetupScript = reqwest::get(&url)
        .await
        .context("Failed to fetch pre-setup script")?
        .json()
        .await
        .context("Failed to decode pre-setup script")?;

    let suffix = if payload.script_type == "bat" {
        ".bat"
    } else {
        ".sh"
    };
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .context("Failed to create pre-setup script file")?;
    file.write_all(payload.script.as_bytes())
        .context("Failed to write pre-setup script")?;
    // Keep the file on disk for the subprocess; it is removed on drop.
    let temp_path = file.into_temp_path();
    let script_path: &Path = &temp_path;

    let mut cmd = if payload.script_type == "bat" {
        let mut c = tokio::process::Command::new("cmd");
        c.arg("/c").arg(script_path);
        c
    } else {
        let mut c = tokio::process::Command::new("bash");
        c.arg(script_path);
        c
    };
    for (key, value) in config.updater_env() {
        cmd.env(key, value);
    }
    let status = cmd
        .status()
        .await
        .context("Failed to run pre-setup script")?;

    if !status.success() {
        warn!("Pre-setup script exited with {status}");
    }
    Ok(())
}

fn read_current_version(config: &Config) -> Option<String> {
    std::fs::read_to_string(config.version_file())
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use std::fs;

    fn fixture_config(root: &Path, target: &str) -> Config {
        Config::with_install_root(
            Version::parse(target).unwrap(),
            root.to_path_buf(),
            // Unroutable per RFC 5737; the skip path must never reach it.
            "http://192.0.2.1:9".to_string(),
            false,
        )
    }

    fn write_version_file(config: &Config, version: &str) {
        fs::create_dir_all(config.version_file().parent().unwrap()).unwrap();
        fs::write(config.version_file(), format!("{version}\n")).unwrap();
    }

    #[test]
    fn current_version_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path(), "3.0.0");
        write_version_file(&config, "  2.1.5  ");
        assert_eq!(read_current_version(&config).as_deref(), Some("2.1.5"));
    }

    #[test]
    fn missing_version_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path(), "3.0.0");
        assert!(read_current_version(&config).is_none());
    }

    #[tokio::test]
    async fn skips_without_network_when_already_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path(), "3.0.0");
        write_version_file(&config, "3.0.0");
        // Would fail on the unroutable middleware URL if not skipped.
        try_run(&config).await.unwrap();
    }
}
