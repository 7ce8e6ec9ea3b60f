use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::version::Version;

/// Runtime configuration for a setup run.
///
/// All paths derive from the installation root, which defaults to
/// `~/.codemate` and can be overridden through the `CODEMATE_HOME`
/// environment variable.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: Version,
    pub install_root: PathBuf,
    pub middleware_url: String,
    pub verbose: bool,
}

impl Config {
    pub fn new(version: Version, middleware_url: String, verbose: bool) -> Result<Self> {
        let install_root = match std::env::var_os("CODEMATE_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("Failed to resolve home directory")?
                .join(".codemate"),
        };
        Ok(Self::with_install_root(
            version,
            install_root,
            middleware_url,
            verbose,
        ))
    }

    pub fn with_install_root(
        version: Version,
        install_root: PathBuf,
        middleware_url: String,
        verbose: bool,
    ) -> Self {
        Self {
            version,
            install_root,
            middleware_url,
            verbose,
        }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.install_root.join("bin")
    }

    pub fn update_program(&self) -> PathBuf {
        self.bin_dir().join("update.py")
    }

    pub fn verification_program(&self) -> PathBuf {
        self.bin_dir().join("verification_env.py")
    }

    pub fn agent_entry_point(&self) -> PathBuf {
        self.bin_dir().join("initiate.py")
    }

    /// Bundled interpreter used to run the step programs and the agent.
    pub fn runtime_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.bin_dir().join("environment").join("python.exe")
        } else {
            self.bin_dir().join("environment").join("bin").join("python")
        }
    }

    pub fn version_file(&self) -> PathBuf {
        self.install_root.join("meta").join("version.txt")
    }

    pub fn state_file(&self) -> PathBuf {
        self.install_root.join("setup_state.json")
    }

    /// Environment seeded into step and pre-setup subprocesses.
    pub fn updater_env(&self) -> [(&'static str, String); 2] {
        let (host, port) = split_middleware_url(&self.middleware_url);
        [("UPDATER_SERVER_HOST", host), ("UPDATER_SERVER_PORT", port)]
    }
}

/// Split a middleware base URL into host and port strings.
///
/// The port defaults to `8000` when the authority has no numeric port.
pub fn split_middleware_url(url: &str) -> (String, String) {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme);
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host.to_string(), port.to_string())
        }
        _ => (authority.to_string(), "8000".to_string()),
    }
}
