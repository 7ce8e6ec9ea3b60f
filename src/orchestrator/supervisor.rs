//! Supervision of the post-setup agent process.
//!
//! The supervisor owns the agent process for its whole lifetime. Two
//! forwarding tasks re-emit the agent's stdout and stderr line by line,
//! tagged and flushed immediately, and are always awaited before the
//! supervisor returns so no output is lost. On cancellation the agent is
//! asked to terminate and force-killed if it ignores the request.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Delay after spawn before probing whether the agent came up.
const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// How long a terminate request may take before the agent is force-killed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a supervised agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperviseOutcome {
    /// The agent exited on its own with the given exit code.
    Exited(i32),
    /// Cancellation was requested and the agent was shut down.
    Cancelled,
}

pub struct ChildSupervisor {
    child: Child,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl ChildSupervisor {
    /// Spawn the agent under `runtime`, with the working directory set to
    /// the entry point's containing directory.
    pub fn spawn(runtime: &Path, entry_point: &Path) -> Result<Self> {
        let work_dir = entry_point.parent().unwrap_or_else(|| Path::new("."));
        let mut child = Command::new(runtime)
            .arg(entry_point)
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", runtime.display()))?;

        let stdout = child
            .stdout
            .take()
            .context("Agent stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("Agent stderr was not captured")?;
        let stdout_task = tokio::spawn(forward_lines(stdout, "INITIATE"));
        let stderr_task = tokio::spawn(forward_lines(stderr, "INITIATE-ERR"));

        Ok(Self {
            child,
            stdout_task,
            stderr_task,
        })
    }

    /// Block until the agent exits or `shutdown` resolves.
    ///
    /// Cancellation escalates: terminate request, bounded wait, force
    /// kill. Either way both forwarding tasks are drained before this
    /// returns.
    pub async fn supervise(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<SuperviseOutcome> {
        tokio::time::sleep(STARTUP_GRACE).await;
        match self
            .child
            .try_wait()
            .context("Failed to probe agent process")?
        {
            Some(status) => {
                let code = status.code().unwrap_or(-1);
                println!("[INITIATE] Failed to start (exit code: {code})");
                self.drain().await;
                return Ok(SuperviseOutcome::Exited(code));
            }
            None => println!("[INITIATE] Started successfully"),
        }

        tokio::pin!(shutdown);
        let natural_exit = tokio::select! {
            status = self.child.wait() => {
                Some(status.context("Failed to wait on agent process")?)
            }
            _ = &mut shutdown => None,
        };

        let outcome = match natural_exit {
            Some(status) => SuperviseOutcome::Exited(status.code().unwrap_or(-1)),
            None => {
                println!("\n[INFO] Received interrupt signal, stopping agent...");
                self.terminate().await?;
                SuperviseOutcome::Cancelled
            }
        };
        self.drain().await;
        Ok(outcome)
    }

    async fn terminate(&mut self) -> Result<()> {
        request_terminate(&self.child);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait on terminating agent")?;
                debug!("Agent exited after terminate request: {status}");
            }
            Err(_) => {
                println!("[WARN] Force killing agent...");
                self.child
                    .kill()
                    .await
                    .context("Failed to kill agent process")?;
            }
        }
        Ok(())
    }

    /// Await both forwarders; they stop once their streams close.
    async fn drain(&mut self) {
        if let Err(e) = (&mut self.stdout_task).await {
            debug!("Agent stdout forwarder ended abnormally: {e}");
        }
        if let Err(e) = (&mut self.stderr_task).await {
            debug!("Agent stderr forwarder ended abnormally: {e}");
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Failed to send SIGTERM to agent (pid {pid}): {e}");
        }
    }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) {
    // No graceful signal available; the escalation wait in `terminate`
    // still bounds the shutdown before the hard kill.
}

async fn forward_lines(stream: impl AsyncRead + Unpin, tag: &'static str) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => emit_tagged(tag, &line),
            Ok(None) => break,
            Err(e) => {
                emit_tagged(tag, &format!("Stream error: {e}"));
                break;
            }
        }
    }
}

fn emit_tagged(tag: &str, line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "[{tag}] {line}");
    let _ = out.flush();
}
