//! Git command runner
//!
//! Centralized subprocess invocation with consistent error handling: every
//! git call runs with piped output and is bounded by a wall-clock timeout,
//! surfaced as [`Error::Timeout`] rather than a generic failure.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::{Error, Result};

/// Default bound for a single git invocation.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for collecting output from child process pipes after exit.
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Output of a completed git command.
#[derive(Debug)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs git commands against one repository with one timeout policy.
#[derive(Debug, Clone)]
pub struct GitRunner {
    repo_root: PathBuf,
    timeout: Duration,
}

impl GitRunner {
    pub fn new(repo_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeout,
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run a git command and return its collected output.
    ///
    /// A spawn failure or an exceeded timeout is an error; a non-zero exit
    /// is not, so callers that treat failure as a boolean can inspect
    /// `success` themselves.
    pub fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::vcs(command_label(args), format!("failed to spawn git: {e}")))?;

        // Drain the pipes before waiting for exit. A child blocked on a full
        // pipe buffer would otherwise deadlock against wait().
        let stdout_rx = drain_stream(child.stdout.take());
        let stderr_rx = drain_stream(child.stderr.take());

        let waited = child.wait_timeout(self.timeout).map_err(|e| {
            Error::vcs(
                command_label(args),
                format!("failed to wait for git: {e}"),
            )
        })?;

        match waited {
            Some(status) => {
                let stdout = stdout_rx
                    .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
                    .unwrap_or_default();
                let stderr = stderr_rx
                    .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
                    .unwrap_or_default();
                Ok(GitOutput {
                    success: status.success(),
                    stdout,
                    stderr,
                })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::Timeout {
                    command: command_label(args),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Run a git command, check for success, and return stdout trimmed.
    ///
    /// On a non-zero exit the stderr content becomes the error detail.
    pub fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.success {
            return Err(Error::vcs(
                command_label(args),
                output.stderr.trim().to_string(),
            ));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Run a git command and return true iff it exited zero.
    ///
    /// Swallows spawn failures and timeouts; use for existence probes like
    /// `rev-parse --verify`.
    pub fn run_bool(&self, args: &[&str]) -> bool {
        self.run(args).map(|o| o.success).unwrap_or(false)
    }
}

fn command_label(args: &[&str]) -> String {
    args.first().copied().unwrap_or("git").to_string()
}

fn drain_stream<R>(stream: Option<R>) -> mpsc::Receiver<String>
where
    R: std::io::Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    match stream {
        Some(mut stream) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf);
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}
