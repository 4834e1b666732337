//! Git-backed [`Vcs`] implementation
//!
//! Stash handles are stash *commit* SHAs rather than `stash@{N}` slots:
//! slots shift as entries are pushed and dropped, the commit SHA does not.
//! Markers are annotated tags whose message carries the serialized payload.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

use super::runner::{GitRunner, DEFAULT_GIT_TIMEOUT};
use super::Vcs;

pub struct GitVcs {
    runner: GitRunner,
}

impl GitVcs {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self::with_timeout(repo_root, DEFAULT_GIT_TIMEOUT)
    }

    pub fn with_timeout(repo_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner: GitRunner::new(repo_root, timeout),
        }
    }

    /// Check that a git executable is reachable at all.
    pub fn ensure_available() -> Result<()> {
        which::which("git")
            .map(|_| ())
            .map_err(|_| Error::vcs("git", "git executable not found in PATH"))
    }

    pub fn repo_root(&self) -> &Path {
        self.runner.repo_root()
    }

    fn status_lines(&self) -> Result<Vec<String>> {
        let output = self.runner.run(&["status", "--porcelain"])?;
        if !output.success {
            return Err(Error::vcs("status", output.stderr.trim().to_string()));
        }
        Ok(output
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// SHA of the newest stash entry, if any exist. `refs/stash` is absent
    /// until the first push.
    fn stash_top(&self) -> Option<String> {
        self.runner
            .run(&["rev-parse", "--verify", "refs/stash"])
            .ok()
            .filter(|o| o.success)
            .map(|o| o.stdout.trim().to_string())
    }

    /// Resolve a stash commit SHA back to its current `stash@{N}` slot.
    fn stash_index_of(&self, handle: &str) -> Result<Option<usize>> {
        let listing = self.runner.run_checked(&["stash", "list", "--format=%H %gd"])?;
        for line in listing.lines() {
            if let Some((sha, slot)) = line.split_once(' ') {
                if sha == handle {
                    let index = slot.trim_start_matches("stash@{").trim_end_matches('}');
                    if let Ok(n) = index.parse::<usize>() {
                        return Ok(Some(n));
                    }
                }
            }
        }
        Ok(None)
    }

    fn marker_exists(&self, name: &str) -> bool {
        self.runner
            .run_bool(&["rev-parse", "--verify", &format!("refs/tags/{name}")])
    }
}

impl Vcs for GitVcs {
    fn current_branch(&self) -> Result<String> {
        let name = self.runner.run_checked(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if name == "HEAD" {
            return Err(Error::vcs(
                "rev-parse",
                "HEAD is detached and does not name a branch",
            ));
        }
        Ok(name)
    }

    fn current_revision(&self) -> Result<String> {
        self.runner.run_checked(&["rev-parse", "HEAD"])
    }

    fn has_pending_changes(&self) -> Result<bool> {
        Ok(self.status_lines()?.iter().any(|l| !l.starts_with("??")))
    }

    fn has_untracked_files(&self) -> Result<bool> {
        Ok(self.status_lines()?.iter().any(|l| l.starts_with("??")))
    }

    fn save_working_state(&self, label: &str) -> Result<Option<String>> {
        let before = self.stash_top();
        self.runner.run_checked(&[
            "stash",
            "push",
            "--include-untracked",
            "--message",
            label,
        ])?;
        // stash push exits zero even when there was nothing to save, so a
        // new handle exists only if the top of the stash moved.
        match self.stash_top() {
            Some(sha) if before.as_deref() != Some(sha.as_str()) => Ok(Some(sha)),
            _ => Ok(None),
        }
    }

    fn restore_working_state(&self, handle: &str, keep: bool) -> Result<()> {
        self.runner.run_checked(&["stash", "apply", handle])?;
        if !keep {
            match self.stash_index_of(handle)? {
                Some(index) => {
                    self.runner
                        .run_checked(&["stash", "drop", &format!("stash@{{{index}}}")])?;
                }
                None => {
                    tracing::debug!(handle, "stash entry already gone, nothing to drop");
                }
            }
        }
        Ok(())
    }

    fn discard_working_state(&self, handle: &str) -> Result<()> {
        if let Some(index) = self.stash_index_of(handle)? {
            self.runner
                .run_checked(&["stash", "drop", &format!("stash@{{{index}}}")])?;
        }
        Ok(())
    }

    fn create_marker(&self, name: &str, revision: &str, payload: &str) -> Result<()> {
        self.runner
            .run_checked(&["tag", "--annotate", name, "--message", payload, revision])?;
        Ok(())
    }

    fn delete_marker(&self, name: &str) -> Result<()> {
        if self.marker_exists(name) {
            self.runner.run_checked(&["tag", "--delete", name])?;
        }
        Ok(())
    }

    fn read_marker(&self, name: &str) -> Result<String> {
        if !self.marker_exists(name) {
            return Err(Error::vcs("tag", format!("marker {name} does not exist")));
        }
        self.runner
            .run_checked(&["tag", "--list", name, "--format=%(contents)"])
    }

    fn list_markers(&self, prefix: &str) -> Result<Vec<String>> {
        let listing = self
            .runner
            .run_checked(&["tag", "--list", &format!("{prefix}/*")])?;
        Ok(listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn hard_reset_to(&self, revision: &str) -> Result<()> {
        self.runner.run_checked(&["reset", "--hard", revision])?;
        Ok(())
    }

    fn diff_summary(&self, from: &str, to: Option<&str>) -> Result<String> {
        match to {
            Some(to) => self
                .runner
                .run_checked(&["diff", "--stat", &format!("{from}..{to}")]),
            None => self.runner.run_checked(&["diff", "--stat", from]),
        }
    }

    fn user_name(&self) -> Result<String> {
        if let Ok(name) = self.runner.run_checked(&["config", "user.name"]) {
            if !name.is_empty() {
                return Ok(name);
            }
        }
        Ok(env::var("USER").unwrap_or_else(|_| "unknown".to_string()))
    }
}
