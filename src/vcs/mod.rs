//! Version-control interaction
//!
//! Every repository effect in this crate goes through the narrow [`Vcs`]
//! trait: branch/revision queries, stash save/restore for uncommitted
//! deltas, tag-based markers, and hard reset. Operations are synchronous
//! blocking subprocess calls, never retried internally, and may fail with
//! [`crate::Error::Vcs`] or [`crate::Error::Timeout`].

mod git;
mod runner;

#[cfg(test)]
pub(crate) mod fake;

pub use git::GitVcs;
pub use runner::{GitOutput, GitRunner, DEFAULT_GIT_TIMEOUT};

use crate::error::Result;

/// Narrow synchronous interface over a version-control working copy.
pub trait Vcs {
    /// Name of the currently checked-out branch.
    ///
    /// Fails on a detached HEAD that does not resolve to a branch name.
    fn current_branch(&self) -> Result<String>;

    /// Content address of the current revision.
    fn current_revision(&self) -> Result<String>;

    /// True if tracked files have uncommitted modifications.
    fn has_pending_changes(&self) -> Result<bool>;

    /// True if untracked files are present.
    fn has_untracked_files(&self) -> Result<bool>;

    /// Capture all tracked and untracked deltas as a restorable snapshot,
    /// leaving the working tree clean. Returns `None` when there is nothing
    /// to save. The handle stays resolvable until consumed or discarded.
    fn save_working_state(&self, label: &str) -> Result<Option<String>>;

    /// Reapply a saved snapshot. `keep = true` leaves the handle in place
    /// for future reuse; `keep = false` consumes it.
    fn restore_working_state(&self, handle: &str, keep: bool) -> Result<()>;

    /// Remove a saved snapshot without applying it. A handle that is
    /// already gone is not an error.
    fn discard_working_state(&self, handle: &str) -> Result<()>;

    /// Attach a durable, addressable annotation carrying `payload` to
    /// `revision`, independent of any state file.
    fn create_marker(&self, name: &str, revision: &str, payload: &str) -> Result<()>;

    /// Remove a marker. Idempotent: a missing marker is not an error.
    fn delete_marker(&self, name: &str) -> Result<()>;

    /// Payload carried by an existing marker.
    fn read_marker(&self, name: &str) -> Result<String>;

    /// Names of all markers under `prefix/`.
    fn list_markers(&self, prefix: &str) -> Result<Vec<String>>;

    /// Reset the working tree and branch pointer to `revision`, destroying
    /// current uncommitted changes to tracked files. Callers confirm the
    /// destructive consequence before invoking this.
    fn hard_reset_to(&self, revision: &str) -> Result<()>;

    /// Human-readable summary of differences from `from` to `to`; `None`
    /// compares against the working tree.
    fn diff_summary(&self, from: &str, to: Option<&str>) -> Result<String>;

    /// Name recorded for checkpoints created by this user.
    fn user_name(&self) -> Result<String>;
}
