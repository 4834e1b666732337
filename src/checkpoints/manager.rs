//! Checkpoint lifecycle orchestration
//!
//! The manager owns the registry index and drives the VCS adapter.
//! Creation is all-or-nothing: the marker must exist in the repository
//! before the registry is touched. Rollback is destructive to current
//! uncommitted changes; callers obtain confirmation before invoking it.
//! Every mutating operation holds the advisory operation lock for its full
//! duration.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fs::{OperationLock, Registry, RegistryStore, StashTombstone, StateDir};
use crate::tracker::TaskTracker;
use crate::vcs::Vcs;

use super::types::{marker_name, Checkpoint, CheckpointKind, MARKER_NAMESPACE};

/// Length of the generated checkpoint id token.
const ID_LEN: usize = 8;

pub struct CheckpointManager<V: Vcs> {
    vcs: V,
    store: RegistryStore,
    lock_path: PathBuf,
    tracker: Option<Box<dyn TaskTracker>>,
}

/// Aggregate result of [`CheckpointManager::cleanup_old_checkpoints`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Checkpoints fully removed: marker, stash and registry entry.
    pub removed: usize,
    /// Checkpoints retained because some resource could not be deleted.
    pub failed: usize,
}

impl CleanupOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

impl<V: Vcs> CheckpointManager<V> {
    pub fn new(vcs: V, state: &StateDir) -> Result<Self> {
        state.ensure()?;
        Ok(Self {
            vcs,
            store: RegistryStore::new(state.registry_path()),
            lock_path: state.lock_path(),
            tracker: None,
        })
    }

    pub fn with_tracker(mut self, tracker: Box<dyn TaskTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// True if the working tree has tracked or untracked modifications.
    pub fn working_tree_dirty(&self) -> Result<bool> {
        Ok(self.vcs.has_pending_changes()? || self.vcs.has_untracked_files()?)
    }

    /// Record a new checkpoint at the current repository position.
    ///
    /// Creation is observationally transparent: a dirty tree is stashed and
    /// immediately reapplied, so the tree is byte-for-byte identical before
    /// and after the call. Repeated calls with unchanged inputs produce
    /// distinct checkpoints; deduplication is the integration layer's
    /// policy, not the manager's.
    pub fn create_checkpoint(
        &mut self,
        phase: &str,
        kind: CheckpointKind,
        task_id: Option<&str>,
        workflow_state: Option<&str>,
        description: Option<&str>,
    ) -> Result<Checkpoint> {
        let _lock = OperationLock::acquire(&self.lock_path)?;
        let mut registry = self.store.load()?;

        // Id uniqueness is settled against the registry before any
        // repository effect.
        let id = fresh_id(&registry);
        let marker = marker_name(phase, kind, &id);

        let has_uncommitted =
            self.vcs.has_pending_changes()? || self.vcs.has_untracked_files()?;
        let stash_ref = if has_uncommitted {
            let label = format!("backstitch {kind} checkpoint {id} ({phase})");
            match self.vcs.save_working_state(&label)? {
                Some(handle) => {
                    // Reapply at once so creation is invisible to the tree.
                    self.vcs.restore_working_state(&handle, true)?;
                    Some(handle)
                }
                None => None,
            }
        } else {
            None
        };

        let workflow_state = workflow_state
            .map(str::to_string)
            .or_else(|| {
                task_id.and_then(|task| {
                    self.tracker
                        .as_ref()
                        .and_then(|tracker| tracker.get_task_state(task))
                })
            })
            .unwrap_or_else(|| "unknown".to_string());

        let checkpoint = Checkpoint {
            id: id.clone(),
            task_id: task_id.map(str::to_string),
            phase: phase.to_string(),
            checkpoint_type: kind,
            branch: self.vcs.current_branch()?,
            commit_hash: self.vcs.current_revision()?,
            has_uncommitted: stash_ref.is_some(),
            stash_ref,
            workflow_state,
            previous_phase: registry.most_recent().map(|c| c.phase.clone()),
            timestamp: Utc::now(),
            description: description.map(str::to_string),
            user: self.vcs.user_name()?,
        };

        let payload = serde_json::to_string_pretty(&checkpoint)
            .map_err(|source| Error::Serialize { what: "checkpoint", source })?;
        if let Err(e) = self.vcs.create_marker(&marker, &checkpoint.commit_hash, &payload) {
            if let Some(handle) = &checkpoint.stash_ref {
                // The tree was already restored; the stash stays behind as
                // a data anchor rather than being destroyed on the error
                // path.
                warn!(handle = %handle, "marker creation failed, leaving saved stash in place");
            }
            return Err(e);
        }

        registry.checkpoints.push(checkpoint.clone());
        registry.current_checkpoint_id = Some(id);
        self.store.save(&registry)?;

        debug!(id = %checkpoint.id, phase, kind = %kind, "checkpoint created");
        Ok(checkpoint)
    }

    /// Restore the repository to a recorded checkpoint.
    ///
    /// Destroys current uncommitted changes to tracked files; the caller
    /// has already confirmed that. Returns whether the reset and any stash
    /// restore fully succeeded; a stash that was consumed by an earlier
    /// rollback (or fails to apply) yields `Ok(false)` with the commit
    /// state restored.
    pub fn rollback_to_checkpoint(
        &mut self,
        id: &str,
        restore_workflow_state: bool,
    ) -> Result<bool> {
        let _lock = OperationLock::acquire(&self.lock_path)?;
        let mut registry = self.store.load()?;
        let checkpoint = registry
            .find(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        self.vcs.hard_reset_to(&checkpoint.commit_hash)?;

        let mut stash_restored = true;
        if let Some(handle) = &checkpoint.stash_ref {
            if registry.stash_consumed(&checkpoint.id) {
                warn!(
                    id,
                    handle = %handle,
                    "stash already consumed by an earlier rollback, restoring commit state only"
                );
                stash_restored = false;
            } else {
                match self.vcs.restore_working_state(handle, false) {
                    Ok(()) => registry.consumed_stashes.push(StashTombstone {
                        checkpoint_id: checkpoint.id.clone(),
                        stash_ref: handle.clone(),
                        consumed_at: Utc::now(),
                    }),
                    Err(e) => {
                        warn!(
                            id,
                            handle = %handle,
                            error = %e,
                            "failed to restore stashed changes, stash left intact"
                        );
                        stash_restored = false;
                    }
                }
            }
        }

        registry.current_checkpoint_id = Some(checkpoint.id.clone());
        self.store.save(&registry)?;

        if restore_workflow_state {
            if let (Some(task_id), Some(tracker)) = (&checkpoint.task_id, self.tracker.as_ref()) {
                // The repository is already correctly restored; a tracker
                // failure degrades to a warning.
                if !tracker.set_task_state(task_id, &checkpoint.workflow_state) {
                    warn!(
                        task_id = %task_id,
                        state = %checkpoint.workflow_state,
                        "task tracker rejected workflow state update"
                    );
                }
            }
        }

        debug!(id, restored = stash_restored, "rollback complete");
        Ok(stash_restored)
    }

    /// Checkpoints matching the filters, newest first. Pure read.
    pub fn list_checkpoints(
        &self,
        task_id: Option<&str>,
        phase: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Checkpoint>> {
        let registry = self.store.load()?;
        let mut entries: Vec<(usize, Checkpoint)> = registry
            .checkpoints
            .into_iter()
            .enumerate()
            .filter(|(_, c)| task_id.map_or(true, |t| c.task_id.as_deref() == Some(t)))
            .filter(|(_, c)| phase.map_or(true, |p| c.phase == p))
            .collect();
        entries.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(b.0.cmp(&a.0)));
        Ok(entries.into_iter().take(limit).map(|(_, c)| c).collect())
    }

    pub fn get_checkpoint(&self, id: &str) -> Result<Checkpoint> {
        self.store
            .load()?
            .find(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// The checkpoint the registry's "most recent" pointer names, if any.
    pub fn current_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let registry = self.store.load()?;
        Ok(registry
            .current_checkpoint_id
            .as_ref()
            .and_then(|id| registry.find(id))
            .cloned())
    }

    /// Summary of what changed between a checkpoint's commit and the
    /// working tree.
    pub fn diff_since(&self, id: &str) -> Result<String> {
        let checkpoint = self.get_checkpoint(id)?;
        self.vcs.diff_summary(&checkpoint.commit_hash, None)
    }

    /// Re-read every marker payload from the repository's object store.
    ///
    /// This is the recovery path when the registry file is lost or
    /// unreadable: markers anchor the same records independently. Read-only
    /// by design - the registry is never written back here.
    pub fn recover_from_markers(&self) -> Result<Vec<Checkpoint>> {
        let mut recovered = Vec::new();
        for name in self.vcs.list_markers(MARKER_NAMESPACE)? {
            let payload = self.vcs.read_marker(&name)?;
            match serde_json::from_str::<Checkpoint>(&payload) {
                Ok(checkpoint) => recovered.push(checkpoint),
                Err(e) => {
                    warn!(marker = %name, error = %e, "skipping marker with unparsable payload");
                }
            }
        }
        recovered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(recovered)
    }

    /// Delete markers, stashes and registry entries for everything beyond
    /// the `keep_count` most recent checkpoints.
    ///
    /// A failure on any individual item is logged and skipped; the entry
    /// stays in the registry for a later attempt. Returns how many were
    /// actually removed and how many failed.
    pub fn cleanup_old_checkpoints(&mut self, keep_count: usize) -> Result<CleanupOutcome> {
        let _lock = OperationLock::acquire(&self.lock_path)?;
        let mut registry = self.store.load()?;

        let mut indexed: Vec<(usize, &Checkpoint)> =
            registry.checkpoints.iter().enumerate().collect();
        indexed.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(b.0.cmp(&a.0)));
        let expired: Vec<Checkpoint> = indexed
            .into_iter()
            .skip(keep_count)
            .map(|(_, c)| c.clone())
            .collect();

        let mut outcome = CleanupOutcome::default();
        let mut removed_ids: Vec<String> = Vec::new();
        for checkpoint in &expired {
            let mut intact = true;
            if let Err(e) = self.vcs.delete_marker(&checkpoint.marker_name()) {
                warn!(
                    id = %checkpoint.id,
                    error = %e,
                    "failed to delete checkpoint marker, keeping entry for a later attempt"
                );
                intact = false;
            }
            if intact {
                if let Some(handle) = &checkpoint.stash_ref {
                    if !registry.stash_consumed(&checkpoint.id) {
                        if let Err(e) = self.vcs.discard_working_state(handle) {
                            warn!(
                                id = %checkpoint.id,
                                handle = %handle,
                                error = %e,
                                "failed to drop checkpoint stash, keeping entry for a later attempt"
                            );
                            intact = false;
                        }
                    }
                }
            }
            if intact {
                outcome.removed += 1;
                removed_ids.push(checkpoint.id.clone());
            } else {
                outcome.failed += 1;
            }
        }

        registry
            .checkpoints
            .retain(|c| !removed_ids.contains(&c.id));
        registry
            .consumed_stashes
            .retain(|t| !removed_ids.contains(&t.checkpoint_id));
        if let Some(current) = registry.current_checkpoint_id.clone() {
            if !registry.contains(&current) {
                registry.current_checkpoint_id = registry.most_recent().map(|c| c.id.clone());
            }
        }
        self.store.save(&registry)?;

        debug!(removed = outcome.removed, failed = outcome.failed, "cleanup finished");
        Ok(outcome)
    }
}

/// Generate a short id that does not collide with any registry entry.
fn fresh_id(registry: &Registry) -> String {
    loop {
        let full = Uuid::new_v4().simple().to_string();
        let id = full[..ID_LEN].to_string();
        if !registry.contains(&id) {
            return id;
        }
    }
}
