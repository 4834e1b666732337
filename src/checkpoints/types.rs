//! Checkpoint record types
//!
//! A checkpoint pairs a repository position (branch + commit) with an
//! optional stash of uncommitted deltas, tagged with workflow metadata.
//! Records are immutable once created; cleanup is the only way they leave
//! the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Namespace prefix for all marker refs written by this crate.
pub const MARKER_NAMESPACE: &str = "backstitch";

/// What triggered a checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Taken automatically before a workflow phase runs.
    PrePhase,
    /// Taken automatically after a workflow phase succeeded.
    PostPhase,
    /// Requested explicitly by a user.
    Manual,
    /// Taken by an automated policy outside the phase bracket.
    Auto,
}

impl CheckpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointKind::PrePhase => "pre_phase",
            CheckpointKind::PostPhase => "post_phase",
            CheckpointKind::Manual => "manual",
            CheckpointKind::Auto => "auto",
        }
    }
}

impl std::fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CheckpointKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pre_phase" | "pre-phase" => Ok(CheckpointKind::PrePhase),
            "post_phase" | "post-phase" => Ok(CheckpointKind::PostPhase),
            "manual" => Ok(CheckpointKind::Manual),
            "auto" => Ok(CheckpointKind::Auto),
            _ => Err(Error::Invalid {
                what: "checkpoint kind",
                value: s.to_string(),
            }),
        }
    }
}

/// One recorded recovery point.
///
/// `commit_hash` resolves in the repository at capture time, and when
/// `has_uncommitted` is true, `stash_ref` holds a resolvable handle until a
/// rollback consumes it or cleanup removes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub task_id: Option<String>,
    pub phase: String,
    pub checkpoint_type: CheckpointKind,
    pub branch: String,
    pub commit_hash: String,
    pub stash_ref: Option<String>,
    pub has_uncommitted: bool,
    pub workflow_state: String,
    pub previous_phase: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
    pub user: String,
}

impl Checkpoint {
    /// Marker ref name anchoring this checkpoint in the repository.
    pub fn marker_name(&self) -> String {
        marker_name(&self.phase, self.checkpoint_type, &self.id)
    }
}

/// Marker ref name for a checkpoint, namespaced by phase, kind and id.
pub fn marker_name(phase: &str, kind: CheckpointKind, id: &str) -> String {
    format!(
        "{MARKER_NAMESPACE}/{}/{kind}/{id}",
        sanitize_ref_component(phase)
    )
}

/// Make a free-form phase name safe for use inside a git ref.
pub(crate) fn sanitize_ref_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    // Refs may not begin or end with '.' or '-' segments.
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "phase".to_string()
    } else {
        trimmed.to_string()
    }
}
