//! Checkpoint records and their lifecycle
//!
//! This module provides:
//! - The immutable [`Checkpoint`] record and its kind
//! - [`CheckpointManager`]: create, rollback, list, cleanup
//! - Marker naming for the in-repository durability anchor

mod manager;
mod types;

pub use manager::{CheckpointManager, CleanupOutcome};
pub use types::{marker_name, Checkpoint, CheckpointKind, MARKER_NAMESPACE};
