//! On-disk state for the checkpoint subsystem
//!
//! This module provides:
//! - The private state directory layout (`.backstitch/`)
//! - Atomic registry document I/O
//! - The advisory operation lock

pub mod locking;
pub mod registry;
pub mod state_dir;

pub use locking::OperationLock;
pub use registry::{Registry, RegistryStore, StashTombstone};
pub use state_dir::{StateDir, STATE_DIR_NAME};
