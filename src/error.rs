//! Error taxonomy for checkpoint operations
//!
//! Manager operations propagate these unchanged to the caller; the one
//! exception is cleanup, which converts per-item failures into
//! skip-and-continue counts.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A git subprocess exited non-zero or produced unusable output.
    #[error("git {command} failed: {detail}")]
    Vcs { command: String, detail: String },

    /// A git subprocess exceeded its wall-clock bound.
    #[error("git {command} timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// No checkpoint with this id exists in the registry.
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    /// The on-disk registry exists but does not parse. Write paths must
    /// abort on this; rebuilding an empty registry over it would discard
    /// the only index of existing checkpoints.
    #[error("checkpoint registry at {} is corrupted: {source}", .path.display())]
    CorruptRegistry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Another process holds the operation lock.
    #[error("checkpoint lock at {} is held by {holder}", .path.display())]
    Locked { path: PathBuf, holder: String },

    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

impl Error {
    pub(crate) fn vcs(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Vcs {
            command: command.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn io(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
