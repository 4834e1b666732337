//! Registry document I/O
//!
//! The registry is the single writer-owned index of checkpoints plus the
//! "most recent" pointer. The on-disk form is always either the previous
//! valid document or the new one: saves go through a temp file in the same
//! directory followed by an atomic rename, so a reader never observes a
//! half-written file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoints::Checkpoint;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Registry {
    pub checkpoints: Vec<Checkpoint>,
    pub current_checkpoint_id: Option<String>,
    /// Append-only record of stash handles consumed by rollbacks.
    /// Checkpoint records never change after creation, so consumption is
    /// tracked here instead; documents written before this field existed
    /// parse as having none.
    #[serde(default)]
    pub consumed_stashes: Vec<StashTombstone>,
}

/// One consumed-stash event, referencing the original checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashTombstone {
    pub checkpoint_id: String,
    pub stash_ref: String,
    pub consumed_at: DateTime<Utc>,
}

impl Registry {
    pub fn find(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn stash_consumed(&self, checkpoint_id: &str) -> bool {
        self.consumed_stashes
            .iter()
            .any(|t| t.checkpoint_id == checkpoint_id)
    }

    /// Newest checkpoint by timestamp; insertion order breaks ties so that
    /// two checkpoints created within one clock tick stay ordered.
    pub fn most_recent(&self) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then(a.0.cmp(&b.0)))
            .map(|(_, c)| c)
    }
}

pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry. A missing file is the empty registry; an
    /// unparsable file is [`Error::CorruptRegistry`], which write-capable
    /// callers must treat as fatal.
    pub fn load(&self) -> Result<Registry> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Registry::default()),
            Err(e) => return Err(Error::io("read", &self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|source| Error::CorruptRegistry {
            path: self.path.clone(),
            source,
        })
    }

    /// Persist atomically: write a sibling temp file, sync, then rename
    /// over the target.
    pub fn save(&self, registry: &Registry) -> Result<()> {
        let dir = self.path.parent().ok_or_else(|| {
            Error::io(
                "resolve parent of",
                &self.path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no parent directory"),
            )
        })?;
        let json = serde_json::to_string_pretty(registry)
            .map_err(|source| Error::Serialize { what: "registry", source })?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::io("create temp file in", dir, e))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| Error::io("write", temp.path().to_path_buf(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io("sync", temp.path().to_path_buf(), e))?;
        temp.persist(&self.path)
            .map_err(|e| Error::io("rename temp file to", &self.path, e.error))?;
        Ok(())
    }
}
