//! Private state directory layout
//!
//! All of this tool's on-disk state lives under `.backstitch/` at the
//! project root: the registry document and the operation lock file. The
//! directory is an explicit, injected dependency so tests can point it at a
//! temporary location.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory name holding private state, relative to the project root.
pub const STATE_DIR_NAME: &str = ".backstitch";

#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new<P: AsRef<Path>>(project_root: P) -> Self {
        Self {
            root: project_root.as_ref().join(STATE_DIR_NAME),
        }
    }

    /// Walk up from `start` to the nearest directory that already contains
    /// a state directory.
    pub fn discover(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .find(|a| a.join(STATE_DIR_NAME).is_dir())
            .map(Self::new)
    }

    /// Create the directory if needed and keep it out of the surrounding
    /// repository's view.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::io("create directory", &self.root, e))?;
        self.ensure_excluded();
        Ok(())
    }

    /// Add the state directory to `.git/info/exclude` when the project root
    /// is a git repository. The registry and lock must never ride along in
    /// a stash or show up as untracked files; restoring an old stash over
    /// the live registry would corrupt the index. Best-effort: a project
    /// that is not a repository is left alone.
    fn ensure_excluded(&self) {
        let Some(project_root) = self.project_root() else {
            return;
        };
        let info_dir = project_root.join(".git").join("info");
        if !info_dir.is_dir() {
            return;
        }
        let exclude_path = info_dir.join("exclude");
        let existing = fs::read_to_string(&exclude_path).unwrap_or_default();
        let line = format!("/{STATE_DIR_NAME}/");
        if existing.lines().any(|l| l.trim() == line) {
            return;
        }
        let mut content = existing;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&line);
        content.push('\n');
        if let Err(e) = fs::write(&exclude_path, content) {
            tracing::debug!(
                path = %exclude_path.display(),
                error = %e,
                "could not update git exclude file"
            );
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("lock")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project root (parent of the state directory).
    pub fn project_root(&self) -> Option<&Path> {
        self.root.parent()
    }
}
