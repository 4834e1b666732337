//! Advisory operation lock
//!
//! Create, rollback and cleanup must not overlap on one working copy:
//! stash and reset operations assume exclusive ownership of the tree, and
//! the registry has a single-writer discipline. The lock is a dedicated
//! file under the state directory, held exclusively (`fs2`) for the
//! duration of one operation and released on drop. Advisory locks are
//! cooperative - all participants must go through this type.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;

use crate::error::{Error, Result};

/// Exclusive lock over the checkpoint state, released on drop.
///
/// The lock file records the holder's pid and acquisition time so a
/// contending process can report who it is waiting on.
#[derive(Debug)]
pub struct OperationLock {
    file: File,
    path: PathBuf,
}

impl OperationLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| Error::io("open lock file", path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                return Err(Error::Locked {
                    path: path.to_path_buf(),
                    holder: read_holder(&mut file),
                });
            }
            return Err(Error::io("lock", path, e));
        }

        // Record the holder. Truncate only after the lock is held so a
        // contending reader never sees an empty file.
        write_holder(&mut file)
            .map_err(|e| Error::io("write holder into lock file", path, e))?;

        tracing::debug!(path = %path.display(), "operation lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to release operation lock"
            );
        } else {
            tracing::debug!(path = %self.path.display(), "operation lock released");
        }
    }
}

fn write_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "pid {} at {}", std::process::id(), Utc::now().to_rfc3339())?;
    file.flush()
}

fn read_holder(file: &mut File) -> String {
    let mut holder = String::new();
    let _ = file.seek(SeekFrom::Start(0));
    let _ = file.read_to_string(&mut holder);
    let holder = holder.trim();
    if holder.is_empty() {
        "unknown process".to_string()
    } else {
        holder.to_string()
    }
}
