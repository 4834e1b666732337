//! Workflow checkpoint policy
//!
//! The orchestrator's configuration pipeline deserializes into this type;
//! `load` is a convenience for reading it straight from a YAML file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vcs::DEFAULT_GIT_TIMEOUT;
use crate::workflow::CheckpointStrategy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckpointConfig {
    /// When the integration layer creates automatic checkpoints.
    pub strategy: CheckpointStrategy,
    /// Wall-clock bound for a single git invocation, in seconds.
    pub git_timeout_secs: u64,
    /// How many checkpoints cleanup keeps.
    pub keep_count: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            strategy: CheckpointStrategy::BeforeModify,
            git_timeout_secs: DEFAULT_GIT_TIMEOUT.as_secs(),
            keep_count: 20,
        }
    }
}

impl CheckpointConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io("read", path, e))?;
        serde_yaml::from_str(&raw).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}
