//! Workflow phase integration
//!
//! Brackets one phase of an externally orchestrated workflow with automatic
//! checkpoints: an optional pre-phase snapshot on entry driven by the
//! configured strategy, a post-phase snapshot on successful exit, and
//! nothing on failure so the pre-phase checkpoint stays the recovery
//! target.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checkpoints::{Checkpoint, CheckpointKind, CheckpointManager};
use crate::error::{Error, Result};
use crate::vcs::Vcs;

/// When the integration layer creates checkpoints on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStrategy {
    /// Never automatic - neither end of the bracket.
    Manual,
    /// Before phases declared as mutating.
    BeforeModify,
    /// Before every phase.
    BeforeAll,
    /// Only when the working tree is currently dirty.
    Smart,
}

impl CheckpointStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStrategy::Manual => "manual",
            CheckpointStrategy::BeforeModify => "before_modify",
            CheckpointStrategy::BeforeAll => "before_all",
            CheckpointStrategy::Smart => "smart",
        }
    }
}

impl std::fmt::Display for CheckpointStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CheckpointStrategy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(CheckpointStrategy::Manual),
            "before_modify" | "before-modify" => Ok(CheckpointStrategy::BeforeModify),
            "before_all" | "before-all" => Ok(CheckpointStrategy::BeforeAll),
            "smart" => Ok(CheckpointStrategy::Smart),
            _ => Err(Error::Invalid {
                what: "checkpoint strategy",
                value: s.to_string(),
            }),
        }
    }
}

/// Description of one phase about to run.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub phase: String,
    /// Whether the phase is declared to modify files.
    pub mutating: bool,
    pub task_id: Option<String>,
    pub workflow_state: Option<String>,
    pub description: Option<String>,
}

impl PhaseSpec {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            mutating: false,
            task_id: None,
            workflow_state: None,
            description: None,
        }
    }

    pub fn mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_workflow_state(mut self, state: impl Into<String>) -> Self {
        self.workflow_state = Some(state.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One phase in flight, returned by [`PhaseRunner::begin_phase`] and given
/// back to [`PhaseRunner::end_phase`].
#[derive(Debug)]
pub struct PhaseHandle {
    spec: PhaseSpec,
    pre_checkpoint: Option<Checkpoint>,
}

impl PhaseHandle {
    pub fn phase(&self) -> &str {
        &self.spec.phase
    }

    /// The recovery point taken on entry, when the strategy asked for one.
    pub fn pre_checkpoint(&self) -> Option<&Checkpoint> {
        self.pre_checkpoint.as_ref()
    }
}

/// Scoped-acquisition wrapper bracketing phase execution with checkpoints.
pub struct PhaseRunner<'a, V: Vcs> {
    manager: &'a mut CheckpointManager<V>,
    strategy: CheckpointStrategy,
}

impl<'a, V: Vcs> PhaseRunner<'a, V> {
    pub fn new(manager: &'a mut CheckpointManager<V>, strategy: CheckpointStrategy) -> Self {
        Self { manager, strategy }
    }

    /// Enter a phase, taking a pre-phase checkpoint if the strategy calls
    /// for one.
    pub fn begin_phase(&mut self, spec: PhaseSpec) -> Result<PhaseHandle> {
        let wanted = match self.strategy {
            CheckpointStrategy::Manual => false,
            CheckpointStrategy::BeforeModify => spec.mutating,
            CheckpointStrategy::BeforeAll => true,
            CheckpointStrategy::Smart => self.manager.working_tree_dirty()?,
        };
        let pre_checkpoint = if wanted {
            Some(self.manager.create_checkpoint(
                &spec.phase,
                CheckpointKind::PrePhase,
                spec.task_id.as_deref(),
                spec.workflow_state.as_deref(),
                spec.description.as_deref(),
            )?)
        } else {
            debug!(
                phase = %spec.phase,
                strategy = %self.strategy,
                "skipping pre-phase checkpoint"
            );
            None
        };
        Ok(PhaseHandle {
            spec,
            pre_checkpoint,
        })
    }

    /// Leave a phase. A successful phase gets a post-phase checkpoint
    /// (unless the strategy is `Manual`); a failed one gets nothing so the
    /// pre-phase checkpoint remains the recovery target.
    pub fn end_phase(
        &mut self,
        handle: PhaseHandle,
        success: bool,
    ) -> Result<Option<Checkpoint>> {
        if !success {
            debug!(
                phase = %handle.spec.phase,
                "phase failed, keeping pre-phase checkpoint as recovery target"
            );
            return Ok(None);
        }
        if self.strategy == CheckpointStrategy::Manual {
            return Ok(None);
        }
        let spec = handle.spec;
        let post = self.manager.create_checkpoint(
            &spec.phase,
            CheckpointKind::PostPhase,
            spec.task_id.as_deref(),
            spec.workflow_state.as_deref(),
            spec.description.as_deref(),
        )?;
        Ok(Some(post))
    }

    /// Run `body` bracketed by phase checkpoints.
    ///
    /// The body's own failure is re-raised unchanged, and no post-phase
    /// checkpoint is created on that path.
    pub fn run_phase<T, E>(
        &mut self,
        spec: PhaseSpec,
        body: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        let handle = self.begin_phase(spec)?;
        match body() {
            Ok(value) => {
                self.end_phase(handle, true)?;
                Ok(value)
            }
            Err(e) => {
                // end_phase on the failure path creates nothing and cannot
                // itself fail; the original error goes back untouched.
                let _ = self.end_phase(handle, false);
                Err(e)
            }
        }
    }
}
