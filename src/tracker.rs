//! Task tracker collaborator
//!
//! The tracker is a best-effort sink/source for a workflow-state label tied
//! to a task id. The repository is the system of record; tracker failures
//! never abort a checkpoint operation.

/// Consumed interface of the external task-tracking system.
pub trait TaskTracker {
    /// Current workflow-state label for a task, if the tracker knows one.
    fn get_task_state(&self, task_id: &str) -> Option<String>;

    /// Record a new workflow-state label. Returns false on failure and
    /// never raises; the caller logs and continues.
    fn set_task_state(&self, task_id: &str, state: &str) -> bool;
}

/// Tracker that knows nothing and accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracker;

impl TaskTracker for NullTracker {
    fn get_task_state(&self, _task_id: &str) -> Option<String> {
        None
    }

    fn set_task_state(&self, _task_id: &str, _state: &str) -> bool {
        true
    }
}
