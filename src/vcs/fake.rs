//! In-memory [`Vcs`] for unit tests
//!
//! Records every mutating call so tests can assert ordering, and exposes
//! failure switches for the paths that must abort cleanly.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

use super::Vcs;

pub struct FakeVcs {
    pub branch: String,
    pub revision: RefCell<String>,
    pub pending: Cell<bool>,
    pub untracked: Cell<bool>,
    pub stashes: RefCell<Vec<String>>,
    pub markers: RefCell<BTreeMap<String, (String, String)>>,
    pub ops: RefCell<Vec<String>>,
    pub fail_markers: Cell<bool>,
    pub fail_restore: Cell<bool>,
    pub fail_delete_of: RefCell<Option<String>>,
    next_stash: Cell<u32>,
}

impl FakeVcs {
    pub fn clean() -> Self {
        Self {
            branch: "main".to_string(),
            revision: RefCell::new("rev0".to_string()),
            pending: Cell::new(false),
            untracked: Cell::new(false),
            stashes: RefCell::new(Vec::new()),
            markers: RefCell::new(BTreeMap::new()),
            ops: RefCell::new(Vec::new()),
            fail_markers: Cell::new(false),
            fail_restore: Cell::new(false),
            fail_delete_of: RefCell::new(None),
            next_stash: Cell::new(0),
        }
    }

    pub fn dirty() -> Self {
        let fake = Self::clean();
        fake.pending.set(true);
        fake
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.borrow().clone()
    }

    fn record(&self, op: String) {
        self.ops.borrow_mut().push(op);
    }
}

impl Vcs for FakeVcs {
    fn current_branch(&self) -> Result<String> {
        Ok(self.branch.clone())
    }

    fn current_revision(&self) -> Result<String> {
        Ok(self.revision.borrow().clone())
    }

    fn has_pending_changes(&self) -> Result<bool> {
        Ok(self.pending.get())
    }

    fn has_untracked_files(&self) -> Result<bool> {
        Ok(self.untracked.get())
    }

    fn save_working_state(&self, _label: &str) -> Result<Option<String>> {
        if !self.pending.get() && !self.untracked.get() {
            return Ok(None);
        }
        let n = self.next_stash.get();
        self.next_stash.set(n + 1);
        let handle = format!("stash{n:04}");
        self.stashes.borrow_mut().push(handle.clone());
        self.pending.set(false);
        self.untracked.set(false);
        self.record(format!("save {handle}"));
        Ok(Some(handle))
    }

    fn restore_working_state(&self, handle: &str, keep: bool) -> Result<()> {
        if self.fail_restore.get() {
            return Err(Error::vcs("stash", "injected restore failure"));
        }
        if !self.stashes.borrow().iter().any(|s| s == handle) {
            return Err(Error::vcs("stash", format!("unknown stash handle {handle}")));
        }
        self.pending.set(true);
        if !keep {
            self.stashes.borrow_mut().retain(|s| s != handle);
        }
        self.record(format!("restore {handle} keep={keep}"));
        Ok(())
    }

    fn discard_working_state(&self, handle: &str) -> Result<()> {
        self.stashes.borrow_mut().retain(|s| s != handle);
        self.record(format!("discard {handle}"));
        Ok(())
    }

    fn create_marker(&self, name: &str, revision: &str, payload: &str) -> Result<()> {
        if self.fail_markers.get() {
            return Err(Error::vcs("tag", "injected marker failure"));
        }
        self.markers
            .borrow_mut()
            .insert(name.to_string(), (revision.to_string(), payload.to_string()));
        self.record(format!("marker {name}"));
        Ok(())
    }

    fn delete_marker(&self, name: &str) -> Result<()> {
        if self.fail_delete_of.borrow().as_deref() == Some(name) {
            return Err(Error::vcs("tag", "injected delete failure"));
        }
        self.markers.borrow_mut().remove(name);
        self.record(format!("unmark {name}"));
        Ok(())
    }

    fn read_marker(&self, name: &str) -> Result<String> {
        self.markers
            .borrow()
            .get(name)
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| Error::vcs("tag", format!("marker {name} does not exist")))
    }

    fn list_markers(&self, prefix: &str) -> Result<Vec<String>> {
        let namespace = format!("{prefix}/");
        Ok(self
            .markers
            .borrow()
            .keys()
            .filter(|k| k.starts_with(&namespace))
            .cloned()
            .collect())
    }

    fn hard_reset_to(&self, revision: &str) -> Result<()> {
        *self.revision.borrow_mut() = revision.to_string();
        self.pending.set(false);
        self.record(format!("reset {revision}"));
        Ok(())
    }

    fn diff_summary(&self, from: &str, to: Option<&str>) -> Result<String> {
        Ok(format!("{from}..{}", to.unwrap_or("worktree")))
    }

    fn user_name(&self) -> Result<String> {
        Ok("tester".to_string())
    }
}
