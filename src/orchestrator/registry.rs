//! In-memory registry of running workflow tasks.
//!
//! Every task, planning or executing, occupies its worktree; at most one entry
//! exists per worktree path. Entries are inserted only under the service's
//! start lock and removed by the [`TaskGuard`] owned by the task itself.

use crate::domain::{WorkflowId, WorktreePath};
use crate::events::EventBus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct ActiveTask {
    pub workflow_id: WorkflowId,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ActiveTask {
    pub fn new(workflow_id: WorkflowId, cancel: watch::Sender<bool>, handle: JoinHandle<()>) -> Self {
        Self {
            workflow_id,
            cancel,
            handle,
        }
    }

    /// Signals cancellation and waits for the task to finish.
    ///
    /// Aborts the task if it has not reached a node boundary within `grace`.
    pub async fn stop(self, grace: Duration) {
        let Self {
            workflow_id,
            cancel,
            mut handle,
        } = self;
        let _ = cancel.send(true);

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => debug!(%workflow_id, "Task stopped"),
            Ok(Err(err)) => warn!(%workflow_id, error = %err, "Task ended abnormally"),
            Err(_) => {
                warn!(%workflow_id, ?grace, "Task did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    worktrees: Mutex<HashMap<WorktreePath, ActiveTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn worktrees(&self) -> std::sync::MutexGuard<'_, HashMap<WorktreePath, ActiveTask>> {
        self.worktrees
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Workflow currently running against `worktree`, if any.
    pub fn occupant(&self, worktree: &WorktreePath) -> Option<WorkflowId> {
        self.worktrees().get(worktree).map(|task| task.workflow_id)
    }

    pub fn insert(&self, worktree: WorktreePath, task: ActiveTask) {
        if let Some(previous) = self.worktrees().insert(worktree, task) {
            warn!(workflow_id = %previous.workflow_id, "Replaced a registered task");
        }
    }

    /// Removes the worktree's entry if it still belongs to `workflow_id`.
    pub fn release(&self, worktree: &WorktreePath, workflow_id: WorkflowId) {
        let mut worktrees = self.worktrees();
        if worktrees.get(worktree).map(|t| t.workflow_id) == Some(workflow_id) {
            worktrees.remove(worktree);
        }
    }

    /// Removes and returns every task belonging to `workflow_id`.
    pub fn take(&self, workflow_id: WorkflowId) -> Vec<ActiveTask> {
        let mut worktrees = self.worktrees();
        let paths: Vec<WorktreePath> = worktrees
            .iter()
            .filter(|(_, task)| task.workflow_id == workflow_id)
            .map(|(path, _)| path.clone())
            .collect();
        paths
            .into_iter()
            .filter_map(|path| worktrees.remove(&path))
            .collect()
    }

    pub fn take_all(&self) -> Vec<ActiveTask> {
        self.worktrees().drain().map(|(_, task)| task).collect()
    }

    pub fn is_running(&self, workflow_id: WorkflowId) -> bool {
        self.worktrees()
            .values()
            .any(|t| t.workflow_id == workflow_id)
    }

    pub fn active_workflows(&self) -> Vec<WorkflowId> {
        self.worktrees()
            .values()
            .map(|task| task.workflow_id)
            .collect()
    }
}

/// Owned by a running task; releases its worktree and sequence counter
/// however the task ends.
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    events: Arc<EventBus>,
    worktree: WorktreePath,
    workflow_id: WorkflowId,
}

impl TaskGuard {
    pub fn new(
        registry: Arc<TaskRegistry>,
        events: Arc<EventBus>,
        worktree: WorktreePath,
        workflow_id: WorkflowId,
    ) -> Self {
        Self {
            registry,
            events,
            worktree,
            workflow_id,
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.registry.release(&self.worktree, self.workflow_id);
        self.events.forget(self.workflow_id);
        debug!(workflow_id = %self.workflow_id, worktree = %self.worktree, "Released worktree");
    }
}
