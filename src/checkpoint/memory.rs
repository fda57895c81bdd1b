//! In-process checkpoint store.

use super::{Checkpoint, CheckpointStore};
use crate::domain::{OrchestratorResult, WorkflowId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<WorkflowId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<WorkflowId, Checkpoint>> {
        self.checkpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn read(&self, workflow_id: WorkflowId) -> OrchestratorResult<Option<Checkpoint>> {
        Ok(self.lock().get(&workflow_id).cloned())
    }

    async fn write(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()> {
        self.lock()
            .insert(checkpoint.workflow_id, checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, workflow_id: WorkflowId) -> OrchestratorResult<()> {
        self.lock().remove(&workflow_id);
        Ok(())
    }
}
