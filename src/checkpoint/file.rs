//! One JSON file per workflow under the checkpoints directory.

use super::{Checkpoint, CheckpointStore};
use crate::domain::{OrchestratorError, OrchestratorResult, WorkflowId};
use crate::paths::write_json_atomic;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, workflow_id: WorkflowId) -> PathBuf {
        self.dir.join(format!("{}.json", workflow_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self, workflow_id: WorkflowId) -> OrchestratorResult<Option<Checkpoint>> {
        let path = self.path_for(workflow_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OrchestratorError::storage(e)),
        };
        let checkpoint = serde_json::from_str(&content).map_err(|e| {
            OrchestratorError::Storage(format!("corrupt checkpoint {}: {}", path.display(), e))
        })?;
        Ok(Some(checkpoint))
    }

    async fn write(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()> {
        write_json_atomic(&self.path_for(checkpoint.workflow_id), checkpoint)
            .map_err(|e| OrchestratorError::Storage(format!("{e:#}")))
    }

    async fn delete(&self, workflow_id: WorkflowId) -> OrchestratorResult<()> {
        match std::fs::remove_file(self.path_for(workflow_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OrchestratorError::storage(e)),
        }
    }
}
