//! JSON-file repository.
//!
//! Layout under the data directory:
//! - `workflows/<id>.json` - one record per workflow, replaced atomically
//! - `events.jsonl` - append-only lifecycle events, guarded by a file lock

use super::{WorkflowFilter, WorkflowRepository};
use crate::domain::{
    OrchestratorError, OrchestratorResult, Workflow, WorkflowChanges, WorkflowId, WorkflowStatus,
};
use crate::events::EventRecord;
use crate::paths::{events_log_path, workflows_dir, write_json_atomic};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug)]
pub struct FileRepository {
    workflows_dir: PathBuf,
    events_path: PathBuf,
    /// Serializes read-modify-write of workflow records within this process.
    write_lock: Mutex<()>,
}

impl FileRepository {
    pub fn open(data_dir: &Path) -> OrchestratorResult<Self> {
        let workflows_dir = workflows_dir(data_dir);
        std::fs::create_dir_all(&workflows_dir).map_err(OrchestratorError::storage)?;
        Ok(Self {
            workflows_dir,
            events_path: events_log_path(data_dir),
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, id: WorkflowId) -> PathBuf {
        self.workflows_dir.join(format!("{}.json", id))
    }

    fn read_record(&self, id: WorkflowId) -> OrchestratorResult<Option<Workflow>> {
        let content = match std::fs::read_to_string(self.record_path(id)) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OrchestratorError::storage(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| OrchestratorError::Storage(format!("corrupt workflow {}: {}", id, e)))
    }

    fn write_record(&self, workflow: &Workflow) -> OrchestratorResult<()> {
        write_json_atomic(&self.record_path(workflow.id()), workflow)
            .map_err(|e| OrchestratorError::Storage(format!("{e:#}")))
    }

    fn load_all(&self) -> OrchestratorResult<Vec<Workflow>> {
        let entries = std::fs::read_dir(&self.workflows_dir).map_err(OrchestratorError::storage)?;
        let mut workflows = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<Workflow>(&c).map_err(|e| e.to_string()));
            match parsed {
                Ok(workflow) => workflows.push(workflow),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable workflow record"),
            }
        }
        Ok(workflows)
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_events(&self, id: WorkflowId) -> OrchestratorResult<Vec<EventRecord>> {
        let file = match File::open(&self.events_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OrchestratorError::storage(e)),
        };
        file.lock_shared().map_err(OrchestratorError::storage)?;

        let mut events = Vec::new();
        for line in BufReader::new(&file).lines() {
            let line = line.map_err(OrchestratorError::storage)?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EventRecord = serde_json::from_str(&line)
                .map_err(|e| OrchestratorError::Storage(format!("corrupt event log: {}", e)))?;
            if record.workflow_id == id {
                events.push(record);
            }
        }
        let _ = FileExt::unlock(&file);
        Ok(events)
    }
}

#[async_trait]
impl WorkflowRepository for FileRepository {
    async fn get(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        self.read_record(id)?.ok_or(OrchestratorError::NotFound(id))
    }

    async fn create(&self, workflow: &Workflow) -> OrchestratorResult<()> {
        let _guard = self.guard();
        if self.record_path(workflow.id()).exists() {
            return Err(OrchestratorError::Storage(format!(
                "workflow {} already exists",
                workflow.id()
            )));
        }
        self.write_record(workflow)
    }

    async fn update(&self, workflow: &Workflow) -> OrchestratorResult<()> {
        let _guard = self.guard();
        if !self.record_path(workflow.id()).exists() {
            return Err(OrchestratorError::NotFound(workflow.id()));
        }
        self.write_record(workflow)
    }

    async fn set_status(
        &self,
        id: WorkflowId,
        status: WorkflowStatus,
        extras: WorkflowChanges,
    ) -> OrchestratorResult<Workflow> {
        let _guard = self.guard();
        let current = self.read_record(id)?.ok_or(OrchestratorError::NotFound(id))?;
        let next = current.with_changes(extras.status(status));
        self.write_record(&next)?;
        Ok(next)
    }

    async fn find_by_status(&self, statuses: &[WorkflowStatus]) -> OrchestratorResult<Vec<Workflow>> {
        let filter = WorkflowFilter {
            statuses: statuses.to_vec(),
            ..WorkflowFilter::default()
        };
        self.list(&filter).await
    }

    async fn list(&self, filter: &WorkflowFilter) -> OrchestratorResult<Vec<Workflow>> {
        Ok(filter.apply(self.load_all()?))
    }

    async fn append_event(&self, event: &EventRecord) -> OrchestratorResult<()> {
        if let Some(parent) = self.events_path.parent() {
            std::fs::create_dir_all(parent).map_err(OrchestratorError::storage)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .map_err(OrchestratorError::storage)?;
        file.lock_exclusive().map_err(OrchestratorError::storage)?;

        let line = serde_json::to_string(event).map_err(OrchestratorError::storage)?;
        writeln!(file, "{}", line).map_err(OrchestratorError::storage)?;
        file.flush().map_err(OrchestratorError::storage)?;
        file.sync_all().map_err(OrchestratorError::storage)?;
        let _ = FileExt::unlock(&file);
        Ok(())
    }

    async fn get_max_sequence(&self, id: WorkflowId) -> OrchestratorResult<u64> {
        Ok(self
            .read_events(id)?
            .iter()
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn events_after(&self, id: WorkflowId, after: u64) -> OrchestratorResult<Vec<EventRecord>> {
        let mut events: Vec<EventRecord> = self
            .read_events(id)?
            .into_iter()
            .filter(|e| e.sequence > after)
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }
}
