//! In-process repository used by tests and embedders.

use super::{WorkflowFilter, WorkflowRepository};
use crate::domain::{
    OrchestratorError, OrchestratorResult, Workflow, WorkflowChanges, WorkflowId, WorkflowStatus,
};
use crate::events::EventRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    workflows: HashMap<WorkflowId, Workflow>,
    events: Vec<EventRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WorkflowRepository for MemoryRepository {
    async fn get(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        self.tables()
            .workflows
            .get(&id)
            .cloned()
            .ok_or(OrchestratorError::NotFound(id))
    }

    async fn create(&self, workflow: &Workflow) -> OrchestratorResult<()> {
        let mut tables = self.tables();
        if tables.workflows.contains_key(&workflow.id()) {
            return Err(OrchestratorError::Storage(format!(
                "workflow {} already exists",
                workflow.id()
            )));
        }
        tables.workflows.insert(workflow.id(), workflow.clone());
        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> OrchestratorResult<()> {
        let mut tables = self.tables();
        match tables.workflows.get_mut(&workflow.id()) {
            Some(slot) => {
                *slot = workflow.clone();
                Ok(())
            }
            None => Err(OrchestratorError::NotFound(workflow.id())),
        }
    }

    async fn set_status(
        &self,
        id: WorkflowId,
        status: WorkflowStatus,
        extras: WorkflowChanges,
    ) -> OrchestratorResult<Workflow> {
        let mut tables = self.tables();
        let slot = tables
            .workflows
            .get_mut(&id)
            .ok_or(OrchestratorError::NotFound(id))?;
        *slot = slot.with_changes(extras.status(status));
        Ok(slot.clone())
    }

    async fn find_by_status(&self, statuses: &[WorkflowStatus]) -> OrchestratorResult<Vec<Workflow>> {
        let filter = WorkflowFilter {
            statuses: statuses.to_vec(),
            ..WorkflowFilter::default()
        };
        self.list(&filter).await
    }

    async fn list(&self, filter: &WorkflowFilter) -> OrchestratorResult<Vec<Workflow>> {
        let all: Vec<Workflow> = self.tables().workflows.values().cloned().collect();
        Ok(filter.apply(all))
    }

    async fn append_event(&self, event: &EventRecord) -> OrchestratorResult<()> {
        self.tables().events.push(event.clone());
        Ok(())
    }

    async fn get_max_sequence(&self, id: WorkflowId) -> OrchestratorResult<u64> {
        Ok(self
            .tables()
            .events
            .iter()
            .filter(|e| e.workflow_id == id)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn events_after(&self, id: WorkflowId, after: u64) -> OrchestratorResult<Vec<EventRecord>> {
        let mut events: Vec<EventRecord> = self
            .tables()
            .events
            .iter()
            .filter(|e| e.workflow_id == id && e.sequence > after)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }
}
