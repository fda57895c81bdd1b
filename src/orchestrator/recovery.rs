//! Startup reconciliation of persisted statuses.
//!
//! No task survives a process restart, so any workflow still recorded as
//! `in_progress` was interrupted. Blocked workflows lost their subscribers
//! and get their approval request announced again.

use super::service::OrchestratorService;
use crate::domain::{OrchestratorResult, Workflow, WorkflowChanges, WorkflowId, WorkflowStatus};
use crate::events::{EventDraft, EventType};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

pub const INTERRUPTED_REASON: &str = "interrupted by restart";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Moved from `in_progress` to `failed` (recoverable).
    pub failed: Vec<WorkflowId>,
    /// Still `blocked`; approval request re-emitted.
    pub awaiting_approval: Vec<WorkflowId>,
}

impl OrchestratorService {
    /// Reconciles persisted statuses after a restart. Runs once per service;
    /// later calls return an empty report.
    pub async fn recover_interrupted_workflows(&self) -> OrchestratorResult<RecoveryReport> {
        if self.inner.recovered.swap(true, Ordering::SeqCst) {
            debug!("Startup recovery already ran");
            return Ok(RecoveryReport::default());
        }

        let mut report = RecoveryReport::default();
        let interrupted = self
            .inner
            .repository
            .find_by_status(&[WorkflowStatus::InProgress])
            .await?;
        for workflow in interrupted {
            let id = workflow.id();
            if self.inner.tasks.is_running(id) {
                continue;
            }
            let result = self
                .inner
                .transition(
                    id,
                    WorkflowStatus::Failed,
                    WorkflowChanges::new().failure(INTERRUPTED_REASON, true),
                    EventDraft::new(id, EventType::WorkflowFailed, INTERRUPTED_REASON).data(json!({
                        "failure_reason": INTERRUPTED_REASON,
                        "recoverable": true,
                    })),
                )
                .await;
            match result {
                Ok(_) => report.failed.push(id),
                Err(err) => warn!(workflow_id = %id, error = %err, "Could not flag interrupted workflow"),
            }
        }

        let blocked = self
            .inner
            .repository
            .find_by_status(&[WorkflowStatus::Blocked])
            .await?;
        for workflow in blocked {
            let id = workflow.id();
            let prompt = self.approval_prompt(&workflow).await;
            let event = EventDraft::new(id, EventType::ApprovalRequired, prompt).data(json!({
                "status": WorkflowStatus::Blocked,
                "recovered": true,
            }));
            match self.inner.events.emit(event).await {
                Ok(_) => report.awaiting_approval.push(id),
                Err(err) => warn!(workflow_id = %id, error = %err, "Could not re-announce approval"),
            }
        }

        info!(
            failed = report.failed.len(),
            awaiting_approval = report.awaiting_approval.len(),
            "Startup recovery finished"
        );
        Ok(report)
    }

    /// The prompt of the node the workflow is paused before, from its checkpoint.
    async fn approval_prompt(&self, workflow: &Workflow) -> String {
        let fallback = match &workflow.payload().plan_summary {
            Some(summary) => format!("Plan awaiting approval: {}", summary),
            None => "Plan awaiting approval".to_string(),
        };
        let Ok(Some(checkpoint)) = self.inner.checkpoints.read(workflow.id()).await else {
            return fallback;
        };
        let Some(node) = checkpoint.next_node.as_deref() else {
            return fallback;
        };
        let Ok(pipeline) = self.inner.pipelines.get_pipeline(workflow.pipeline_type()) else {
            return fallback;
        };
        pipeline
            .create_graph(self.inner.checkpoints.clone())
            .interrupt_prompt(node, &checkpoint.state)
            .unwrap_or(fallback)
    }
}
