//! Background execution of one pipeline run.

use super::registry::{ActiveTask, TaskGuard};
use super::service::{Inner, OrchestratorSettings};
use crate::domain::{
    OrchestratorError, OrchestratorResult, Workflow, WorkflowChanges, WorkflowId, WorkflowStatus,
    WorktreePath,
};
use crate::driver::SharedDriver;
use crate::events::{EventBus, EventDraft, EventType};
use crate::pipelines::{NodeContext, PipelineGraph, RunOutcome, StartPoint};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// A graph and context ready to be spawned.
pub(crate) struct PreparedRun {
    graph: PipelineGraph,
    ctx: NodeContext,
    cancel: watch::Sender<bool>,
    worktree: WorktreePath,
}

impl PreparedRun {
    pub(crate) fn new(
        graph: PipelineGraph,
        workflow: &Workflow,
        driver: SharedDriver,
        events: Arc<EventBus>,
        settings: &OrchestratorSettings,
    ) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);
        let ctx = NodeContext {
            workflow_id: workflow.id(),
            worktree: workflow.worktree_path().as_path().to_path_buf(),
            driver,
            events,
            driver_timeout: settings.driver_timeout,
            max_review_passes: settings.max_review_passes,
            cancel: cancel_rx,
        };
        Self {
            graph,
            ctx,
            cancel,
            worktree: workflow.worktree_path().clone(),
        }
    }
}

/// Spawns the run and registers it against its worktree.
///
/// The task waits until its registry entry exists, so its guard can never
/// release the worktree before it was taken.
pub(crate) fn spawn(inner: &Arc<Inner>, run: PreparedRun, start: StartPoint) {
    let PreparedRun {
        graph,
        ctx,
        cancel,
        worktree,
    } = run;
    let workflow_id = ctx.workflow_id;
    let guard = TaskGuard::new(inner.tasks.clone(), inner.events.clone(), worktree.clone(), workflow_id);
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let task_inner = inner.clone();

    let handle = tokio::spawn(async move {
        let _guard = guard;
        if ready_rx.await.is_err() {
            return;
        }
        debug!(%workflow_id, entry = %graph.entry(), "Pipeline run started");
        let outcome = graph.run(start, &ctx).await;
        if let Err(err) = settle(&task_inner, workflow_id, outcome, ctx.is_cancelled()).await {
            error!(%workflow_id, error = %err, "Failed to record run outcome");
        }
    });

    inner
        .tasks
        .insert(worktree, ActiveTask::new(workflow_id, cancel, handle));
    let _ = ready_tx.send(());
}

/// Maps a finished run onto the workflow's next status.
///
/// A cancelled run records nothing; the caller of `cancel` owns that transition.
async fn settle(
    inner: &Inner,
    id: WorkflowId,
    outcome: OrchestratorResult<RunOutcome>,
    cancelled: bool,
) -> OrchestratorResult<()> {
    if cancelled || matches!(outcome, Ok(RunOutcome::Cancelled)) {
        info!(workflow_id = %id, "Run stopped after cancellation");
        return Ok(());
    }

    let current = inner.repository.get(id).await?;
    match outcome {
        Ok(RunOutcome::Interrupted {
            node,
            prompt,
            state,
        }) => {
            let payload = state.project_onto(current.payload());
            inner
                .transition(
                    id,
                    WorkflowStatus::Blocked,
                    WorkflowChanges::new().payload(payload),
                    EventDraft::new(id, EventType::ApprovalRequired, prompt).data(json!({
                        "node": node,
                        "plan_summary": state.plan_summary(),
                        "total_tasks": state.total_tasks(),
                    })),
                )
                .await?;
        }
        Ok(RunOutcome::Completed { state }) => {
            let payload = state.project_onto(current.payload());
            inner
                .transition(
                    id,
                    WorkflowStatus::Completed,
                    WorkflowChanges::new().completed_now().payload(payload),
                    EventDraft::new(id, EventType::WorkflowCompleted, "Workflow completed").data(
                        json!({
                            "total_tasks": state.total_tasks(),
                            "review_iteration": state.review_iteration(),
                        }),
                    ),
                )
                .await?;
        }
        Ok(RunOutcome::Cancelled) => {}
        Err(err) => {
            let retryable = matches!(&err, OrchestratorError::Driver(driver_err) if driver_err.is_retryable());
            warn!(workflow_id = %id, error = %err, retryable, "Pipeline run failed");
            let reason = err.to_string();
            let mut changes = WorkflowChanges::new().failure(reason.clone(), false);
            match inner.checkpoints.read(id).await {
                Ok(Some(checkpoint)) => {
                    changes = changes.payload(checkpoint.state.project_onto(current.payload()));
                }
                Ok(None) => {}
                Err(read_err) => {
                    warn!(workflow_id = %id, error = %read_err, "Could not read checkpoint for failed run");
                }
            }
            inner
                .transition(
                    id,
                    WorkflowStatus::Failed,
                    changes,
                    EventDraft::new(id, EventType::WorkflowFailed, reason.clone()).data(json!({
                        "failure_reason": reason,
                        "recoverable": false,
                        "retryable": retryable,
                    })),
                )
                .await?;
        }
    }
    Ok(())
}
