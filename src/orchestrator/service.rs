//! Lifecycle operations over persisted workflows.
//!
//! Every entry point checks the workflow's current status before touching
//! anything, then moves it along a validated edge and emits exactly one
//! lifecycle event. Every run, planning included, occupies its worktree.
//! Operations that register a task (`start`, planning, `approve`, `resume`,
//! `replan`) and those that tear tasks down (`reject`, `cancel`) run under one
//! coarse start lock, so two callers can never both find a worktree free and
//! claim it.

use super::registry::TaskRegistry;
use super::runner::{self, PreparedRun};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::domain::{
    HistoryEntry, NewWorkflow, OrchestratorError, OrchestratorResult, ProfileId, StateUpdate,
    TimestampUtc, Workflow, WorkflowChanges, WorkflowId, WorkflowPayload, WorkflowStatus,
    WorktreePath,
};
use crate::driver::DriverFactory;
use crate::events::{EventBus, EventDraft, EventType};
use crate::pipelines::{Pipeline, PipelineArgs, PipelineRegistry, StartPoint};
use crate::repository::{WorkflowFilter, WorkflowRepository};
use crate::state_machine::validate_transition;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Tunables shared by every workflow the service runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub max_review_passes: u32,
    pub driver_timeout: Duration,
    /// How long `cancel` waits for a task to reach a boundary before aborting it.
    pub cancel_grace: Duration,
    pub event_channel_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_review_passes: 3,
            driver_timeout: Duration::from_secs(1800),
            cancel_grace: Duration::from_secs(10),
            event_channel_capacity: 256,
        }
    }
}

/// Collaborators the service is built from.
pub struct OrchestratorDeps {
    pub repository: Arc<dyn WorkflowRepository>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub drivers: Arc<dyn DriverFactory>,
    pub pipelines: PipelineRegistry,
}

#[derive(Debug, Clone)]
pub struct CreateWorkflow {
    pub pipeline_type: String,
    pub profile_id: ProfileId,
    pub worktree_path: WorktreePath,
    pub payload: WorkflowPayload,
}

/// What `create` does after persisting the new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Launch {
    /// Leave the workflow `pending`.
    #[default]
    Queue,
    /// Start full execution immediately.
    Start,
    /// Run only the planning phase, ending `blocked` on the plan.
    PlanNow,
}

/// Outcome of [`OrchestratorService::start_batch`]. One failure never aborts the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStartResult {
    pub started: Vec<WorkflowId>,
    pub errors: BTreeMap<WorkflowId, String>,
}

pub(crate) struct Inner {
    pub(crate) repository: Arc<dyn WorkflowRepository>,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) drivers: Arc<dyn DriverFactory>,
    pub(crate) pipelines: PipelineRegistry,
    pub(crate) settings: OrchestratorSettings,
    pub(crate) start_lock: tokio::sync::Mutex<()>,
    pub(crate) tasks: Arc<TaskRegistry>,
    pub(crate) recovered: AtomicBool,
}

impl Inner {
    /// Moves a workflow along a validated edge and emits its lifecycle event.
    ///
    /// The event's data always carries the new status.
    pub(crate) async fn transition(
        &self,
        id: WorkflowId,
        to: WorkflowStatus,
        changes: WorkflowChanges,
        event: EventDraft,
    ) -> OrchestratorResult<Workflow> {
        let current = self.repository.get(id).await?;
        let from = current.status();
        if let Err(err) = validate_transition(from, to) {
            error!(workflow_id = %id, %from, %to, "Refused status transition missing from the table");
            return Err(err);
        }

        let updated = self.repository.set_status(id, to, changes).await?;
        info!(workflow_id = %id, %from, %to, worktree = %updated.worktree_path(), "Workflow status changed");
        self.events.emit(with_status(event, to)).await?;
        Ok(updated)
    }

    /// Resolves the pipeline and driver for a run and builds its context.
    pub(crate) fn prepare(&self, workflow: &Workflow) -> OrchestratorResult<(Box<dyn Pipeline>, PreparedRun)> {
        let pipeline = self.pipelines.get_pipeline(workflow.pipeline_type())?;
        let driver = self.drivers.driver_for(workflow.profile_id())?;
        let run = PreparedRun::new(
            pipeline.create_graph(self.checkpoints.clone()),
            workflow,
            driver,
            self.events.clone(),
            &self.settings,
        );
        Ok((pipeline, run))
    }

    fn ensure_worktree_free(&self, workflow: &Workflow) -> OrchestratorResult<()> {
        match self.tasks.occupant(workflow.worktree_path()) {
            Some(occupant) => {
                warn!(
                    workflow_id = %workflow.id(),
                    worktree = %workflow.worktree_path(),
                    %occupant,
                    "Worktree is busy"
                );
                Err(OrchestratorError::ResourceBusy {
                    worktree: workflow.worktree_path().clone(),
                    occupant,
                })
            }
            None => Ok(()),
        }
    }

    async fn stop_tasks(&self, id: WorkflowId) {
        for task in self.tasks.take(id) {
            task.stop(self.settings.cancel_grace).await;
        }
    }

    /// Writes the human decision into the checkpoint, if there is one.
    async fn record_decision(
        &self,
        id: WorkflowId,
        approved: bool,
        feedback: Option<String>,
    ) -> OrchestratorResult<Option<Checkpoint>> {
        let Some(checkpoint) = self.checkpoints.read(id).await? else {
            return Ok(None);
        };
        let mut update = StateUpdate::new();
        if !approved {
            let message = match &feedback {
                Some(text) => format!("Plan rejected: {}", text),
                None => "Plan rejected".to_string(),
            };
            update = update.history(HistoryEntry::new("human", message));
        }
        let updated = Checkpoint {
            state: checkpoint
                .state
                .apply(update.merge(StateUpdate::new().human_decision(approved, feedback))),
            saved_at: TimestampUtc::now(),
            ..checkpoint
        };
        self.checkpoints.write(&updated).await?;
        Ok(Some(updated))
    }

    /// Writes `checkpoint` back if the workflow is still `blocked`.
    async fn restore_checkpoint(&self, id: WorkflowId, checkpoint: Option<Checkpoint>) {
        let Some(checkpoint) = checkpoint else {
            return;
        };
        match self.repository.get(id).await {
            Ok(workflow) if workflow.status() == WorkflowStatus::Blocked => {
                if let Err(err) = self.checkpoints.write(&checkpoint).await {
                    error!(workflow_id = %id, error = %err, "Could not restore checkpoint after failed replan");
                }
            }
            Ok(_) => {}
            Err(err) => {
                error!(workflow_id = %id, error = %err, "Could not check status after failed replan");
            }
        }
    }
}

fn with_status(mut event: EventDraft, status: WorkflowStatus) -> EventDraft {
    let mut data = match event.data.take() {
        Some(Value::Object(map)) => map,
        Some(other) => Map::from_iter([("detail".to_string(), other)]),
        None => Map::new(),
    };
    data.insert("status".to_string(), json!(status));
    event.data = Some(Value::Object(data));
    event
}

fn fresh_start(pipeline: &dyn Pipeline, workflow: &Workflow, payload: WorkflowPayload) -> StartPoint {
    StartPoint::Fresh(pipeline.initial_state(PipelineArgs {
        workflow_id: workflow.id(),
        profile_id: workflow.profile_id().clone(),
        worktree: workflow.worktree_path().as_path().to_path_buf(),
        payload,
    }))
}

fn require_status(workflow: &Workflow, expected: WorkflowStatus, operation: &str) -> OrchestratorResult<()> {
    if workflow.status() == expected {
        Ok(())
    } else {
        Err(OrchestratorError::invalid_state(
            workflow.id(),
            workflow.status(),
            format!("{} requires a {} workflow", operation, expected),
        ))
    }
}

/// Coordinates workflow lifecycles. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct OrchestratorService {
    pub(crate) inner: Arc<Inner>,
}

impl OrchestratorService {
    pub fn new(deps: OrchestratorDeps, settings: OrchestratorSettings) -> Self {
        let events = Arc::new(EventBus::new(
            deps.repository.clone(),
            settings.event_channel_capacity,
        ));
        Self {
            inner: Arc::new(Inner {
                repository: deps.repository,
                checkpoints: deps.checkpoints,
                events,
                drivers: deps.drivers,
                pipelines: deps.pipelines,
                settings,
                start_lock: tokio::sync::Mutex::new(()),
                tasks: Arc::new(TaskRegistry::new()),
                recovered: AtomicBool::new(false),
            }),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.inner.events.clone()
    }

    pub fn pipelines(&self) -> &PipelineRegistry {
        &self.inner.pipelines
    }

    /// Workflows with a live task in this process.
    pub fn active_workflows(&self) -> Vec<WorkflowId> {
        self.inner.tasks.active_workflows()
    }

    /// Persists a new `pending` workflow and optionally launches it.
    ///
    /// If launching fails the record stays `pending` and the error is returned.
    pub async fn create(&self, request: CreateWorkflow, launch: Launch) -> OrchestratorResult<Workflow> {
        let pipeline = self.inner.pipelines.get_pipeline(&request.pipeline_type)?;
        self.inner.drivers.driver_for(&request.profile_id)?;
        if launch == Launch::PlanNow && !pipeline.metadata().supports_planning {
            return Err(OrchestratorError::Configuration(format!(
                "pipeline '{}' has no planning phase",
                request.pipeline_type
            )));
        }

        let workflow = Workflow::new(NewWorkflow {
            pipeline_type: request.pipeline_type,
            profile_id: request.profile_id,
            worktree_path: request.worktree_path,
            payload: request.payload,
        });
        self.inner.repository.create(&workflow).await?;
        info!(
            workflow_id = %workflow.id(),
            pipeline = %workflow.pipeline_type(),
            worktree = %workflow.worktree_path(),
            ?launch,
            "Workflow created"
        );

        match launch {
            Launch::Queue => Ok(workflow),
            Launch::Start => self.start(workflow.id()).await,
            Launch::PlanNow => self.plan(workflow.id()).await,
        }
    }

    /// Starts full execution of a `pending` workflow.
    pub async fn start(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        let _lock = self.inner.start_lock.lock().await;
        let workflow = self.inner.repository.get(id).await?;
        require_status(&workflow, WorkflowStatus::Pending, "start")?;
        self.inner.ensure_worktree_free(&workflow)?;

        let (pipeline, run) = self.inner.prepare(&workflow)?;
        let start = fresh_start(pipeline.as_ref(), &workflow, workflow.payload().clone());
        let updated = self
            .inner
            .transition(
                id,
                WorkflowStatus::InProgress,
                WorkflowChanges::new().started_now(),
                EventDraft::new(id, EventType::WorkflowStarted, "Workflow started").data(json!({
                    "pipeline_type": workflow.pipeline_type(),
                    "worktree": workflow.worktree_path().to_string(),
                })),
            )
            .await?;
        runner::spawn(&self.inner, run, start);
        Ok(updated)
    }

    /// Runs only the planning phase of a `pending` workflow.
    async fn plan(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        let _lock = self.inner.start_lock.lock().await;
        let workflow = self.inner.repository.get(id).await?;
        require_status(&workflow, WorkflowStatus::Pending, "planning")?;
        self.inner.ensure_worktree_free(&workflow)?;

        let (pipeline, run) = self.inner.prepare(&workflow)?;
        let start = fresh_start(pipeline.as_ref(), &workflow, workflow.payload().clone());
        let updated = self
            .inner
            .transition(
                id,
                WorkflowStatus::Planning,
                WorkflowChanges::new(),
                EventDraft::new(id, EventType::PlanningStarted, "Planning started"),
            )
            .await?;
        runner::spawn(&self.inner, run, start);
        Ok(updated)
    }

    /// Starts each workflow independently.
    ///
    /// `ids = None` means every `pending` workflow on the filtered worktree,
    /// oldest first. Listed IDs on another worktree are reported as errors.
    pub async fn start_batch(
        &self,
        ids: Option<Vec<WorkflowId>>,
        worktree: Option<&WorktreePath>,
    ) -> OrchestratorResult<BatchStartResult> {
        let candidates = match ids {
            Some(ids) => ids,
            None => {
                let mut pending = self
                    .inner
                    .repository
                    .find_by_status(&[WorkflowStatus::Pending])
                    .await?;
                pending.retain(|w| worktree.is_none_or(|path| w.worktree_path() == path));
                pending.sort_by_key(|w| (w.created_at(), w.id()));
                pending.into_iter().map(|w| w.id()).collect()
            }
        };

        let mut result = BatchStartResult::default();
        for id in candidates {
            match self.start_filtered(id, worktree).await {
                Ok(_) => result.started.push(id),
                Err(err) => {
                    warn!(workflow_id = %id, error = %err, "Batch start skipped workflow");
                    result.errors.insert(id, err.to_string());
                }
            }
        }
        info!(
            started = result.started.len(),
            failed = result.errors.len(),
            "Batch start finished"
        );
        Ok(result)
    }

    async fn start_filtered(
        &self,
        id: WorkflowId,
        worktree: Option<&WorktreePath>,
    ) -> OrchestratorResult<Workflow> {
        if let Some(path) = worktree {
            let workflow = self.inner.repository.get(id).await?;
            if workflow.worktree_path() != path {
                return Err(OrchestratorError::invalid_state(
                    id,
                    workflow.status(),
                    format!("worktree {} does not match {}", workflow.worktree_path(), path),
                ));
            }
        }
        self.start(id).await
    }

    /// Records approval and continues a `blocked` workflow past its interrupt.
    pub async fn approve(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        let _lock = self.inner.start_lock.lock().await;
        let workflow = self.inner.repository.get(id).await?;
        require_status(&workflow, WorkflowStatus::Blocked, "approve")?;
        // The task that blocked the workflow may still be unwinding.
        self.inner.stop_tasks(id).await;
        self.inner.ensure_worktree_free(&workflow)?;
        if self.inner.checkpoints.read(id).await?.is_none() {
            return Err(OrchestratorError::invalid_state(
                id,
                workflow.status(),
                "no checkpoint to continue from",
            ));
        }

        let (_, run) = self.inner.prepare(&workflow)?;
        self.inner.record_decision(id, true, None).await?;

        let payload = WorkflowPayload {
            human_approved: Some(true),
            human_feedback: None,
            ..workflow.payload().clone()
        };
        let mut changes = WorkflowChanges::new().payload(payload);
        if workflow.started_at().is_none() {
            changes = changes.started_now();
        }
        let updated = self
            .inner
            .transition(
                id,
                WorkflowStatus::InProgress,
                changes,
                EventDraft::new(id, EventType::ApprovalGranted, "Plan approved"),
            )
            .await?;
        runner::spawn(
            &self.inner,
            run,
            StartPoint::FromCheckpoint {
                pass_interrupt: true,
            },
        );
        Ok(updated)
    }

    /// Fails a `blocked` workflow with the reviewer's feedback as the reason.
    pub async fn reject(&self, id: WorkflowId, feedback: &str) -> OrchestratorResult<Workflow> {
        let _lock = self.inner.start_lock.lock().await;
        let workflow = self.inner.repository.get(id).await?;
        require_status(&workflow, WorkflowStatus::Blocked, "reject")?;

        self.inner.stop_tasks(id).await;
        self.inner
            .record_decision(id, false, Some(feedback.to_string()))
            .await?;

        let payload = WorkflowPayload {
            human_approved: Some(false),
            human_feedback: Some(feedback.to_string()),
            ..workflow.payload().clone()
        };
        self.inner
            .transition(
                id,
                WorkflowStatus::Failed,
                WorkflowChanges::new().failure(feedback, false).payload(payload),
                EventDraft::new(id, EventType::ApprovalRejected, feedback).data(json!({
                    "failure_reason": feedback,
                    "recoverable": false,
                })),
            )
            .await
    }

    /// Cancels a workflow and waits until its task has fully stopped.
    pub async fn cancel(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        let _lock = self.inner.start_lock.lock().await;
        let workflow = self.inner.repository.get(id).await?;
        if !workflow.status().is_cancellable() {
            return Err(OrchestratorError::invalid_state(
                id,
                workflow.status(),
                "workflow can no longer be cancelled",
            ));
        }

        self.inner.stop_tasks(id).await;

        // The task may have settled the workflow while stopping.
        let current = self.inner.repository.get(id).await?;
        if !current.status().is_cancellable() {
            return Err(OrchestratorError::invalid_state(
                id,
                current.status(),
                "workflow finished before it could be cancelled",
            ));
        }
        self.inner
            .transition(
                id,
                WorkflowStatus::Cancelled,
                WorkflowChanges::new().completed_now(),
                EventDraft::new(id, EventType::WorkflowCancelled, "Workflow cancelled")
                    .data(json!({ "previous_status": current.status() })),
            )
            .await
    }

    /// Continues a `failed` workflow from its last checkpoint.
    pub async fn resume(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        let _lock = self.inner.start_lock.lock().await;
        let workflow = self.inner.repository.get(id).await?;
        require_status(&workflow, WorkflowStatus::Failed, "resume")?;
        let Some(checkpoint) = self.inner.checkpoints.read(id).await? else {
            return Err(OrchestratorError::invalid_state(
                id,
                workflow.status(),
                "no checkpoint to resume from",
            ));
        };
        self.inner.stop_tasks(id).await;
        self.inner.ensure_worktree_free(&workflow)?;

        let (_, run) = self.inner.prepare(&workflow)?;
        let mut changes = WorkflowChanges::new().clear_failure();
        if workflow.started_at().is_none() {
            changes = changes.started_now();
        }
        let updated = self
            .inner
            .transition(
                id,
                WorkflowStatus::InProgress,
                changes,
                EventDraft::new(id, EventType::WorkflowResumed, "Workflow resumed from checkpoint")
                    .data(json!({
                        "next_node": checkpoint.next_node,
                        "steps_completed": checkpoint.steps_completed,
                    })),
            )
            .await?;
        runner::spawn(
            &self.inner,
            run,
            StartPoint::FromCheckpoint {
                pass_interrupt: false,
            },
        );
        Ok(updated)
    }

    /// Discards the plan of a `blocked` workflow and plans again.
    pub async fn replan(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        let _lock = self.inner.start_lock.lock().await;
        let workflow = self.inner.repository.get(id).await?;
        require_status(&workflow, WorkflowStatus::Blocked, "replan")?;

        let (pipeline, run) = self.inner.prepare(&workflow)?;
        if !pipeline.metadata().supports_planning {
            return Err(OrchestratorError::Configuration(format!(
                "pipeline '{}' has no planning phase",
                workflow.pipeline_type()
            )));
        }

        self.inner.stop_tasks(id).await;
        self.inner.ensure_worktree_free(&workflow)?;

        // The fresh run must not resume the old plan. The old checkpoint is
        // restored if the workflow cannot leave `blocked`.
        let previous = self.inner.checkpoints.read(id).await?;
        self.inner.checkpoints.delete(id).await?;

        let payload = workflow.payload().without_plan();
        let start = fresh_start(pipeline.as_ref(), &workflow, payload.clone());
        let transitioned = self
            .inner
            .transition(
                id,
                WorkflowStatus::Planning,
                WorkflowChanges::new().payload(payload),
                EventDraft::new(id, EventType::PlanningStarted, "Replanning"),
            )
            .await;
        let updated = match transitioned {
            Ok(updated) => updated,
            Err(err) => {
                self.inner.restore_checkpoint(id, previous).await;
                return Err(err);
            }
        };
        runner::spawn(&self.inner, run, start);
        Ok(updated)
    }

    pub async fn get_status(&self, id: WorkflowId) -> OrchestratorResult<Workflow> {
        self.inner.repository.get(id).await
    }

    pub async fn list(&self, filter: &WorkflowFilter) -> OrchestratorResult<Vec<Workflow>> {
        self.inner.repository.list(filter).await
    }

    /// Stops every running task without changing workflow statuses.
    ///
    /// Workflows left `in_progress` are picked up by recovery on the next start.
    pub async fn shutdown(&self) {
        let tasks = self.inner.tasks.take_all();
        if tasks.is_empty() {
            return;
        }
        info!(count = tasks.len(), "Stopping running workflows");
        let grace = self.inner.settings.cancel_grace;
        futures::future::join_all(tasks.into_iter().map(|task| task.stop(grace))).await;
    }
}
