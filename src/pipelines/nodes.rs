//! Agent steps shared by the built-in pipelines.

use super::agents::{self, ARCHITECT, DEVELOPER, REVIEWER};
use super::graph::{Node, NodeContext, NodeOutcome};
use super::routing::{route_after_review, ReviewRoute};
use crate::domain::{ExecutionState, HistoryEntry, OrchestratorResult, StateUpdate};
use crate::driver::DriverRequest;
use crate::events::EventType;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

pub const ARCHITECT_NODE: &str = "architect";
pub const HUMAN_APPROVAL_NODE: &str = "human_approval";
pub const DEVELOPER_NODE: &str = "developer";
pub const REVIEWER_NODE: &str = "reviewer";

fn request(
    ctx: &NodeContext,
    agent: &str,
    system_prompt: &str,
    prompt: String,
    session_id: Option<&str>,
) -> DriverRequest {
    DriverRequest {
        agent: agent.to_string(),
        prompt,
        system_prompt: Some(system_prompt.to_string()),
        working_dir: ctx.worktree.clone(),
        session_id: session_id.map(str::to_string),
    }
}

/// Saves the plan under `<worktree>/.orchestrator/plans/` when the worktree exists.
fn write_plan_file(ctx: &NodeContext, plan: &str) -> Option<PathBuf> {
    if !ctx.worktree.is_dir() {
        return None;
    }
    let dir = ctx.worktree.join(".orchestrator").join("plans");
    let path = dir.join(format!("{}.md", ctx.workflow_id));
    let written = std::fs::create_dir_all(&dir).and_then(|()| std::fs::write(&path, plan));
    match written {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(workflow_id = %ctx.workflow_id, path = %path.display(), error = %e, "Failed to write plan file");
            None
        }
    }
}

/// Produces the plan and counts its tasks.
pub struct ArchitectNode;

#[async_trait]
impl Node for ArchitectNode {
    async fn run(&self, state: &ExecutionState, ctx: &NodeContext) -> OrchestratorResult<NodeOutcome> {
        let response = ctx
            .call_driver(request(
                ctx,
                ARCHITECT,
                agents::architect_system_prompt(),
                agents::architect_prompt(state),
                None,
            ))
            .await?;

        let plan = response.output;
        let total_tasks = agents::count_tasks(&plan);
        let summary = agents::plan_summary(&plan);
        let mut update = StateUpdate::new()
            .plan(plan.clone(), summary.clone(), total_tasks)
            .current_task_index(0)
            .review_iteration(0)
            .task_review_iteration(0)
            .last_review(None)
            .history(HistoryEntry::new(
                ARCHITECT,
                match total_tasks {
                    Some(n) => format!("Planned {} tasks: {}", n, summary),
                    None => format!("Planned single change: {}", summary),
                },
            ));
        if let Some(path) = write_plan_file(ctx, &plan) {
            update = update.plan_path(path);
        }
        if let Some(session) = response.session_id {
            update = update.driver_session_id(session);
        }
        Ok(NodeOutcome::goto(HUMAN_APPROVAL_NODE, update))
    }
}

/// Gate between planning and implementation. The run pauses before it.
pub struct HumanApprovalNode;

#[async_trait]
impl Node for HumanApprovalNode {
    async fn run(&self, state: &ExecutionState, _ctx: &NodeContext) -> OrchestratorResult<NodeOutcome> {
        if state.human_approved() == Some(true) {
            let entry = HistoryEntry::new("human", "Plan approved");
            return Ok(NodeOutcome::goto(
                DEVELOPER_NODE,
                StateUpdate::new().history(entry),
            ));
        }
        let reason = state.human_feedback().unwrap_or("Plan not approved");
        Ok(NodeOutcome::end(
            StateUpdate::new().history(HistoryEntry::new("human", reason)),
        ))
    }

    fn interrupt_prompt(&self, state: &ExecutionState) -> String {
        let summary = state.plan_summary().unwrap_or("(no summary)");
        match state.total_tasks() {
            Some(n) => format!("Approve plan with {} tasks: {}", n, summary),
            None => format!("Approve plan: {}", summary),
        }
    }
}

/// Implements the plan, or the current task of it.
pub struct DeveloperNode;

#[async_trait]
impl Node for DeveloperNode {
    async fn run(&self, state: &ExecutionState, ctx: &NodeContext) -> OrchestratorResult<NodeOutcome> {
        if let Some(total) = state.total_tasks() {
            if state.task_review_iteration() == 0 {
                ctx.emit_stream(
                    EventType::TaskStarted,
                    DEVELOPER,
                    format!("Task {} of {}", state.current_task_index() + 1, total),
                );
            }
        }

        let response = ctx
            .call_driver(request(
                ctx,
                DEVELOPER,
                agents::developer_system_prompt(),
                agents::developer_prompt(state),
                state.driver_session_id(),
            ))
            .await?;

        let mut update = StateUpdate::new().history(HistoryEntry::new(
            DEVELOPER,
            agents::plan_summary(&response.output),
        ));
        if let Some(session) = response.session_id {
            update = update.driver_session_id(session);
        }
        Ok(NodeOutcome::goto(REVIEWER_NODE, update))
    }
}

/// Reviews the change and routes the workflow.
pub struct ReviewerNode;

#[async_trait]
impl Node for ReviewerNode {
    async fn run(&self, state: &ExecutionState, ctx: &NodeContext) -> OrchestratorResult<NodeOutcome> {
        let response = ctx
            .call_driver(request(
                ctx,
                REVIEWER,
                agents::reviewer_system_prompt(),
                agents::reviewer_prompt(state),
                None,
            ))
            .await?;

        let review = agents::review_result(&response.output);
        ctx.emit_stream(
            EventType::ReviewCompleted,
            REVIEWER,
            format!(
                "{}: {}",
                if review.approved { "approved" } else { "changes requested" },
                review.summary
            ),
        );

        let review_update = StateUpdate::new()
            .last_review(Some(review.clone()))
            .history(HistoryEntry::new(REVIEWER, review.summary.clone()));
        let reviewed = state.apply(review_update.clone());
        let decision = route_after_review(&reviewed, ctx.max_review_passes)?;
        let update = review_update.merge(decision.update);

        Ok(match decision.route {
            ReviewRoute::End => NodeOutcome::end(update),
            ReviewRoute::NextTask | ReviewRoute::Developer => {
                NodeOutcome::goto(DEVELOPER_NODE, update)
            }
        })
    }
}
