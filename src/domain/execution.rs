//! Pipeline execution state carried through graph nodes and checkpoints.
//!
//! Nodes never mutate an [`ExecutionState`]. They return a [`StateUpdate`]
//! and the executor builds the next value with [`ExecutionState::apply`], so
//! a checkpointed snapshot can be replayed without aliasing surprises.

use crate::domain::types::{HistoryEntry, ProfileId, WorkflowId};
use crate::domain::workflow::WorkflowPayload;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one reviewer pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub reviewer: String,
    pub approved: bool,
    pub summary: String,
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    workflow_id: WorkflowId,
    pipeline_type: String,
    profile_id: ProfileId,
    worktree: PathBuf,
    #[serde(default)]
    issue: Option<String>,
    #[serde(default)]
    design: Option<String>,
    #[serde(default)]
    plan_markdown: Option<String>,
    #[serde(default)]
    plan_path: Option<PathBuf>,
    #[serde(default)]
    plan_summary: Option<String>,
    #[serde(default)]
    total_tasks: Option<u32>,
    #[serde(default)]
    current_task_index: u32,
    #[serde(default)]
    review_iteration: u32,
    #[serde(default)]
    task_review_iteration: u32,
    #[serde(default)]
    last_review: Option<ReviewResult>,
    #[serde(default)]
    human_approved: Option<bool>,
    #[serde(default)]
    human_feedback: Option<String>,
    #[serde(default)]
    driver_session_id: Option<String>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

impl ExecutionState {
    pub fn new(
        workflow_id: WorkflowId,
        pipeline_type: impl Into<String>,
        profile_id: ProfileId,
        worktree: PathBuf,
    ) -> Self {
        Self {
            workflow_id,
            pipeline_type: pipeline_type.into(),
            profile_id,
            worktree,
            issue: None,
            design: None,
            plan_markdown: None,
            plan_path: None,
            plan_summary: None,
            total_tasks: None,
            current_task_index: 0,
            review_iteration: 0,
            task_review_iteration: 0,
            last_review: None,
            human_approved: None,
            human_feedback: None,
            driver_session_id: None,
            history: Vec::new(),
        }
    }

    /// Sets the issue and design inputs (construction only).
    pub fn with_inputs(mut self, issue: Option<String>, design: Option<String>) -> Self {
        self.issue = issue;
        self.design = design;
        self
    }

    /// Returns the next state with `update` applied.
    ///
    /// Scalar fields are replaced; history entries are appended so concurrent
    /// contributions concatenate instead of overwriting each other.
    pub fn apply(&self, update: StateUpdate) -> Self {
        let mut next = self.clone();
        if let Some(plan) = update.plan_markdown {
            next.plan_markdown = Some(plan);
        }
        if let Some(path) = update.plan_path {
            next.plan_path = Some(path);
        }
        if let Some(summary) = update.plan_summary {
            next.plan_summary = Some(summary);
        }
        if let Some(total) = update.total_tasks {
            next.total_tasks = total;
        }
        if let Some(index) = update.current_task_index {
            next.current_task_index = index;
        }
        if let Some(iteration) = update.review_iteration {
            next.review_iteration = iteration;
        }
        if let Some(iteration) = update.task_review_iteration {
            next.task_review_iteration = iteration;
        }
        if let Some(review) = update.last_review {
            next.last_review = review;
        }
        if let Some(approved) = update.human_approved {
            next.human_approved = approved;
        }
        if let Some(feedback) = update.human_feedback {
            next.human_feedback = feedback;
        }
        if let Some(session) = update.driver_session_id {
            next.driver_session_id = Some(session);
        }
        next.history.extend(update.history);
        next
    }

    /// Copies the plan-derived counters into a workflow payload.
    pub fn project_onto(&self, payload: &WorkflowPayload) -> WorkflowPayload {
        WorkflowPayload {
            plan_ref: self
                .plan_path
                .as_ref()
                .map(|p| p.display().to_string())
                .or_else(|| payload.plan_ref.clone()),
            plan_summary: self.plan_summary.clone(),
            total_tasks: self.total_tasks,
            current_task_index: self.current_task_index,
            review_iteration: self.review_iteration,
            task_review_iteration: self.task_review_iteration,
            human_approved: self.human_approved,
            human_feedback: self.human_feedback.clone(),
            ..payload.clone()
        }
    }

    // ========== Public Getters ==========

    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    pub fn pipeline_type(&self) -> &str {
        &self.pipeline_type
    }

    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    pub fn worktree(&self) -> &std::path::Path {
        &self.worktree
    }

    pub fn issue(&self) -> Option<&str> {
        self.issue.as_deref()
    }

    pub fn design(&self) -> Option<&str> {
        self.design.as_deref()
    }

    pub fn plan_markdown(&self) -> Option<&str> {
        self.plan_markdown.as_deref()
    }

    pub fn plan_summary(&self) -> Option<&str> {
        self.plan_summary.as_deref()
    }

    pub fn total_tasks(&self) -> Option<u32> {
        self.total_tasks
    }

    pub fn current_task_index(&self) -> u32 {
        self.current_task_index
    }

    pub fn review_iteration(&self) -> u32 {
        self.review_iteration
    }

    pub fn task_review_iteration(&self) -> u32 {
        self.task_review_iteration
    }

    pub fn last_review(&self) -> Option<&ReviewResult> {
        self.last_review.as_ref()
    }

    pub fn human_approved(&self) -> Option<bool> {
        self.human_approved
    }

    pub fn human_feedback(&self) -> Option<&str> {
        self.human_feedback.as_deref()
    }

    pub fn driver_session_id(&self) -> Option<&str> {
        self.driver_session_id.as_deref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
}

/// Partial update returned by a graph node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    plan_markdown: Option<String>,
    plan_path: Option<PathBuf>,
    plan_summary: Option<String>,
    total_tasks: Option<Option<u32>>,
    current_task_index: Option<u32>,
    review_iteration: Option<u32>,
    task_review_iteration: Option<u32>,
    last_review: Option<Option<ReviewResult>>,
    human_approved: Option<Option<bool>>,
    human_feedback: Option<Option<String>>,
    driver_session_id: Option<String>,
    history: Vec<HistoryEntry>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, markdown: String, summary: String, total_tasks: Option<u32>) -> Self {
        self.plan_markdown = Some(markdown);
        self.plan_summary = Some(summary);
        self.total_tasks = Some(total_tasks);
        self
    }

    pub fn plan_path(mut self, path: PathBuf) -> Self {
        self.plan_path = Some(path);
        self
    }

    pub fn current_task_index(mut self, index: u32) -> Self {
        self.current_task_index = Some(index);
        self
    }

    pub fn review_iteration(mut self, iteration: u32) -> Self {
        self.review_iteration = Some(iteration);
        self
    }

    pub fn task_review_iteration(mut self, iteration: u32) -> Self {
        self.task_review_iteration = Some(iteration);
        self
    }

    pub fn last_review(mut self, review: Option<ReviewResult>) -> Self {
        self.last_review = Some(review);
        self
    }

    pub fn human_decision(mut self, approved: bool, feedback: Option<String>) -> Self {
        self.human_approved = Some(Some(approved));
        self.human_feedback = Some(feedback);
        self
    }

    pub fn driver_session_id(mut self, session_id: String) -> Self {
        self.driver_session_id = Some(session_id);
        self
    }

    pub fn history(mut self, entry: HistoryEntry) -> Self {
        self.history.push(entry);
        self
    }

    /// Combines two updates. Scalars from `other` win; history concatenates.
    pub fn merge(mut self, other: StateUpdate) -> Self {
        macro_rules! take_newer {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take_newer!(
            plan_markdown,
            plan_path,
            plan_summary,
            total_tasks,
            current_task_index,
            review_iteration,
            task_review_iteration,
            last_review,
            human_approved,
            human_feedback,
            driver_session_id
        );
        self.history.extend(other.history);
        self
    }
}
