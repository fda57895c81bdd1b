//! Pipelines: named workflow topologies over shared infrastructure.
//!
//! A pipeline describes which agent steps a workflow runs and in what order.
//! The orchestrator never depends on a concrete pipeline; it looks one up by
//! name in the [`PipelineRegistry`] and drives the graph it builds.

pub mod agents;
pub mod graph;
pub mod implementation;
mod nodes;
pub mod registry;
pub mod review;
pub mod routing;

pub use graph::{Next, Node, NodeContext, NodeOutcome, PipelineGraph, RunOutcome, StartPoint};
pub use registry::{builtin_registry, PipelineRegistry};
pub use routing::{route_after_review, ReviewRoute, RoutingDecision, RoutingError};

use crate::checkpoint::{CheckpointStore, StateType};
use crate::domain::{ExecutionState, ProfileId, WorkflowId, WorkflowPayload};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineMetadata {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Whether the pipeline has a planning phase that can run on its own.
    pub supports_planning: bool,
}

/// Inputs for a pipeline's initial execution state.
#[derive(Debug, Clone)]
pub struct PipelineArgs {
    pub workflow_id: WorkflowId,
    pub profile_id: ProfileId,
    pub worktree: PathBuf,
    pub payload: WorkflowPayload,
}

pub trait Pipeline: Send + Sync {
    fn metadata(&self) -> PipelineMetadata;

    fn create_graph(&self, checkpoints: Arc<dyn CheckpointStore>) -> PipelineGraph;

    fn initial_state(&self, args: PipelineArgs) -> ExecutionState;

    /// State shape recorded in checkpoints and verified on resume.
    fn state_type(&self) -> StateType;
}

/// Issue and design text for a new state, falling back to their references.
fn inputs_from(payload: &WorkflowPayload) -> (Option<String>, Option<String>) {
    (
        payload.issue_text.clone().or_else(|| payload.issue_ref.clone()),
        payload.design_text.clone().or_else(|| payload.design_ref.clone()),
    )
}
