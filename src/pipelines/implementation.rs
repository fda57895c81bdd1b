//! Plan, approve, then implement with task-by-task review.
//!
//! ```text
//! architect -> [human_approval] -> developer <-> reviewer -> end
//! ```
//!
//! The run pauses before `human_approval`. A planning-only run therefore
//! ends in `blocked` with the plan in the checkpoint.

use super::nodes::{
    ArchitectNode, DeveloperNode, HumanApprovalNode, ReviewerNode, ARCHITECT_NODE,
    DEVELOPER_NODE, HUMAN_APPROVAL_NODE, REVIEWER_NODE,
};
use super::{inputs_from, Pipeline, PipelineArgs, PipelineGraph, PipelineMetadata};
use crate::checkpoint::{CheckpointStore, StateType};
use crate::domain::ExecutionState;
use std::sync::Arc;

pub struct ImplementationPipeline;

impl ImplementationPipeline {
    pub const NAME: &'static str = "implementation";
    const STATE_VERSION: u32 = 1;
}

impl Pipeline for ImplementationPipeline {
    fn metadata(&self) -> PipelineMetadata {
        PipelineMetadata {
            name: Self::NAME,
            display_name: "Implementation",
            description: "Architect plans, a human approves, developer and reviewer iterate per task",
            supports_planning: true,
        }
    }

    fn create_graph(&self, checkpoints: Arc<dyn CheckpointStore>) -> PipelineGraph {
        PipelineGraph::new(self.state_type(), ARCHITECT_NODE, checkpoints)
            .node(ARCHITECT_NODE, ArchitectNode)
            .node(HUMAN_APPROVAL_NODE, HumanApprovalNode)
            .node(DEVELOPER_NODE, DeveloperNode)
            .node(REVIEWER_NODE, ReviewerNode)
            .interrupt_before(HUMAN_APPROVAL_NODE)
    }

    fn initial_state(&self, args: PipelineArgs) -> ExecutionState {
        let (issue, design) = inputs_from(&args.payload);
        ExecutionState::new(args.workflow_id, Self::NAME, args.profile_id, args.worktree)
            .with_inputs(issue, design)
    }

    fn state_type(&self) -> StateType {
        StateType::new("implementation_state", Self::STATE_VERSION)
    }
}
