//! Review an existing change and fix what the reviewer flags.
//!
//! ```text
//! reviewer -> developer -> reviewer -> ... -> end
//! ```
//!
//! There is no plan, so routing is always single-shot.

use super::nodes::{DeveloperNode, ReviewerNode, DEVELOPER_NODE, REVIEWER_NODE};
use super::{inputs_from, Pipeline, PipelineArgs, PipelineGraph, PipelineMetadata};
use crate::checkpoint::{CheckpointStore, StateType};
use crate::domain::ExecutionState;
use std::sync::Arc;

pub struct ReviewPipeline;

impl ReviewPipeline {
    pub const NAME: &'static str = "review";
    const STATE_VERSION: u32 = 1;
}

impl Pipeline for ReviewPipeline {
    fn metadata(&self) -> PipelineMetadata {
        PipelineMetadata {
            name: Self::NAME,
            display_name: "Review",
            description: "Reviewer inspects the worktree, developer fixes until approved",
            supports_planning: false,
        }
    }

    fn create_graph(&self, checkpoints: Arc<dyn CheckpointStore>) -> PipelineGraph {
        PipelineGraph::new(self.state_type(), REVIEWER_NODE, checkpoints)
            .node(REVIEWER_NODE, ReviewerNode)
            .node(DEVELOPER_NODE, DeveloperNode)
    }

    fn initial_state(&self, args: PipelineArgs) -> ExecutionState {
        let (issue, design) = inputs_from(&args.payload);
        ExecutionState::new(args.workflow_id, Self::NAME, args.profile_id, args.worktree)
            .with_inputs(issue, design)
    }

    fn state_type(&self) -> StateType {
        StateType::new("review_state", Self::STATE_VERSION)
    }
}
