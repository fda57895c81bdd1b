//! Next-hop decision after a review step.
//!
//! Single-shot workflows (no task count) and multi-task workflows route
//! differently and are kept as two separate functions:
//!
//! | mode        | verdict  | condition               | route       |
//! |-------------|----------|-------------------------|-------------|
//! | single-shot | approved |                         | `End`       |
//! | single-shot | rejected |                         | `Developer` |
//! | multi-task  | approved | not on the last task    | `NextTask`  |
//! | multi-task  | approved | on the last task        | `End`       |
//! | multi-task  | rejected | any task                | `Developer` |
//!
//! Every call counts one review pass. A rejection that uses up
//! `max_review_passes` fails with [`RoutingError::ReviewPassesExhausted`].

use crate::domain::{ExecutionState, OrchestratorError, StateUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewRoute {
    End,
    NextTask,
    Developer,
}

/// Route plus the counter updates that go with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub route: ReviewRoute,
    pub update: StateUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("review loop exhausted after {passes} passes without approval")]
    ReviewPassesExhausted { passes: u32 },

    #[error("no review result to route on")]
    MissingReview,
}

impl From<RoutingError> for OrchestratorError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::ReviewPassesExhausted { passes } => {
                OrchestratorError::ReviewPassesExhausted { passes }
            }
            RoutingError::MissingReview => OrchestratorError::Configuration(err.to_string()),
        }
    }
}

/// Decides where a workflow goes after `state.last_review()`.
pub fn route_after_review(
    state: &ExecutionState,
    max_review_passes: u32,
) -> Result<RoutingDecision, RoutingError> {
    let approved = state
        .last_review()
        .map(|r| r.approved)
        .ok_or(RoutingError::MissingReview)?;

    match state.total_tasks() {
        None => route_single_shot(state, approved, max_review_passes),
        Some(total_tasks) => route_multi_task(state, approved, total_tasks, max_review_passes),
    }
}

/// Whole-change review: approve ends, reject loops back to the developer.
pub fn route_single_shot(
    state: &ExecutionState,
    approved: bool,
    max_review_passes: u32,
) -> Result<RoutingDecision, RoutingError> {
    let passes = state.review_iteration() + 1;
    let update = StateUpdate::new().review_iteration(passes);

    if approved {
        return Ok(RoutingDecision {
            route: ReviewRoute::End,
            update,
        });
    }
    if passes >= max_review_passes {
        return Err(RoutingError::ReviewPassesExhausted { passes });
    }
    Ok(RoutingDecision {
        route: ReviewRoute::Developer,
        update,
    })
}

/// Per-task review: approval advances to the next task until the last one.
///
/// The pass cap applies per task; `task_review_iteration` resets when a task
/// is approved.
pub fn route_multi_task(
    state: &ExecutionState,
    approved: bool,
    total_tasks: u32,
    max_review_passes: u32,
) -> Result<RoutingDecision, RoutingError> {
    let task_passes = state.task_review_iteration() + 1;
    let update = StateUpdate::new().review_iteration(state.review_iteration() + 1);
    let index = state.current_task_index();

    if approved {
        if index + 1 < total_tasks {
            return Ok(RoutingDecision {
                route: ReviewRoute::NextTask,
                update: update.current_task_index(index + 1).task_review_iteration(0),
            });
        }
        return Ok(RoutingDecision {
            route: ReviewRoute::End,
            update: update.task_review_iteration(task_passes),
        });
    }
    if task_passes >= max_review_passes {
        return Err(RoutingError::ReviewPassesExhausted {
            passes: task_passes,
        });
    }
    Ok(RoutingDecision {
        route: ReviewRoute::Developer,
        update: update.task_review_iteration(task_passes),
    })
}

#[cfg(test)]
#[path = "tests/routing_tests.rs"]
mod tests;
