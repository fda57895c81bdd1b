//! Tests for workflow records and execution state.

use super::*;
use std::path::PathBuf;

fn sample_workflow() -> Workflow {
    Workflow::new(NewWorkflow {
        pipeline_type: "implementation".into(),
        profile_id: ProfileId::from("default"),
        worktree_path: WorktreePath::from("/repo/wt-a/"),
        payload: WorkflowPayload {
            issue_ref: Some("ISSUE-1".into()),
            issue_text: Some("Add a flag".into()),
            ..WorkflowPayload::default()
        },
    })
}

fn sample_state() -> ExecutionState {
    ExecutionState::new(
        WorkflowId::new(),
        "implementation",
        ProfileId::from("default"),
        PathBuf::from("/repo/wt-a"),
    )
}

#[test]
fn test_new_workflow_is_pending_without_timestamps() {
    let workflow = sample_workflow();

    assert_eq!(workflow.status(), WorkflowStatus::Pending);
    assert!(workflow.started_at().is_none());
    assert!(workflow.completed_at().is_none());
    assert!(workflow.failure_reason().is_none());
    assert_eq!(workflow.checkpoint_key(), workflow.id());
}

#[test]
fn test_worktree_path_normalises_trailing_separator() {
    assert_eq!(WorktreePath::from("/repo/wt-a/"), WorktreePath::from("/repo/wt-a"));
    assert_eq!(WorktreePath::from("/repo/./wt-a"), WorktreePath::from("/repo/wt-a"));
}

#[test]
fn test_with_changes_returns_new_value() {
    let original = sample_workflow();
    let failed = original.with_changes(
        WorkflowChanges::new()
            .status(WorkflowStatus::Failed)
            .failure("boom", true),
    );

    assert_eq!(original.status(), WorkflowStatus::Pending);
    assert_eq!(failed.status(), WorkflowStatus::Failed);
    assert_eq!(failed.failure_reason(), Some("boom"));
    assert!(failed.recoverable());

    let resumed = failed.with_changes(
        WorkflowChanges::new()
            .status(WorkflowStatus::InProgress)
            .clear_failure(),
    );
    assert!(resumed.failure_reason().is_none());
    assert!(!resumed.recoverable());
    assert_eq!(resumed.id(), original.id());
}

#[test]
fn test_payload_without_plan_keeps_inputs() {
    let payload = WorkflowPayload {
        issue_ref: Some("ISSUE-1".into()),
        design_text: Some("design".into()),
        plan_ref: Some("plan.md".into()),
        plan_summary: Some("summary".into()),
        total_tasks: Some(3),
        current_task_index: 2,
        review_iteration: 4,
        task_review_iteration: 1,
        human_approved: Some(true),
        human_feedback: Some("ok".into()),
        ..WorkflowPayload::default()
    };

    let cleared = payload.without_plan();

    assert_eq!(cleared.issue_ref.as_deref(), Some("ISSUE-1"));
    assert_eq!(cleared.design_text.as_deref(), Some("design"));
    assert!(cleared.plan_ref.is_none());
    assert!(cleared.plan_summary.is_none());
    assert!(cleared.total_tasks.is_none());
    assert_eq!(cleared.current_task_index, 0);
    assert_eq!(cleared.review_iteration, 0);
    assert_eq!(cleared.task_review_iteration, 0);
    assert!(cleared.human_approved.is_none());
    assert!(cleared.human_feedback.is_none());
}

#[test]
fn test_status_round_trips_through_display() {
    for status in WorkflowStatus::ALL {
        let parsed: WorkflowStatus = status.to_string().parse().expect("parse status");
        assert_eq!(parsed, status);
    }
    assert!("running".parse::<WorkflowStatus>().is_err());
}

#[test]
fn test_status_serializes_snake_case() {
    let json = serde_json::to_string(&WorkflowStatus::InProgress).expect("serialize");
    assert_eq!(json, "\"in_progress\"");
}

#[test]
fn test_apply_appends_history() {
    let state = sample_state().apply(
        StateUpdate::new().history(HistoryEntry::new("architect", "planned")),
    );
    let next = state.apply(
        StateUpdate::new()
            .history(HistoryEntry::new("developer", "implemented"))
            .history(HistoryEntry::new("reviewer", "approved")),
    );

    let agents: Vec<&str> = next.history().iter().map(|h| h.agent.as_str()).collect();
    assert_eq!(agents, vec!["architect", "developer", "reviewer"]);
    assert_eq!(state.history().len(), 1);
}

#[test]
fn test_merge_prefers_newer_scalars_and_concatenates_history() {
    let first = StateUpdate::new()
        .review_iteration(1)
        .current_task_index(0)
        .history(HistoryEntry::new("developer", "first"));
    let second = StateUpdate::new()
        .review_iteration(2)
        .history(HistoryEntry::new("reviewer", "second"));

    let state = sample_state().apply(first.merge(second));

    assert_eq!(state.review_iteration(), 2);
    assert_eq!(state.current_task_index(), 0);
    assert_eq!(state.history().len(), 2);
}

#[test]
fn test_project_onto_copies_counters() {
    let state = sample_state().apply(
        StateUpdate::new()
            .plan("### Task 1\n### Task 2".into(), "two tasks".into(), Some(2))
            .plan_path(PathBuf::from("/repo/wt-a/plan.md"))
            .current_task_index(1)
            .human_decision(true, None),
    );

    let payload = state.project_onto(&WorkflowPayload {
        issue_ref: Some("ISSUE-1".into()),
        ..WorkflowPayload::default()
    });

    assert_eq!(payload.issue_ref.as_deref(), Some("ISSUE-1"));
    assert_eq!(payload.plan_ref.as_deref(), Some("/repo/wt-a/plan.md"));
    assert_eq!(payload.total_tasks, Some(2));
    assert_eq!(payload.current_task_index, 1);
    assert_eq!(payload.human_approved, Some(true));
}

#[test]
fn test_execution_state_survives_json() {
    let state = sample_state()
        .with_inputs(Some("issue".into()), None)
        .apply(StateUpdate::new().last_review(Some(ReviewResult {
            reviewer: "reviewer".into(),
            approved: false,
            summary: "needs work".into(),
            comments: vec!["fix tests".into()],
        })));

    let json = serde_json::to_string(&state).expect("serialize");
    let restored: ExecutionState = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(restored, state);
}
