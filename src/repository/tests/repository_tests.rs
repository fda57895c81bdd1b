//! Tests for workflow repositories.

use super::*;
use crate::domain::{NewWorkflow, OrchestratorError, ProfileId, TimestampUtc, WorkflowPayload};
use crate::events::EventType;
use std::sync::Arc;
use tempfile::tempdir;
use uuid::Uuid;

fn workflow_on(worktree: &str, pipeline: &str) -> Workflow {
    Workflow::new(NewWorkflow {
        pipeline_type: pipeline.into(),
        profile_id: ProfileId::from("default"),
        worktree_path: WorktreePath::from(worktree),
        payload: WorkflowPayload::default(),
    })
}

fn event(workflow_id: WorkflowId, sequence: u64) -> EventRecord {
    EventRecord {
        id: Uuid::new_v4(),
        workflow_id,
        sequence,
        event_type: EventType::WorkflowStarted,
        timestamp: TimestampUtc::now(),
        agent: None,
        message: format!("event {sequence}"),
        data: None,
    }
}

async fn exercise_records(repo: Arc<dyn WorkflowRepository>) {
    let workflow = workflow_on("/repo/wt-a", "implementation");
    let id = workflow.id();

    repo.create(&workflow).await.expect("create");
    assert!(repo.create(&workflow).await.is_err(), "duplicate create");
    assert_eq!(repo.get(id).await.expect("get"), workflow);

    let updated = repo
        .set_status(
            id,
            WorkflowStatus::Failed,
            WorkflowChanges::new().failure("boom", true),
        )
        .await
        .expect("set_status");
    assert_eq!(updated.status(), WorkflowStatus::Failed);
    assert_eq!(updated.failure_reason(), Some("boom"));
    assert_eq!(repo.get(id).await.expect("get"), updated);

    let failed = repo
        .find_by_status(&[WorkflowStatus::Failed])
        .await
        .expect("find");
    assert_eq!(failed.len(), 1);
    assert!(repo
        .find_by_status(&[WorkflowStatus::Pending])
        .await
        .expect("find")
        .is_empty());

    let missing = WorkflowId::new();
    assert!(matches!(
        repo.get(missing).await,
        Err(OrchestratorError::NotFound(found)) if found == missing
    ));
}

async fn exercise_events(repo: Arc<dyn WorkflowRepository>) {
    let a = WorkflowId::new();
    let b = WorkflowId::new();
    assert_eq!(repo.get_max_sequence(a).await.expect("max"), 0);

    for seq in 1..=3 {
        repo.append_event(&event(a, seq)).await.expect("append a");
    }
    repo.append_event(&event(b, 1)).await.expect("append b");

    assert_eq!(repo.get_max_sequence(a).await.expect("max a"), 3);
    assert_eq!(repo.get_max_sequence(b).await.expect("max b"), 1);

    let after: Vec<u64> = repo
        .events_after(a, 1)
        .await
        .expect("events_after")
        .iter()
        .map(|e| e.sequence)
        .collect();
    assert_eq!(after, vec![2, 3]);
}

#[tokio::test]
async fn test_memory_repository_records() {
    exercise_records(Arc::new(MemoryRepository::new())).await;
}

#[tokio::test]
async fn test_memory_repository_events() {
    exercise_events(Arc::new(MemoryRepository::new())).await;
}

#[tokio::test]
async fn test_file_repository_records() {
    let dir = tempdir().expect("temp dir");
    let repo = FileRepository::open(dir.path()).expect("open");
    exercise_records(Arc::new(repo)).await;
}

#[tokio::test]
async fn test_file_repository_events() {
    let dir = tempdir().expect("temp dir");
    let repo = FileRepository::open(dir.path()).expect("open");
    exercise_events(Arc::new(repo)).await;
}

#[tokio::test]
async fn test_file_repository_persists_across_reopen() {
    let dir = tempdir().expect("temp dir");
    let workflow = workflow_on("/repo/wt-a", "review");
    {
        let repo = FileRepository::open(dir.path()).expect("open");
        repo.create(&workflow).await.expect("create");
        repo.append_event(&event(workflow.id(), 1)).await.expect("append");
    }

    let reopened = FileRepository::open(dir.path()).expect("reopen");
    assert_eq!(reopened.get(workflow.id()).await.expect("get"), workflow);
    assert_eq!(reopened.get_max_sequence(workflow.id()).await.expect("max"), 1);
}

#[tokio::test]
async fn test_list_filters_and_orders_newest_first() {
    let repo = MemoryRepository::new();
    let first = workflow_on("/repo/wt-a", "implementation");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = workflow_on("/repo/wt-a/", "review");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let third = workflow_on("/repo/wt-b", "implementation");
    for w in [&first, &second, &third] {
        repo.create(w).await.expect("create");
    }

    let all = repo.list(&WorkflowFilter::default()).await.expect("list");
    let ids: Vec<WorkflowId> = all.iter().map(|w| w.id()).collect();
    assert_eq!(ids, vec![third.id(), second.id(), first.id()]);

    let on_a = repo
        .list(&WorkflowFilter {
            worktree_path: Some(WorktreePath::from("/repo/wt-a")),
            ..WorkflowFilter::default()
        })
        .await
        .expect("list by worktree");
    assert_eq!(on_a.len(), 2);

    let limited = repo
        .list(&WorkflowFilter {
            pipeline_type: Some("implementation".into()),
            limit: Some(1),
            ..WorkflowFilter::default()
        })
        .await
        .expect("list by pipeline");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id(), third.id());
}
