//! Worktree exclusivity under sequential and concurrent launches.

use super::support::{harness, request, Harness, StallingDriver};
use super::{Launch, INTERRUPTED_REASON};
use crate::checkpoint::CheckpointStore;
use crate::domain::{OrchestratorError, WorkflowId, WorkflowStatus, WorktreePath};
use crate::driver::testing::MockDriver;
use crate::events::EventType;
use std::sync::Arc;

/// Fresh services raced per concurrency test; each round gets its own stores.
const RACE_ROUNDS: usize = 100;

fn stalling(agent: &'static str) -> Arc<StallingDriver> {
    Arc::new(StallingDriver::new(agent, MockDriver::approving(Some(1))))
}

fn busy_occupant(err: &OrchestratorError) -> Option<WorkflowId> {
    match err {
        OrchestratorError::ResourceBusy { occupant, .. } => Some(*occupant),
        _ => None,
    }
}

#[tokio::test]
async fn test_second_workflow_on_busy_worktree_names_occupant() {
    let driver = stalling("architect");
    let h = harness(driver.clone());
    let first = h
        .service
        .create(request("/repo/shared"), Launch::Start)
        .await
        .expect("create first")
        .id();
    driver.wait_for_calls("architect", 1).await;

    // Same worktree spelled with a trailing separator.
    let second = h
        .service
        .create(request("/repo/shared/"), Launch::Queue)
        .await
        .expect("create second")
        .id();
    let err = h.service.start(second).await.expect_err("worktree is busy");

    match &err {
        OrchestratorError::ResourceBusy { worktree, occupant } => {
            assert_eq!(*occupant, first);
            assert_eq!(*worktree, WorktreePath::from("/repo/shared"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        h.service.get_status(second).await.expect("status").status(),
        WorkflowStatus::Pending
    );

    h.service.cancel(first).await.expect("cancel first");
    let started = h.service.start(second).await.expect("start second");
    assert_eq!(started.status(), WorkflowStatus::InProgress);
    h.service.shutdown().await;
}

#[tokio::test]
async fn test_workflows_on_different_worktrees_run_side_by_side() {
    let driver = stalling("architect");
    let h = harness(driver.clone());

    for path in ["/repo/wt-a", "/repo/wt-b"] {
        h.service
            .create(request(path), Launch::Start)
            .await
            .expect("start");
    }
    driver.wait_for_calls("architect", 2).await;

    assert_eq!(h.service.active_workflows().len(), 2);
    h.service.shutdown().await;
    assert!(h.service.active_workflows().is_empty());
}

#[tokio::test]
async fn test_plan_now_on_busy_worktree_is_resource_busy() {
    let driver = Arc::new(StallingDriver::new("developer", MockDriver::approving(Some(1))));
    let h = harness(driver.clone());
    let running = h
        .service
        .create(request("/repo/shared"), Launch::Start)
        .await
        .expect("create running")
        .id();
    h.wait_for_events(running, EventType::ApprovalRequired, 1).await;
    h.wait_for_status(running, WorkflowStatus::Blocked).await;
    h.service.approve(running).await.expect("approve");
    driver.wait_for_calls("developer", 1).await;

    let err = h
        .service
        .create(request("/repo/shared/"), Launch::PlanNow)
        .await
        .expect_err("worktree is busy");

    assert_eq!(busy_occupant(&err), Some(running));
    assert_eq!(driver.calls_for("architect"), 1);
    let waiting = h
        .service
        .list(&Default::default())
        .await
        .expect("list")
        .into_iter()
        .find(|w| w.id() != running)
        .expect("second workflow persisted");
    assert_eq!(waiting.status(), WorkflowStatus::Pending);
    h.service.shutdown().await;
}

#[tokio::test]
async fn test_planning_run_holds_its_worktree() {
    let driver = stalling("architect");
    let h = harness(driver.clone());
    let planning = h
        .service
        .create(request("/repo/shared"), Launch::PlanNow)
        .await
        .expect("create planning")
        .id();
    driver.wait_for_calls("architect", 1).await;

    let err = h
        .service
        .create(request("/repo/shared"), Launch::Start)
        .await
        .expect_err("planning holds the worktree");

    assert_eq!(busy_occupant(&err), Some(planning));
    assert_eq!(h.service.active_workflows(), vec![planning]);
    h.service.shutdown().await;
}

#[tokio::test]
async fn test_replan_on_busy_worktree_keeps_plan() {
    // The first plan is answered; the second workflow's planning stalls and holds the worktree.
    let driver = Arc::new(
        StallingDriver::new("developer", MockDriver::approving(Some(1))).stall_after("architect", 1),
    );
    let h = harness(driver.clone());
    let blocked = h
        .service
        .create(request("/repo/shared"), Launch::PlanNow)
        .await
        .expect("create")
        .id();
    h.wait_for_events(blocked, EventType::ApprovalRequired, 1).await;
    h.wait_for_status(blocked, WorkflowStatus::Blocked).await;
    h.wait_until_idle(blocked).await;
    let holder = h
        .service
        .create(request("/repo/shared"), Launch::Start)
        .await
        .expect("start holder")
        .id();
    driver.wait_for_calls("architect", 2).await;

    let err = h.service.replan(blocked).await.expect_err("worktree is busy");

    assert_eq!(busy_occupant(&err), Some(holder));
    assert_eq!(
        h.service.get_status(blocked).await.expect("status").status(),
        WorkflowStatus::Blocked
    );
    let checkpoint = h.checkpoints.read(blocked).await.expect("read");
    assert!(checkpoint.is_some(), "plan checkpoint must survive a refused replan");
    h.service.shutdown().await;
}

async fn race_two_starts() {
    let driver = stalling("architect");
    let h = harness(driver.clone());
    let a = h
        .service
        .create(request("/repo/shared"), Launch::Queue)
        .await
        .expect("create")
        .id();
    let b = h
        .service
        .create(request("/repo/shared"), Launch::Queue)
        .await
        .expect("create")
        .id();

    let (svc_a, svc_b) = (h.service.clone(), h.service.clone());
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { svc_a.start(a).await }),
        tokio::spawn(async move { svc_b.start(b).await }),
    );
    let (ra, rb) = (ra.expect("join a"), rb.expect("join b"));

    let (winner, loser_err) = match (ra, rb) {
        (Ok(_), Err(err)) => (a, err),
        (Err(err), Ok(_)) => (b, err),
        (ra, rb) => panic!("expected exactly one start to win: {ra:?} / {rb:?}"),
    };
    assert_eq!(busy_occupant(&loser_err), Some(winner));
    assert_eq!(h.service.active_workflows(), vec![winner]);
    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_admit_exactly_one() {
    for _ in 0..RACE_ROUNDS {
        race_two_starts().await;
    }
}

/// Drives a workflow into `failed` the way a crash does: stalled in the
/// developer step, stopped without a status change, then recovered.
async fn interrupted_workflow(h: &Harness, driver: &StallingDriver, worktree: &str) -> WorkflowId {
    let id = h
        .service
        .create(request(worktree), Launch::Start)
        .await
        .expect("create")
        .id();
    h.wait_for_events(id, EventType::ApprovalRequired, 1).await;
    h.wait_for_status(id, WorkflowStatus::Blocked).await;
    h.service.approve(id).await.expect("approve");
    driver.wait_for_calls("developer", 1).await;

    h.service.shutdown().await;
    let report = h
        .service
        .recover_interrupted_workflows()
        .await
        .expect("recover");
    assert_eq!(report.failed, vec![id]);
    id
}

async fn race_resume_and_start() {
    // The first plan is answered; the racing start's plan stalls so it holds the worktree.
    let driver = Arc::new(
        StallingDriver::new("developer", MockDriver::approving(Some(1))).stall_after("architect", 1),
    );
    let h = harness(driver.clone());
    let failed = interrupted_workflow(&h, &driver, "/repo/shared").await;
    assert_eq!(
        h.service.get_status(failed).await.expect("status").failure_reason(),
        Some(INTERRUPTED_REASON)
    );
    let pending = h
        .service
        .create(request("/repo/shared"), Launch::Queue)
        .await
        .expect("create")
        .id();

    let (svc_a, svc_b) = (h.service.clone(), h.service.clone());
    let (resumed, started) = tokio::join!(
        tokio::spawn(async move { svc_a.resume(failed).await }),
        tokio::spawn(async move { svc_b.start(pending).await }),
    );
    let (resumed, started) = (resumed.expect("join resume"), started.expect("join start"));

    match (resumed, started) {
        (Ok(w), Err(err)) => {
            assert_eq!(w.status(), WorkflowStatus::InProgress);
            assert_eq!(busy_occupant(&err), Some(failed));
        }
        (Err(err), Ok(w)) => {
            assert_eq!(w.status(), WorkflowStatus::InProgress);
            assert_eq!(busy_occupant(&err), Some(pending));
            assert_eq!(
                h.service.get_status(failed).await.expect("status").status(),
                WorkflowStatus::Failed
            );
        }
        (r, s) => panic!("expected exactly one launch to win: {r:?} / {s:?}"),
    }
    assert_eq!(h.service.active_workflows().len(), 1);
    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resume_and_start_admit_exactly_one() {
    for _ in 0..RACE_ROUNDS {
        race_resume_and_start().await;
    }
}

#[tokio::test]
async fn test_start_batch_partitions_results() {
    let driver = stalling("architect");
    let h = harness(driver.clone());
    let mut ids = Vec::new();
    for path in ["/repo/a", "/repo/a", "/repo/b"] {
        ids.push(
            h.service
                .create(request(path), Launch::Queue)
                .await
                .expect("create")
                .id(),
        );
    }
    let bogus = WorkflowId::new();
    let mut requested = ids.clone();
    requested.push(bogus);

    let result = h
        .service
        .start_batch(Some(requested), None)
        .await
        .expect("batch");

    assert_eq!(result.started, vec![ids[0], ids[2]]);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[&ids[1]].contains("busy"));
    assert!(result.errors[&bogus].contains("not found"));
    h.service.shutdown().await;
}

#[tokio::test]
async fn test_start_batch_all_pending_with_worktree_filter() {
    let driver = stalling("architect");
    let h = harness(driver.clone());
    let x = h
        .service
        .create(request("/repo/x"), Launch::Queue)
        .await
        .expect("create")
        .id();
    let y = h
        .service
        .create(request("/repo/y"), Launch::Queue)
        .await
        .expect("create")
        .id();

    let result = h
        .service
        .start_batch(None, Some(&WorktreePath::from("/repo/y")))
        .await
        .expect("batch");

    assert_eq!(result.started, vec![y]);
    assert!(result.errors.is_empty());
    assert_eq!(
        h.service.get_status(x).await.expect("status").status(),
        WorkflowStatus::Pending
    );
    h.service.shutdown().await;
}
