//! Shared fixtures for orchestrator tests.

use super::{CreateWorkflow, OrchestratorDeps, OrchestratorService, OrchestratorSettings};
use crate::checkpoint::MemoryCheckpointStore;
use crate::domain::{
    ProfileId, Workflow, WorkflowId, WorkflowPayload, WorkflowStatus, WorktreePath,
};
use crate::driver::testing::MockDriver;
use crate::driver::{
    Driver, DriverError, DriverEvent, DriverRequest, DriverResponse, StaticDriverFactory,
};
use crate::events::{EventRecord, EventType};
use crate::pipelines::PipelineRegistry;
use crate::repository::{MemoryRepository, WorkflowRepository};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Harness {
    pub service: OrchestratorService,
    pub repository: Arc<MemoryRepository>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_review_passes: 3,
        driver_timeout: Duration::from_secs(5),
        cancel_grace: Duration::from_secs(2),
        event_channel_capacity: 256,
    }
}

pub fn harness(driver: Arc<dyn Driver>) -> Harness {
    harness_with(driver, test_settings())
}

pub fn harness_with(driver: Arc<dyn Driver>, settings: OrchestratorSettings) -> Harness {
    let repository = Arc::new(MemoryRepository::new());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let service = service_on(driver, repository.clone(), checkpoints.clone(), settings);
    Harness {
        service,
        repository,
        checkpoints,
    }
}

/// A service over existing stores, as after a process restart.
pub fn service_on(
    driver: Arc<dyn Driver>,
    repository: Arc<MemoryRepository>,
    checkpoints: Arc<MemoryCheckpointStore>,
    settings: OrchestratorSettings,
) -> OrchestratorService {
    OrchestratorService::new(
        OrchestratorDeps {
            repository,
            checkpoints,
            drivers: Arc::new(StaticDriverFactory(driver)),
            pipelines: PipelineRegistry::with_builtin(),
        },
        settings,
    )
}

pub fn request(worktree: &str) -> CreateWorkflow {
    request_for("implementation", worktree)
}

pub fn request_for(pipeline: &str, worktree: &str) -> CreateWorkflow {
    CreateWorkflow {
        pipeline_type: pipeline.to_string(),
        profile_id: ProfileId::from("default"),
        worktree_path: WorktreePath::from(worktree),
        payload: WorkflowPayload {
            issue_ref: Some("ISSUE-42".into()),
            issue_text: Some("Make the widget configurable".into()),
            ..WorkflowPayload::default()
        },
    }
}

impl Harness {
    pub async fn wait_for_status(&self, id: WorkflowId, status: WorkflowStatus) -> Workflow {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            let workflow = self.repository.get(id).await.expect("workflow exists");
            if workflow.status() == status {
                return workflow;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {status}; workflow is {}",
                workflow.status()
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Waits until `count` persisted events of `event_type` exist.
    pub async fn wait_for_events(
        &self,
        id: WorkflowId,
        event_type: EventType,
        count: usize,
    ) -> Vec<EventRecord> {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            let matching: Vec<EventRecord> = self
                .events(id)
                .await
                .into_iter()
                .filter(|e| e.event_type == event_type)
                .collect();
            if matching.len() >= count {
                return matching;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {count} {event_type} events"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn events(&self, id: WorkflowId) -> Vec<EventRecord> {
        self.repository
            .events_after(id, 0)
            .await
            .expect("read events")
    }

    pub async fn event_types(&self, id: WorkflowId) -> Vec<EventType> {
        self.events(id).await.into_iter().map(|e| e.event_type).collect()
    }

    /// Waits until no task is registered for `id`.
    pub async fn wait_until_idle(&self, id: WorkflowId) {
        let deadline = Instant::now() + WAIT_LIMIT;
        while self.service.active_workflows().contains(&id) {
            assert!(Instant::now() < deadline, "task for {id} never finished");
            sleep(POLL_INTERVAL).await;
        }
    }
}

/// Answers like the wrapped mock, except that some agents' calls never return.
pub struct StallingDriver {
    /// `(agent, calls that still answer before stalling)`
    stalls: Vec<(&'static str, usize)>,
    inner: MockDriver,
}

impl StallingDriver {
    /// Every call for `agent` stalls.
    pub fn new(agent: &'static str, inner: MockDriver) -> Self {
        Self {
            stalls: vec![(agent, 0)],
            inner,
        }
    }

    /// Calls for `agent` stall once it has answered `answered` times.
    pub fn stall_after(mut self, agent: &'static str, answered: usize) -> Self {
        self.stalls.push((agent, answered));
        self
    }

    fn should_stall(&self, agent: &str) -> bool {
        let made = self.inner.calls_for(agent);
        self.stalls
            .iter()
            .any(|(stalled, answered)| *stalled == agent && made >= *answered)
    }

    pub fn calls_for(&self, agent: &str) -> usize {
        self.inner.calls_for(agent)
    }

    /// Waits until `agent` has been called `count` times.
    pub async fn wait_for_calls(&self, agent: &str, count: usize) {
        let deadline = Instant::now() + WAIT_LIMIT;
        while self.inner.calls_for(agent) < count {
            assert!(Instant::now() < deadline, "{agent} was never called");
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Driver for StallingDriver {
    async fn generate(&self, request: DriverRequest) -> Result<DriverResponse, DriverError> {
        if self.should_stall(&request.agent) {
            let _ = self.inner.generate(request).await;
            return std::future::pending().await;
        }
        self.inner.generate(request).await
    }

    async fn execute_agentic(
        &self,
        request: DriverRequest,
        sink: mpsc::UnboundedSender<DriverEvent>,
    ) -> Result<DriverResponse, DriverError> {
        if self.should_stall(&request.agent) {
            let _ = self.inner.generate(request).await;
            return std::future::pending().await;
        }
        self.inner.execute_agentic(request, sink).await
    }
}
