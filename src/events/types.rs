use crate::domain::{TimestampUtc, WorkflowId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Lifecycle (persisted, one per status transition)
    WorkflowStarted,
    PlanningStarted,
    ApprovalRequired,
    ApprovalGranted,
    ApprovalRejected,
    WorkflowResumed,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,

    // Stream (ephemeral)
    StageStarted,
    StageCompleted,
    AgentOutput,
    TaskStarted,
    ReviewCompleted,
}

impl EventType {
    /// Lifecycle events after which no further events arrive until a user acts.
    pub fn is_settling(&self) -> bool {
        matches!(
            self,
            Self::ApprovalRequired
                | Self::ApprovalRejected
                | Self::WorkflowCompleted
                | Self::WorkflowFailed
                | Self::WorkflowCancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "workflow_started",
            Self::PlanningStarted => "planning_started",
            Self::ApprovalRequired => "approval_required",
            Self::ApprovalGranted => "approval_granted",
            Self::ApprovalRejected => "approval_rejected",
            Self::WorkflowResumed => "workflow_resumed",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::StageStarted => "stage_started",
            Self::StageCompleted => "stage_completed",
            Self::AgentOutput => "agent_output",
            Self::TaskStarted => "task_started",
            Self::ReviewCompleted => "review_completed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub workflow_id: WorkflowId,
    pub sequence: u64,
    pub event_type: EventType,
    pub timestamp: TimestampUtc,
    #[serde(default)]
    pub agent: Option<String>,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Ephemeral execution detail. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: Uuid,
    pub workflow_id: WorkflowId,
    pub event_type: EventType,
    pub timestamp: TimestampUtc,
    #[serde(default)]
    pub agent: Option<String>,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// What subscribers receive from the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Event(EventRecord),
    Stream(StreamEvent),
}

impl BusMessage {
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            Self::Event(e) => e.workflow_id,
            Self::Stream(s) => s.workflow_id,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Self::Event(e) => e.event_type,
            Self::Stream(s) => s.event_type,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Event(e) => &e.message,
            Self::Stream(s) => &s.message,
        }
    }
}

/// Event contents before the bus stamps an ID, timestamp and sequence.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub workflow_id: WorkflowId,
    pub event_type: EventType,
    pub agent: Option<String>,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl EventDraft {
    pub fn new(workflow_id: WorkflowId, event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            workflow_id,
            event_type,
            agent: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
