//! Broadcast fan-out with per-workflow sequence assignment.

use super::types::{BusMessage, EventDraft, EventRecord, StreamEvent};
use crate::domain::{OrchestratorResult, TimestampUtc, WorkflowId};
use crate::repository::WorkflowRepository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Last sequence assigned for one workflow. `None` until seeded from the repository.
type SequenceCounter = Arc<tokio::sync::Mutex<Option<u64>>>;

pub struct EventBus {
    repository: Arc<dyn WorkflowRepository>,
    sender: broadcast::Sender<BusMessage>,
    counters: Mutex<HashMap<WorkflowId, SequenceCounter>>,
}

impl EventBus {
    pub fn new(repository: Arc<dyn WorkflowRepository>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            repository,
            sender,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn counter_for(&self, workflow_id: WorkflowId) -> SequenceCounter {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        counters.entry(workflow_id).or_default().clone()
    }

    /// Persists a lifecycle event and broadcasts it.
    ///
    /// Sequence assignment, persistence and broadcast all happen while the
    /// workflow's counter lock is held, so subscribers see one workflow's
    /// events in sequence order. A failed append leaves the counter untouched.
    pub async fn emit(&self, draft: EventDraft) -> OrchestratorResult<EventRecord> {
        let counter = self.counter_for(draft.workflow_id);
        let mut last = counter.lock().await;

        let previous = match *last {
            Some(seq) => seq,
            None => self.repository.get_max_sequence(draft.workflow_id).await?,
        };

        let record = EventRecord {
            id: Uuid::new_v4(),
            workflow_id: draft.workflow_id,
            sequence: previous + 1,
            event_type: draft.event_type,
            timestamp: TimestampUtc::now(),
            agent: draft.agent,
            message: draft.message,
            data: draft.data,
        };

        self.repository.append_event(&record).await?;
        *last = Some(record.sequence);

        debug!(
            workflow_id = %record.workflow_id,
            sequence = record.sequence,
            event_type = %record.event_type,
            "Emitted lifecycle event"
        );
        // No subscribers is fine
        let _ = self.sender.send(BusMessage::Event(record.clone()));
        Ok(record)
    }

    /// Broadcasts an ephemeral event to current subscribers only.
    pub fn emit_stream(&self, draft: EventDraft) {
        let event = StreamEvent {
            id: Uuid::new_v4(),
            workflow_id: draft.workflow_id,
            event_type: draft.event_type,
            timestamp: TimestampUtc::now(),
            agent: draft.agent,
            message: draft.message,
            data: draft.data,
        };
        let _ = self.sender.send(BusMessage::Stream(event));
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Persisted events for `workflow_id` with `sequence > after`, in order.
    pub async fn backfill(
        &self,
        workflow_id: WorkflowId,
        after: u64,
    ) -> OrchestratorResult<Vec<EventRecord>> {
        self.repository.events_after(workflow_id, after).await
    }

    /// Drops the workflow's counter unless an emitter is using it.
    ///
    /// The next emit re-seeds from the repository, so forgetting never
    /// rewinds a sequence.
    pub fn forget(&self, workflow_id: WorkflowId) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(counter) = counters.get(&workflow_id) {
            if Arc::strong_count(counter) == 1 {
                counters.remove(&workflow_id);
            }
        }
    }

    pub fn tracked_workflows(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFilter {
    All,
    Workflow(WorkflowId),
}

impl SubscriptionFilter {
    pub fn matches(&self, workflow_id: WorkflowId) -> bool {
        match self {
            Self::All => true,
            Self::Workflow(id) => *id == workflow_id,
        }
    }
}

pub struct EventSubscription {
    receiver: broadcast::Receiver<BusMessage>,
    filter: SubscriptionFilter,
}

impl EventSubscription {
    /// Next message matching the filter, or `None` once the bus is gone.
    ///
    /// A lagging subscriber skips the overwritten messages; persisted events
    /// it missed can be fetched with [`EventBus::backfill`].
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.filter.matches(message.workflow_id()) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/bus_tests.rs"]
mod tests;
