//! Workflow events: sequenced lifecycle records and ephemeral stream events.
//!
//! Lifecycle events are persisted through the repository with a per-workflow
//! sequence number. Stream events carry fine-grained execution detail and are
//! only delivered to subscribers that are listening when they are emitted.

mod bus;
mod types;

pub use bus::{EventBus, EventSubscription, SubscriptionFilter};
pub use types::{BusMessage, EventDraft, EventRecord, EventType, StreamEvent};
