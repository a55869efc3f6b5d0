//! Event bus for tournament lifecycle events
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never fails: a bus
//! without subscribers simply drops the event.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::TournamentEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 1024;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
pub struct EventBus {
    sender: broadcast::Sender<TournamentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: TournamentEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<TournamentEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events matching `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by tournament ID
    pub tournament_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by tournament ID
    pub fn tournament(mut self, tournament_id: &str) -> Self {
        self.tournament_id = Some(tournament_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &TournamentEvent) -> bool {
        if let Some(ref tid) = self.tournament_id {
            if event.tournament_id() != tid {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Receiver that skips events not matching its filter
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<TournamentEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<TournamentEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<TournamentEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
