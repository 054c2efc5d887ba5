//! Event emission system.
//!
//! Events are pushed from the daemon to host subscribers via JSON-RPC
//! notifications. Host commands travel the same way: a `CommandIssued`
//! event is how the game host learns what to execute.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "CodeActivated", "DaemonStarted").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn now(event_type: &str, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp: chrono::Utc::now().timestamp().max(0).unsigned_abs(),
            payload,
        }
    }
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "activation", "grant", "command", "system".
    pub categories: Option<Vec<String>>,
    /// Only events concerning these players.
    pub player_ids: Option<Vec<u64>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers. Returns how many received it.
    pub fn emit(&self, event: Event) -> usize {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is not an error for plain notifications.
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref categories) = self.categories {
            let event_category = categorize_event(&event.event_type);
            if !categories.iter().any(|c| c == event_category) {
                return false;
            }
        }

        // Events without a player (system events) always pass.
        if let Some(ref player_ids) = self.player_ids {
            if let Some(pid) = event.payload.get("player_id").and_then(|v| v.as_u64()) {
                if !player_ids.contains(&pid) {
                    return false;
                }
            }
        }

        true
    }
}

/// Categorize an event type into a category.
fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        s if s.starts_with("Code") => "activation",
        s if s.starts_with("Grant") => "grant",
        s if s.starts_with("Command") || s.starts_with("Player") => "command",
        _ => "system",
    }
}
