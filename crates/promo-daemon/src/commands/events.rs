//! Event subscription handlers.
//!
//! A subscription lives as long as the connection that created it; the
//! RPC layer forwards every matching event to it as a notification.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::events::{Event, EventFilter};
use crate::rpc::RpcError;
use crate::DaemonState;

/// An open event subscription.
pub struct Subscription {
    pub id: String,
    pub filter: EventFilter,
    pub receiver: broadcast::Receiver<Event>,
}

/// Subscribe to daemon events, optionally filtered by `categories` and
/// `player_ids`.
pub fn subscribe_events(
    state: &Arc<DaemonState>,
    params: &Value,
) -> Result<(Value, Subscription), RpcError> {
    let filter: EventFilter = match params.get("filter") {
        None | Some(Value::Null) => EventFilter::default(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| RpcError::invalid_params(&format!("invalid filter: {e}")))?,
    };

    // Generate subscription ID
    let sub_id: [u8; 16] = rand::random();
    let id = hex::encode(sub_id);

    let receiver = state.event_bus.subscribe();
    info!(subscription = %id, subscribers = state.event_bus.subscriber_count(), "event subscription opened");

    Ok((
        serde_json::json!({ "subscription_id": id }),
        Subscription {
            id,
            filter,
            receiver,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_receives_commands() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());

        let params = serde_json::json!({"filter": {"categories": ["command"]}});
        let (result, mut subscription) = subscribe_events(&state, &params).expect("subscribe");
        assert_eq!(result["subscription_id"].as_str().map(str::len), Some(32));

        promo_core::CommandExecutor::execute(state.host.as_ref(), 1, "say hi").expect("execute");
        let event = subscription.receiver.recv().await.expect("event");
        assert!(subscription.filter.matches(&event));
        assert_eq!(event.payload["command"], "say hi");

        let bad = serde_json::json!({"filter": {"categories": "command"}});
        assert!(subscribe_events(&state, &bad).is_err());
    }
}
