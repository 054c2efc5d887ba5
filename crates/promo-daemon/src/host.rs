//! Bridge to the game host.
//!
//! The host reports player sessions through `player_joined` /
//! `player_left` and receives commands as `CommandIssued` events on its
//! event subscription.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use promo_core::{CommandError, CommandExecutor, PlayerDirectory};
use promo_types::{PlayerId, PlayerSession};

use crate::events::{Event, EventBus};

/// Session registry and command channel of the connected host.
pub struct HostBridge {
    bus: EventBus,
    sessions: RwLock<HashMap<PlayerId, PlayerSession>>,
}

impl HostBridge {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Record an online player. Returns `false` if the session replaced an
    /// existing one.
    pub fn register(&self, session: PlayerSession) -> bool {
        debug!(player_id = session.player_id, name = %session.display_name, "player session registered");
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.player_id, session)
            .is_none()
    }

    /// Forget a player. Returns whether the player was online.
    pub fn unregister(&self, player_id: PlayerId) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&player_id)
            .is_some()
    }

    pub fn online_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl CommandExecutor for HostBridge {
    fn execute(&self, player_id: PlayerId, command: &str) -> Result<(), CommandError> {
        let delivered = self.bus.emit(Event::now(
            "CommandIssued",
            serde_json::json!({ "player_id": player_id, "command": command }),
        ));
        if delivered == 0 {
            return Err(CommandError::NoHost);
        }
        Ok(())
    }
}

impl PlayerDirectory for HostBridge {
    fn find(&self, player_id: PlayerId) -> Option<PlayerSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&player_id)
            .cloned()
    }

    fn notify(&self, player_id: PlayerId, message: &str) {
        if self.find(player_id).is_some() {
            self.bus.emit(Event::now(
                "PlayerNotice",
                serde_json::json!({ "player_id": player_id, "message": message }),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_without_host_fails() {
        let bridge = HostBridge::new(EventBus::new(16));
        assert!(matches!(
            bridge.execute(1, "give Alice 363 1"),
            Err(CommandError::NoHost)
        ));
    }

    #[test]
    fn test_execute_emits_command_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let bridge = HostBridge::new(bus);
        bridge.execute(1, "give Alice 363 1").expect("execute");

        let event = rx.try_recv().expect("event");
        assert_eq!(event.event_type, "CommandIssued");
        assert_eq!(event.payload["command"], "give Alice 363 1");
        assert_eq!(event.payload["player_id"], 1);
    }

    #[test]
    fn test_sessions_and_notify() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let bridge = HostBridge::new(bus);

        bridge.notify(7, "offline players are skipped");
        assert!(rx.try_recv().is_err());

        assert!(bridge.register(PlayerSession::new(7, "Alice")));
        assert!(!bridge.register(PlayerSession::new(7, "Alice")));
        assert_eq!(bridge.find(7).map(|s| s.display_name), Some("Alice".to_string()));

        bridge.notify(7, "hello");
        assert_eq!(rx.try_recv().expect("notice").event_type, "PlayerNotice");

        assert!(bridge.unregister(7));
        assert!(!bridge.unregister(7));
        assert_eq!(bridge.online_count(), 0);
    }
}
