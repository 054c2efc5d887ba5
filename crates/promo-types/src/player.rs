//! Player identity as seen by the promo service.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Stable player identifier (the host's 64-bit account id).
pub type PlayerId = u64;

/// A live player session reported by the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSession {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Permissions the host grants this player.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl PlayerSession {
    /// Create a session without any permissions.
    pub fn new(player_id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            player_id,
            display_name: display_name.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// Attach permissions to the session.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Whether the player holds `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Whether the player holds at least one of `required`.
    ///
    /// An empty `required` list is unrestricted.
    pub fn has_any_permission(&self, required: &[String]) -> bool {
        required.is_empty() || required.iter().any(|p| self.has_permission(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_permission() {
        let session = PlayerSession::new(7, "Alice").with_permissions(["promocode.vip"]);
        assert!(session.has_any_permission(&[]));
        assert!(session.has_any_permission(&[
            "promocode.use".to_string(),
            "promocode.vip".to_string(),
        ]));
        assert!(!session.has_any_permission(&["promocode.admin".to_string()]));
    }
}
