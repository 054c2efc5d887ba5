//! Persisted ledger records.
//!
//! Field names on the wire match the files written by earlier releases
//! (`steam_id`, `promo_name`, `activation_date`, ...), so existing
//! `activations.json` / `temporary_items.json` files load unchanged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// Durable proof that a player redeemed a code. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    #[serde(rename = "steam_id")]
    pub player_id: PlayerId,
    #[serde(rename = "promo_name")]
    pub code_name: String,
    #[serde(rename = "activation_date")]
    pub activated_at: DateTime<Utc>,
}

/// A time-limited reward that must be revoked once `expires_at` passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryGrantRecord {
    pub id: String,
    #[serde(rename = "steam_id")]
    pub player_id: PlayerId,
    #[serde(rename = "promo_name")]
    pub code_name: String,
    #[serde(rename = "activation_date")]
    pub activated_at: DateTime<Utc>,
    #[serde(rename = "expiry_date")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub is_revoked: bool,
}

impl TemporaryGrantRecord {
    /// Not revoked and not yet expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }

    /// Not revoked but already expired: the sweeper must revoke it.
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at <= now
    }

    /// Time left until expiry, clamped at zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
