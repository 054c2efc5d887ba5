//! Read-side views returned by the query operations of
//! [`PromoService`](crate::PromoService).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use promo_types::{PlayerId, PromoCodeDefinition};

/// Number of codes listed in [`ServiceStats::top_codes`].
pub const TOP_CODES: usize = 5;

/// Number of activations listed in [`CodeStats::recent`].
pub const RECENT_ACTIVATIONS: usize = 5;

/// Grants shown per code in a [`TemporaryItemGroup`].
pub const GROUP_PREVIEW: usize = 5;

/// Lifecycle state of a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    Active,
    /// Quota used up.
    Exhausted,
    Expired,
}

impl CodeStatus {
    pub fn of(definition: &PromoCodeDefinition, activations: usize, now: DateTime<Utc>) -> Self {
        if definition.is_expired_at(now) {
            Self::Expired
        } else if activations >= definition.max_activations as usize {
            Self::Exhausted
        } else {
            Self::Active
        }
    }
}

/// A code the caller can still redeem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSummary {
    pub name: String,
    pub activations: usize,
    pub max_activations: u32,
    pub expires_at: DateTime<Utc>,
    /// Set for codes granting a temporary reward.
    pub temporary_hours: Option<i64>,
}

/// Everything known about one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeInfo {
    pub name: String,
    pub status: CodeStatus,
    pub is_temporary: bool,
    pub temporary_hours: Option<i64>,
    pub activations: usize,
    pub max_activations: u32,
    pub expires_at: DateTime<Utc>,
    pub required_permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCount {
    pub name: String,
    pub activations: usize,
}

/// Aggregate statistics over the catalog and both ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub total_activations: usize,
    pub unique_players: usize,
    pub total_codes: usize,
    pub active_codes: usize,
    pub expired_codes: usize,
    pub temporary_codes: usize,
    pub active_grants: usize,
    /// Grants past their expiry, revoked or still waiting for the sweeper.
    pub expired_grants: usize,
    /// Most redeemed codes, descending.
    pub top_codes: Vec<CodeCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentActivation {
    pub player_id: PlayerId,
    pub display_name: String,
    pub activated_at: DateTime<Utc>,
}

/// Statistics of one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStats {
    pub name: String,
    pub status: CodeStatus,
    pub activations: usize,
    pub max_activations: u32,
    pub unique_players: usize,
    pub active_grants: usize,
    pub expired_grants: usize,
    /// Latest activations first.
    pub recent: Vec<RecentActivation>,
}

/// One active temporary grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryItem {
    pub grant_id: String,
    pub player_id: PlayerId,
    pub display_name: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub remaining_secs: i64,
    /// `remaining_secs` rendered by [`format_remaining`].
    pub remaining: String,
}

/// Active grants of one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryItemGroup {
    pub code: String,
    pub count: usize,
    /// The first [`GROUP_PREVIEW`] grants, soonest expiry first.
    pub items: Vec<TemporaryItem>,
    /// Grants not listed in `items`.
    pub more: usize,
}

/// Sizes after a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadSummary {
    pub codes: usize,
    pub activations: usize,
    pub grants: usize,
}

/// Render a remaining duration as `1d 2h 3m`, `2h 3m` or `3m`.
pub fn format_remaining(secs: i64) -> String {
    let secs = secs.max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
