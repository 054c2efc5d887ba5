//! Result of an activation attempt.
//!
//! Every variant except `Failed` is an expected outcome that the caller
//! reports to the player verbatim; none of them is an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::player::PlayerId;
use crate::records::TemporaryGrantRecord;

/// Details of a successful redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationReceipt {
    pub code: String,
    pub player_id: PlayerId,
    pub activated_at: DateTime<Utc>,
    /// Present when the code grants a temporary reward.
    pub grant: Option<TemporaryGrantRecord>,
}

/// Outcome of `activate(player, code)`, in evaluation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivationOutcome {
    Success(ActivationReceipt),
    NotFound { code: String },
    Expired { code: String, expired_at: DateTime<Utc> },
    NoPermission { code: String },
    AlreadyActivated { code: String },
    QuotaReached { code: String, max_activations: u32 },
    Failed { reason: String },
}

impl ActivationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Stable snake_case status name.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound { .. } => "not_found",
            Self::Expired { .. } => "expired",
            Self::NoPermission { .. } => "no_permission",
            Self::AlreadyActivated { .. } => "already_activated",
            Self::QuotaReached { .. } => "quota_reached",
            Self::Failed { .. } => "failed",
        }
    }
}
