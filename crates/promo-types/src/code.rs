//! Promo-code definitions.
//!
//! [`PromoCodeConfig`] is the shape written in configuration files;
//! [`PromoCodeDefinition`] is the resolved, in-memory form with an
//! absolute expiration instant and a typed temporary duration.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::saturating_add;
use crate::player::PlayerSession;
use crate::DEFAULT_EXPIRATION_DAYS;

/// Case-insensitive lookup key for a code name.
pub fn code_key(name: &str) -> String {
    name.to_lowercase()
}

/// A promo code as it appears in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeConfig {
    pub name: String,
    #[serde(default)]
    pub max_activations: u32,
    /// Commands run when the code is redeemed.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Commands run when a temporary grant expires.
    #[serde(default)]
    pub remove_commands: Vec<String>,
    /// Any one of these is enough; empty means unrestricted.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_expiration_days")]
    pub expiration_days: u32,
    /// Absolute expiration. Takes precedence over `expiration_days`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_temporary: bool,
    #[serde(default)]
    pub temporary_hours: u32,
}

fn default_expiration_days() -> u32 {
    DEFAULT_EXPIRATION_DAYS
}

impl PromoCodeConfig {
    /// Resolve into a definition, anchoring a relative expiration at `anchor`.
    /// A lifetime reaching past the representable range is clamped.
    pub fn resolve(&self, anchor: DateTime<Utc>) -> PromoCodeDefinition {
        let expires_at = self.expires_at.unwrap_or_else(|| {
            saturating_add(anchor, Duration::days(i64::from(self.expiration_days)))
        });
        PromoCodeDefinition {
            name: self.name.clone(),
            max_activations: self.max_activations,
            grant_commands: self.commands.clone(),
            revoke_commands: self.remove_commands.clone(),
            required_permissions: self.permissions.clone(),
            expiration_days: self.expiration_days,
            expires_at,
            is_temporary: self.is_temporary,
            temporary_duration: Duration::hours(i64::from(self.temporary_hours)),
        }
    }
}

/// A resolved promo code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromoCodeDefinition {
    pub name: String,
    pub max_activations: u32,
    pub grant_commands: Vec<String>,
    pub revoke_commands: Vec<String>,
    pub required_permissions: Vec<String>,
    /// Relative lifetime the expiration was derived from.
    pub expiration_days: u32,
    pub expires_at: DateTime<Utc>,
    pub is_temporary: bool,
    pub temporary_duration: Duration,
}

impl PromoCodeDefinition {
    /// Lookup key (lowercased name).
    pub fn key(&self) -> String {
        code_key(&self.name)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether redeeming this code creates a temporary grant.
    pub fn grants_temporary(&self) -> bool {
        self.is_temporary && self.temporary_duration > Duration::zero()
    }

    /// Temporary duration in whole hours.
    pub fn temporary_hours(&self) -> i64 {
        self.temporary_duration.num_hours()
    }

    /// Whether `session` may redeem this code.
    pub fn permits(&self, session: &PlayerSession) -> bool {
        session.has_any_permission(&self.required_permissions)
    }

    /// Convert back to configuration form, pinning the absolute expiration.
    pub fn to_config(&self) -> PromoCodeConfig {
        let hours = u32::try_from(self.temporary_hours().max(0)).unwrap_or(u32::MAX);
        PromoCodeConfig {
            name: self.name.clone(),
            max_activations: self.max_activations,
            commands: self.grant_commands.clone(),
            remove_commands: self.revoke_commands.clone(),
            permissions: self.required_permissions.clone(),
            expiration_days: self.expiration_days,
            expires_at: Some(self.expires_at),
            is_temporary: self.is_temporary,
            temporary_hours: hours,
        }
    }
}
