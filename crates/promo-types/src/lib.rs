//! # promo-types
//!
//! Shared domain types used across the promo-code workspace: code
//! definitions, the two persisted record kinds, player sessions, the
//! activation outcome and the injectable clock.

pub mod clock;
pub mod code;
pub mod outcome;
pub mod player;
pub mod records;

pub use clock::{latest_instant, saturating_add, saturating_sub, Clock, ManualClock, SystemClock};
pub use code::{code_key, PromoCodeConfig, PromoCodeDefinition};
pub use outcome::{ActivationOutcome, ActivationReceipt};
pub use player::{PlayerId, PlayerSession};
pub use records::{ActivationRecord, TemporaryGrantRecord};

/// Default lifetime of a code, in days, when configuration omits it.
pub const DEFAULT_EXPIRATION_DAYS: u32 = 30;

/// Redeem codes.
pub const PERMISSION_USE: &str = "promocode.use";

/// List the codes a player can still redeem.
pub const PERMISSION_LIST: &str = "promocode.list";

/// Inspect one code.
pub const PERMISSION_INFO: &str = "promocode.info";

/// Inspect one's own temporary grants.
pub const PERMISSION_TEMP: &str = "promocode.temp";

/// Inspect other players' temporary grants.
pub const PERMISSION_TEMP_OTHERS: &str = "promocode.tempothers";

/// Read activation statistics.
pub const PERMISSION_STATS: &str = "promocode.stats";

/// Reload or extend the code catalog.
pub const PERMISSION_RELOAD: &str = "promocode.reload";
