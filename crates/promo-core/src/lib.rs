//! # promo-core
//!
//! Redemption orchestration and background upkeep for the promo service.
//!
//! - [`catalog`]: the in-memory promo-code catalog
//! - [`orchestrator`]: eligibility checks and the atomic `activate`
//! - [`sweeper`]: revocation of expired temporary grants
//! - [`scheduler`] / [`lifecycle`]: periodic autosave, sweep and
//!   expired-code cleanup, stopped with a final flush
//!
//! Everything is wired by explicit injection: components receive the
//! catalog, both ledgers and the host collaborators
//! ([`commands::CommandExecutor`], [`commands::PlayerDirectory`]) at
//! construction.

pub mod catalog;
pub mod commands;
pub mod lifecycle;
pub mod orchestrator;
pub mod reports;
pub mod scheduler;
pub mod sweeper;

pub use catalog::{DefinitionSink, DefinitionStore};
pub use commands::{CommandExecutor, CommandRevoker, PlayerDirectory};
pub use lifecycle::{BackgroundTasks, TaskHooks, TaskIntervals, MIN_TASK_INTERVAL};
pub use orchestrator::PromoService;
pub use sweeper::{ExpirySweeper, RevokeCallback, SweepPhase, SweepReport};

/// Failure to run a host command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("no host connected to execute commands")]
    NoHost,

    #[error("host rejected `{command}`: {reason}")]
    Rejected { command: String, reason: String },

    #[error("code `{0}` has no definition")]
    CodeMissing(String),

    #[error("{failed} of {total} commands failed")]
    Incomplete { failed: usize, total: usize },
}

/// Catalog mutation failure.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("code name must not be empty")]
    InvalidName,

    #[error("code `{0}` already exists")]
    Duplicate(String),

    #[error("temporary code `{0}` needs a positive duration")]
    InvalidDuration(String),

    #[error("failed to save definitions: {0}")]
    Sink(String),
}
