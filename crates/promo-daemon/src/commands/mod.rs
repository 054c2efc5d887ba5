//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category.
//!
//! A request carrying `player_id` acts for that player, who must be online
//! and hold the command's `promocode.*` permission. Catalog and statistics
//! commands may omit `player_id`; such requests come from the host's own
//! console and are not permission checked.

pub mod admin;
pub mod codes;
pub mod events;
pub mod players;
pub mod stats;

use serde_json::Value;

use promo_types::{PlayerId, PlayerSession};

use crate::rpc::RpcError;
use crate::DaemonState;

/// Required `player_id` parameter.
pub(crate) fn player_id_param(params: &Value) -> Result<PlayerId, RpcError> {
    params
        .get("player_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params("player_id required"))
}

/// Required string parameter `name`.
pub(crate) fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, RpcError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} required")))
}

/// Session of the calling player, who must be online.
pub(crate) fn caller_session(state: &DaemonState, params: &Value) -> Result<PlayerSession, RpcError> {
    let player_id = player_id_param(params)?;
    promo_core::PlayerDirectory::find(state.host.as_ref(), player_id)
        .ok_or_else(|| RpcError::player_offline(player_id))
}

/// Session of the calling player, who must be online and hold `permission`.
pub(crate) fn authorized_caller(
    state: &DaemonState,
    params: &Value,
    permission: &str,
) -> Result<PlayerSession, RpcError> {
    let session = caller_session(state, params)?;
    if !session.has_permission(permission) {
        return Err(RpcError::permission_denied(permission));
    }
    Ok(session)
}

/// Check `permission` when a player issued the request. Console requests
/// carry no `player_id` and pass.
pub(crate) fn authorize_optional(
    state: &DaemonState,
    params: &Value,
    permission: &str,
) -> Result<Option<PlayerSession>, RpcError> {
    match params.get("player_id") {
        None | Some(Value::Null) => Ok(None),
        Some(_) => authorized_caller(state, params, permission).map(Some),
    }
}

/// Register an online player with `permissions` on a test daemon.
#[cfg(test)]
pub(crate) fn join(state: &DaemonState, player_id: PlayerId, permissions: &[&str]) {
    state.host.register(
        PlayerSession::new(player_id, format!("player{player_id}"))
            .with_permissions(permissions.iter().copied()),
    );
}

/// Daemon state over a scratch data directory, with a fixed code catalog.
#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> std::sync::Arc<DaemonState> {
    use std::sync::Arc;

    let mut config = crate::config::DaemonConfig::default();
    config.storage.data_dir = dir.display().to_string();
    config.codes[0].max_activations = 1;
    let config_path = dir.join(crate::config::CONFIG_FILE);
    config.save_to(&config_path).expect("save config");
    DaemonState::build(config, config_path, Arc::new(promo_types::SystemClock))
}
