//! Player session command handlers.

use std::sync::Arc;

use serde_json::Value;

use promo_types::PlayerSession;

use super::{player_id_param, str_param};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Register an online player and the permissions the host grants them.
pub async fn player_joined(state: &Arc<DaemonState>, params: &Value) -> Result {
    let player_id = player_id_param(params)?;
    let display_name = str_param(params, "display_name")?;
    let permissions: Vec<String> = match params.get("permissions") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|_| RpcError::invalid_params("permissions must be a list of strings"))?,
    };

    let session = PlayerSession::new(player_id, display_name).with_permissions(permissions);
    let registered = state.host.register(session);
    Ok(serde_json::json!({
        "registered": registered,
        "online": state.host.online_count(),
    }))
}

/// Forget a player who left.
pub async fn player_left(state: &Arc<DaemonState>, params: &Value) -> Result {
    let player_id = player_id_param(params)?;
    Ok(serde_json::json!({"removed": state.host.unregister(player_id)}))
}
