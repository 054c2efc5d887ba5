//! Statistics command handlers.

use std::sync::Arc;

use serde_json::Value;

use promo_types::{PERMISSION_STATS, PERMISSION_TEMP, PERMISSION_TEMP_OTHERS};

use super::{authorize_optional, authorized_caller};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Aggregate statistics, or those of one code when `code` is given.
pub async fn get_stats(state: &Arc<DaemonState>, params: &Value) -> Result {
    authorize_optional(state, params, PERMISSION_STATS)?;
    let value = match params.get("code").and_then(|v| v.as_str()) {
        Some(code) => {
            let stats = state
                .service
                .code_stats(code)
                .ok_or_else(|| RpcError::code_not_found(code))?;
            serde_json::to_value(&stats)
        }
        None => serde_json::to_value(state.service.stats()),
    };
    value.map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Active temporary grants.
///
/// Needs `promocode.temp`. Without `target` the caller's own grants are
/// listed. `target` may be a player id or `"all"`; both also need the
/// `promocode.tempothers` permission.
pub async fn get_temporary_items(state: &Arc<DaemonState>, params: &Value) -> Result {
    let session = authorized_caller(state, params, PERMISSION_TEMP)?;

    let target = match params.get("target") {
        None | Some(Value::Null) => Some(session.player_id),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("all") => None,
        Some(value) => Some(
            value
                .as_u64()
                .ok_or_else(|| RpcError::invalid_params("target must be a player id or \"all\""))?,
        ),
    };

    if target != Some(session.player_id) && !session.has_permission(PERMISSION_TEMP_OTHERS) {
        return Err(RpcError::permission_denied(PERMISSION_TEMP_OTHERS));
    }

    let value = match target {
        Some(player_id) => serde_json::to_value(state.service.temporary_items(player_id))
            .map(|items| serde_json::json!({ "player_id": player_id, "items": items })),
        None => serde_json::to_value(state.service.all_temporary_items())
            .map(|groups| serde_json::json!({ "groups": groups })),
    };
    value.map_err(|e| RpcError::internal_error(&e.to_string()))
}
