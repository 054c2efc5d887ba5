//! Redemption command handlers.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use promo_types::{ActivationOutcome, PERMISSION_INFO, PERMISSION_LIST, PERMISSION_USE};

use super::{authorize_optional, authorized_caller, str_param};
use crate::events::Event;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Redeem a code for an online player.
///
/// Every expected outcome is a success response whose `status` names it;
/// only malformed requests, offline callers and callers without
/// `promocode.use` are RPC errors.
pub async fn activate_code(state: &Arc<DaemonState>, params: &Value) -> Result {
    let session = authorized_caller(state, params, PERMISSION_USE)?;
    let code = str_param(params, "code")?;

    let outcome = state.service.activate(&session, code);
    debug!(player_id = session.player_id, code, status = outcome.status(), "activation handled");

    if let ActivationOutcome::Success(receipt) = &outcome {
        state.event_bus.emit(Event::now(
            "CodeActivated",
            serde_json::json!({
                "player_id": receipt.player_id,
                "code": receipt.code,
                "temporary": receipt.grant.is_some(),
            }),
        ));
    }

    serde_json::to_value(&outcome).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Codes the caller can still redeem.
pub async fn list_codes(state: &Arc<DaemonState>, params: &Value) -> Result {
    let session = authorized_caller(state, params, PERMISSION_LIST)?;
    let codes = state.service.eligible_codes(&session);
    Ok(serde_json::json!({ "codes": codes }))
}

/// Details of one code.
pub async fn code_info(state: &Arc<DaemonState>, params: &Value) -> Result {
    authorize_optional(state, params, PERMISSION_INFO)?;
    let code = str_param(params, "code")?;
    let info = state
        .service
        .code_info(code)
        .ok_or_else(|| RpcError::code_not_found(code))?;
    serde_json::to_value(&info).map_err(|e| RpcError::internal_error(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::join;

    #[tokio::test]
    async fn test_activate_reports_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());
        join(&state, 1, &["promocode.use"]);
        join(&state, 2, &["promocode.use"]);
        join(&state, 3, &["promocode.use"]);
        join(&state, 4, &[]);

        let mut events = state.event_bus.subscribe();
        let params = serde_json::json!({"player_id": 1, "code": "Welcome"});
        let first = activate_code(&state, &params).await.expect("activate");
        assert_eq!(first["status"], "success");

        // The grant command reached the subscribed host.
        let issued = events.try_recv().expect("command");
        assert_eq!(issued.event_type, "CommandIssued");
        assert_eq!(issued.payload["command"], "give player1 363 1");
        assert_eq!(events.try_recv().expect("activation").event_type, "CodeActivated");

        let again = activate_code(&state, &params).await.expect("activate");
        assert_eq!(again["status"], "already_activated");

        let quota = activate_code(&state, &serde_json::json!({"player_id": 2, "code": "welcome"}))
            .await
            .expect("activate");
        assert_eq!(quota["status"], "quota_reached");

        let denied = activate_code(&state, &serde_json::json!({"player_id": 3, "code": "vip1day"}))
            .await
            .expect("activate");
        assert_eq!(denied["status"], "no_permission");

        let missing = activate_code(&state, &serde_json::json!({"player_id": 3, "code": "nope"}))
            .await
            .expect("activate");
        assert_eq!(missing["status"], "not_found");

        let err = activate_code(&state, &serde_json::json!({"player_id": 4, "code": "nope"}))
            .await
            .expect_err("no promocode.use");
        assert_eq!(err.code, -32031);
    }

    #[tokio::test]
    async fn test_offline_caller_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());
        let err = activate_code(&state, &serde_json::json!({"player_id": 9, "code": "welcome"}))
            .await
            .expect_err("offline");
        assert_eq!(err.code, -32020);
    }

    #[tokio::test]
    async fn test_list_and_info() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());
        join(&state, 1, &["promocode.list", "promocode.info", "promocode.vip"]);
        join(&state, 2, &["promocode.use"]);

        let listed = list_codes(&state, &serde_json::json!({"player_id": 1})).await.expect("list");
        let codes = listed["codes"].as_array().expect("array");
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0]["name"], "vip1day");
        assert_eq!(codes[0]["temporary_hours"], 24);

        let info = code_info(&state, &serde_json::json!({"player_id": 1, "code": "VIP1DAY"}))
            .await
            .expect("info");
        assert_eq!(info["status"], "active");
        assert_eq!(info["is_temporary"], true);

        let console = code_info(&state, &serde_json::json!({"code": "welcome"})).await.expect("info");
        assert_eq!(console["name"], "welcome");

        let err = list_codes(&state, &serde_json::json!({"player_id": 2})).await.expect_err("denied");
        assert_eq!(err.message, "PERMISSION_DENIED");
        let err = code_info(&state, &serde_json::json!({"player_id": 2, "code": "welcome"}))
            .await
            .expect_err("denied");
        assert_eq!(err.code, -32031);

        let err = code_info(&state, &serde_json::json!({"code": "nope"})).await.expect_err("missing");
        assert_eq!(err.message, "CODE_NOT_FOUND");
    }
}
