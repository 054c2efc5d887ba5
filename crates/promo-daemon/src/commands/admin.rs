//! Administration command handlers.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use promo_core::CatalogError;
use promo_types::{PromoCodeConfig, PERMISSION_RELOAD};

use super::authorize_optional;
use crate::config::DaemonConfig;
use crate::events::Event;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Re-read the configuration file, replace the catalog and reload both
/// ledgers from disk.
pub async fn reload(state: &Arc<DaemonState>, params: &Value) -> Result {
    authorize_optional(state, params, PERMISSION_RELOAD)?;
    let config = DaemonConfig::load_from(&state.config_path)
        .map_err(|e| RpcError::internal_error(&format!("config error: {e}")))?;

    let service = state.service.clone();
    let codes = config.codes.clone();
    let summary = tokio::task::spawn_blocking(move || service.reload(&codes))
        .await
        .map_err(|e| RpcError::internal_error(&format!("reload failed: {e}")))?;

    *state.config.write().await = config;
    state.event_bus.emit(Event::now(
        "CatalogReloaded",
        serde_json::json!({ "codes": summary.codes }),
    ));

    serde_json::to_value(summary).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Create a new code and save the catalog to the configuration file.
/// A player caller needs `promocode.reload`.
pub async fn add_code(state: &Arc<DaemonState>, params: &Value) -> Result {
    authorize_optional(state, params, PERMISSION_RELOAD)?;
    let config: PromoCodeConfig = serde_json::from_value(params.clone())
        .map_err(|e| RpcError::invalid_params(&e.to_string()))?;

    let definition = match state.service.definitions().add(&config) {
        Ok(definition) => definition,
        Err(e @ CatalogError::Duplicate(_)) | Err(e @ CatalogError::InvalidName) => {
            return Err(RpcError::code_rejected(&e.to_string()));
        }
        Err(e) => return Err(RpcError::invalid_params(&e.to_string())),
    };

    let saved = match state.service.definitions().save(state.definition_sink.as_ref()) {
        Ok(()) => true,
        Err(e) => {
            error!(code = %definition.name, error = %e, "code added but catalog not saved");
            false
        }
    };
    info!(code = %definition.name, saved, "promo code created");

    Ok(serde_json::json!({
        "name": definition.name,
        "expires_at": definition.expires_at,
        "saved": saved,
    }))
}

/// Stop the daemon.
pub async fn shutdown(state: &Arc<DaemonState>) -> Result {
    let _ = state.shutdown_tx.send(());
    Ok(serde_json::json!({"shutting_down": true}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::join;

    #[tokio::test]
    async fn test_add_code_persists_to_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());

        let params = serde_json::json!({
            "name": "Spring",
            "max_activations": 10,
            "commands": ["give @p 15 3"],
        });
        let added = add_code(&state, &params).await.expect("add");
        assert_eq!(added["saved"], true);

        let err = add_code(&state, &serde_json::json!({"name": "spring"})).await.expect_err("dup");
        assert_eq!(err.message, "CODE_REJECTED");
        let err = add_code(&state, &serde_json::json!({"name": "x", "is_temporary": true}))
            .await
            .expect_err("duration");
        assert_eq!(err.message, "INVALID_PARAMS");

        let on_disk = DaemonConfig::load_from(&state.config_path).expect("load");
        assert!(on_disk.codes.iter().any(|c| c.name == "Spring" && c.expires_at.is_some()));
    }

    #[tokio::test]
    async fn test_reload_reads_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());

        let mut config = DaemonConfig::load_from(&state.config_path).expect("load");
        config.codes.truncate(1);
        config.save_to(&state.config_path).expect("save");

        let summary = reload(&state, &serde_json::json!({})).await.expect("reload");
        assert_eq!(summary["codes"], 1);
        assert!(!state.service.definitions().contains("vip1day"));
        assert_eq!(state.config.read().await.codes.len(), 1);
    }

    #[tokio::test]
    async fn test_player_admin_needs_reload_permission() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());
        join(&state, 1, &["promocode.use"]);
        join(&state, 2, &[PERMISSION_RELOAD]);

        let err = reload(&state, &serde_json::json!({"player_id": 1}))
            .await
            .expect_err("denied");
        assert_eq!(err.message, "PERMISSION_DENIED");
        let err = add_code(&state, &serde_json::json!({"player_id": 1, "name": "autumn"}))
            .await
            .expect_err("denied");
        assert_eq!(err.code, -32031);
        assert!(!state.service.definitions().contains("autumn"));

        let summary = reload(&state, &serde_json::json!({"player_id": 2})).await.expect("reload");
        assert_eq!(summary["codes"], 2);
        let added = add_code(&state, &serde_json::json!({"player_id": 2, "name": "autumn"}))
            .await
            .expect("add");
        assert_eq!(added["name"], "autumn");
    }
}
