//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! JSON-RPC method calls to the appropriate command handlers. After
//! `subscribe_events` the connection also carries `event` notifications.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::commands::events::Subscription;
use crate::events::Event;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC success response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC notification (no id).
#[derive(Debug, Serialize)]
pub struct RpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: &'a Event,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    // Promo errors

    /// Player not registered with `player_joined` (-32020).
    pub fn player_offline(player_id: u64) -> Self {
        Self {
            code: -32020,
            message: "PLAYER_OFFLINE".to_string(),
            data: Some(serde_json::json!({"player_id": player_id})),
        }
    }

    /// Unknown promo code (-32030).
    pub fn code_not_found(code: &str) -> Self {
        Self {
            code: -32030,
            message: "CODE_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"code": code})),
        }
    }

    /// Caller lacks a permission (-32031).
    pub fn permission_denied(permission: &str) -> Self {
        Self {
            code: -32031,
            message: "PERMISSION_DENIED".to_string(),
            data: Some(serde_json::json!({"permission": permission})),
        }
    }

    /// Catalog refused a new code (-32032).
    pub fn code_rejected(detail: &str) -> Self {
        Self {
            code: -32032,
            message: "CODE_REJECTED".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, writer) = stream.into_split();
    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut forwarder: Option<JoinHandle<()>> = None;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) if request.jsonrpc != "2.0" => {
                RpcResponse::error(request.id, RpcError::invalid_request())
            }
            Ok(request) if request.method == "subscribe_events" => {
                match commands::events::subscribe_events(&state, &request.params) {
                    Ok((result, subscription)) => {
                        if let Some(previous) = forwarder.take() {
                            previous.abort();
                        }
                        forwarder = Some(tokio::spawn(forward_events(subscription, writer.clone())));
                        RpcResponse::success(request.id, result)
                    }
                    Err(err) => RpcResponse::error(request.id, err),
                }
            }
            Ok(request) if request.method == "unsubscribe_events" => {
                let active = match forwarder.take() {
                    Some(previous) => {
                        previous.abort();
                        true
                    }
                    None => false,
                };
                RpcResponse::success(request.id, serde_json::json!({"unsubscribed": active}))
            }
            Ok(request) => dispatch_request(state.clone(), request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        write_line(&writer, &response).await?;
    }

    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    Ok(())
}

async fn write_line<T: Serialize>(writer: &SharedWriter, message: &T) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    let mut writer = writer.lock().await;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Push matching events to the subscriber until the connection drops.
async fn forward_events(subscription: Subscription, writer: SharedWriter) {
    let Subscription {
        id,
        filter,
        mut receiver,
    } = subscription;
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if !filter.matches(&event) {
                    continue;
                }
                let notification = RpcNotification {
                    jsonrpc: "2.0",
                    method: "event",
                    params: &event,
                };
                if let Err(e) = write_line(&writer, &notification).await {
                    debug!(subscription = %id, "event stream closed: {}", e);
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(subscription = %id, skipped, "subscriber lagging, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Player sessions
        "player_joined" => commands::players::player_joined(&state, &request.params).await,
        "player_left" => commands::players::player_left(&state, &request.params).await,

        // Redemption
        "activate_code" => commands::codes::activate_code(&state, &request.params).await,
        "list_codes" => commands::codes::list_codes(&state, &request.params).await,
        "code_info" => commands::codes::code_info(&state, &request.params).await,

        // Statistics
        "get_stats" => commands::stats::get_stats(&state, &request.params).await,
        "get_temporary_items" => {
            commands::stats::get_temporary_items(&state, &request.params).await
        }

        // Administration
        "reload" => commands::admin::reload(&state, &request.params).await,
        "add_code" => commands::admin::add_code(&state, &request.params).await,
        "shutdown" => commands::admin::shutdown(&state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_codes() {
        let err = RpcError::player_offline(7);
        assert_eq!(err.code, -32020);
        assert_eq!(err.message, "PLAYER_OFFLINE");

        let err = RpcError::code_not_found("welcome");
        assert_eq!(err.code, -32030);

        let err = RpcError::method_not_found("unknown");
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn test_rpc_response_success() {
        let resp = RpcResponse::success(serde_json::json!(1), serde_json::json!({"codes": 2}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_rpc_response_error() {
        let resp = RpcResponse::error(serde_json::json!(1), RpcError::internal_error("test"));
        assert!(resp.result.is_none());
        assert!(resp.error.is_some());
    }

    #[test]
    fn test_notification_shape() {
        let event = Event::now("CommandIssued", serde_json::json!({"command": "say hi"}));
        let value = serde_json::to_value(RpcNotification {
            jsonrpc: "2.0",
            method: "event",
            params: &event,
        })
        .expect("serialize");
        assert_eq!(value["method"], "event");
        assert_eq!(value["params"]["payload"]["command"], "say hi");
        assert!(value.get("id").is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::commands::test_state(dir.path());
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(5),
            method: "mint_tokens".to_string(),
            params: serde_json::Value::Null,
        };
        let response = dispatch_request(state, request).await;
        assert_eq!(response.error.map(|e| e.code), Some(-32601));
    }
}
