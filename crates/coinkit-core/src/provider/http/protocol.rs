use reqwest::StatusCode;

use crate::error::CoreError;

#[derive(serde::Serialize)]
pub(super) struct JsonRpcRequest<'a> {
    pub(super) jsonrpc: &'static str,
    pub(super) id: u64,
    pub(super) method: &'a str,
    pub(super) params: Vec<serde_json::Value>,
}

#[derive(serde::Deserialize)]
pub(super) struct JsonRpcResponse {
    pub(super) result: Option<serde_json::Value>,
    pub(super) error: Option<serde_json::Value>,
}

/// JSON-RPC error codes nodes use for definitive transaction rejections:
/// generic server rejection (insufficient funds, nonce too low, underpriced),
/// transaction rejected, and execution reverted.
const REJECTION_CODES: [i64; 3] = [-32000, -32003, 3];

/// Map an HTTP status to an error, or `None` for success.
///
/// Server-side failures, timeouts and throttling are transient. Any other
/// client error means the node understood the request and refused it.
pub fn classify_status(status: StatusCode, body: &str) -> Option<CoreError> {
    if status.is_success() {
        return None;
    }
    let detail = format!("HTTP {status}: {}", body.trim());
    let transient = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || !status.is_client_error();
    if transient {
        Some(CoreError::Network(detail))
    } else {
        Some(CoreError::Application(detail))
    }
}

/// Classify a JSON-RPC error object.
///
/// Only the rejection codes become application errors. Anything else,
/// including error values that do not follow the JSON-RPC shape, is treated
/// as a misbehaving provider and retried elsewhere.
pub(super) fn parse_jsonrpc_error(err: serde_json::Value) -> CoreError {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
    }

    match serde_json::from_value::<JsonRpcError>(err.clone()) {
        Ok(parsed) if REJECTION_CODES.contains(&parsed.code) => {
            CoreError::Application(format!("{} (code {})", parsed.message, parsed.code))
        }
        Ok(parsed) => CoreError::Network(format!(
            "JSON-RPC error {}: {}",
            parsed.code, parsed.message
        )),
        Err(_) => CoreError::Network(format!("non-standard JSON-RPC error: {err}")),
    }
}
