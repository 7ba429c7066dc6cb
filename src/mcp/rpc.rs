//! JSON-RPC protocol representations and formatting utilities
//!
//! Provides the line-level request/response types carried by the stdio transport,
//! and standardized mapping of internal AppErrors to valid JSON-RPC payloads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const UPSTREAM_ERROR: i64 = -32000;
pub const UNAUTHORIZED: i64 = -32001;
pub const RESOURCE_NOT_FOUND: i64 = -32002;
pub const UPSTREAM_TIMEOUT: i64 = -32003;

/// One decoded request line. `id` is kept verbatim so it can be echoed back.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// `None` only when the member is absent; `"id": null` is `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with("notifications/")
    }

    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Result(Value),
    Error(RpcError),
}

/// Carries exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn error(id: Value, code: i64, message: &str) -> Self {
        Self::error_with_data(id, code, message, None)
    }

    pub fn error_with_data(id: Value, code: i64, message: &str, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(RpcError {
                code,
                message: message.to_string(),
                data,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }
}

/// Wraps any serializable result; a serialization failure becomes an internal error.
pub fn serialized_result<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::result(id, value),
        Err(err) => app_error_to_json_rpc(
            id,
            AppError::internal(format!("result serialization failed: {err}")),
        ),
    }
}

pub fn app_error_to_json_rpc(id: Value, err: AppError) -> JsonRpcResponse {
    match err {
        AppError::BadRequest { code, message } => JsonRpcResponse::error_with_data(
            id,
            INVALID_PARAMS,
            "Invalid params",
            Some(error_data(code, &message, json!({}))),
        ),
        AppError::Unauthorized { code, message } => JsonRpcResponse::error_with_data(
            id,
            UNAUTHORIZED,
            "Unauthorized",
            Some(error_data(code, message, json!({}))),
        ),
        AppError::NotFound { code, message } => JsonRpcResponse::error_with_data(
            id,
            RESOURCE_NOT_FOUND,
            "Resource not found",
            Some(error_data(code, &message, json!({}))),
        ),
        AppError::Upstream { message, details } => JsonRpcResponse::error_with_data(
            id,
            UPSTREAM_ERROR,
            &message,
            details,
        ),
        AppError::Timeout { seconds } => JsonRpcResponse::error_with_data(
            id,
            UPSTREAM_TIMEOUT,
            "Upstream call timed out",
            Some(error_data(
                "upstream_timeout",
                "model API did not answer in time",
                json!({ "timeout_secs": seconds }),
            )),
        ),
        AppError::Internal { code, message } => {
            tracing::error!(code = code, error = %message, "request failed with internal error");
            JsonRpcResponse::error(id, INTERNAL_ERROR, "Internal error")
        }
        AppError::NotImplemented { code, message } => JsonRpcResponse::error_with_data(
            id,
            INTERNAL_ERROR,
            "Internal error",
            Some(error_data(code, &message, json!({}))),
        ),
    }
}

fn error_data(code: &str, message: &str, details: Value) -> Value {
    json!({
        "code": code,
        "message": message,
        "details": details
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request_with_numeric_id() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#)
                .expect("valid request");

        assert_eq!(request.id, Some(json!(1)));
        assert_eq!(request.method, "ping");
        assert_eq!(request.params, json!({}));
        assert!(!request.is_notification());
    }

    #[test]
    fn decodes_request_without_id_or_params() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .expect("valid notification");

        assert!(request.id.is_none());
        assert_eq!(request.params, Value::Null);
        assert!(request.is_notification());
        assert_eq!(request.response_id(), Value::Null);
    }

    #[test]
    fn null_id_is_kept_apart_from_missing_id() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
                .expect("valid request");

        assert_eq!(request.id, Some(Value::Null));
        assert!(!request.is_notification());
        assert_eq!(
            serde_json::to_string(&request).expect("serializable"),
            r#"{"jsonrpc":"2.0","id":null,"method":"ping","params":null}"#
        );
    }

    #[test]
    fn rejects_request_without_method() {
        assert!(serde_json::from_str::<JsonRpcRequest>(r#"{"jsonrpc":"2.0","id":"a"}"#).is_err());
        assert!(serde_json::from_str::<JsonRpcRequest>("not json").is_err());
    }

    #[test]
    fn result_response_encodes_in_wire_order() {
        let response = JsonRpcResponse::result(json!(1), json!("pong"));
        let encoded = serde_json::to_string(&response).expect("serializable");
        assert_eq!(encoded, r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#);
    }

    #[test]
    fn error_response_omits_missing_data() {
        let response = JsonRpcResponse::error(json!("abc"), METHOD_NOT_FOUND, "Method not found");
        let encoded = serde_json::to_string(&response).expect("serializable");
        assert_eq!(
            encoded,
            r#"{"jsonrpc":"2.0","id":"abc","error":{"code":-32601,"message":"Method not found"}}"#
        );
        assert!(response.is_error());
    }

    #[test]
    fn response_decodes_back_from_wire() {
        let response: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32000,"message":"boom","data":{"x":1}}}"#,
        )
        .expect("valid response");

        assert_eq!(response.id, Value::Null);
        match response.payload {
            ResponsePayload::Error(error) => {
                assert_eq!(error.code, UPSTREAM_ERROR);
                assert_eq!(error.data, Some(json!({"x": 1})));
            }
            ResponsePayload::Result(_) => panic!("expected error payload"),
        }
    }

    #[test]
    fn bad_request_maps_to_invalid_params_with_data() {
        let response = app_error_to_json_rpc(
            json!(7),
            AppError::bad_request("invalid_text_prompt", "text_prompt is required"),
        );
        let value = serde_json::to_value(&response).expect("serializable");

        assert_eq!(value["error"]["code"], INVALID_PARAMS);
        assert_eq!(value["error"]["data"]["code"], "invalid_text_prompt");
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn timeout_maps_to_upstream_timeout() {
        let response = app_error_to_json_rpc(json!(1), AppError::timeout(30));
        let value = serde_json::to_value(&response).expect("serializable");

        assert_eq!(value["error"]["code"], UPSTREAM_TIMEOUT);
        assert_eq!(value["error"]["data"]["details"]["timeout_secs"], 30);
    }

    #[test]
    fn internal_error_hides_message() {
        let response = app_error_to_json_rpc(json!(1), AppError::internal("secret path"));
        let value = serde_json::to_value(&response).expect("serializable");

        assert_eq!(value["error"]["code"], INTERNAL_ERROR);
        assert!(value["error"].get("data").is_none());
    }
}
