//! The central Model Context Protocol engine
//!
//! Provides method routing for requests arriving on the stdio transport,
//! capabilities negotiation (`initialize`), and tool/resource routing.

use std::time::Instant;

use async_trait::async_trait;
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ListToolsResult, ProtocolVersion, ServerCapabilities,
    ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::{
    resources::{build_resource_templates, handle_resources_list, handle_resources_read},
    tools::{build_tools_list, handle_tools_call},
};
use crate::handler::RequestHandler;
use crate::logging::log_request_summary;
use crate::mcp::rpc::{
    serialized_result, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND,
};
use crate::AppState;

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Inline images larger than this are elided from audit logs.
const AUDIT_INLINE_LIMIT: usize = 256;

pub struct McpHandler {
    state: AppState,
}

impl McpHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl RequestHandler for McpHandler {
    async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "ignoring notification");
            return None;
        }

        let id = request.response_id();
        if request.jsonrpc != JSONRPC_VERSION || request.method.trim().is_empty() {
            return Some(JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid Request"));
        }

        Some(handle_json_rpc_request(&self.state, id, request.method, request.params).await)
    }
}

pub async fn handle_json_rpc_request(
    state: &AppState,
    id: Value,
    method: String,
    params: Value,
) -> JsonRpcResponse {
    let started_at = Instant::now();
    let audit_params = redact_audit_value(&params);

    let response = match method.as_str() {
        "initialize" => {
            if let Some(offered) = offered_protocol_version(&params) {
                if offered != SUPPORTED_PROTOCOL_VERSION {
                    info!(
                        offered = %offered,
                        supported = SUPPORTED_PROTOCOL_VERSION,
                        "client offered a different protocol version"
                    );
                }
            }

            serialized_result(
                id,
                &InitializeResult {
                    server_info: Implementation {
                        name: env!("CARGO_PKG_NAME").to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        title: None,
                        description: None,
                        icons: vec![],
                        website_url: None,
                    },
                    capabilities: ServerCapabilities {
                        tools: Some(ServerCapabilitiesTools {
                            list_changed: Some(false),
                        }),
                        resources: Some(ServerCapabilitiesResources {
                            subscribe: Some(false),
                            list_changed: Some(false),
                        }),
                        prompts: None,
                        ..Default::default()
                    },
                    protocol_version: ProtocolVersion::V2024_11_05.into(),
                    instructions: None,
                    meta: None,
                },
            )
        }
        "ping" => JsonRpcResponse::result(id, json!({})),
        "tools/list" => serialized_result(
            id,
            &ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: build_tools_list(),
            },
        ),
        "tools/call" => handle_tools_call(state, id, params).await,
        "resources/list" => handle_resources_list(state, id, params).await,
        "resources/templates/list" => JsonRpcResponse::result(id, build_resource_templates()),
        "resources/read" => handle_resources_read(state, id, params).await,
        _ => JsonRpcResponse::error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(Value::String(method.clone())),
        ),
    };

    let outcome = if response.is_error() { "failure" } else { "success" };
    info!(
        method = %method,
        params = %audit_params,
        outcome = outcome,
        "mcp action audited"
    );
    log_request_summary(&method, outcome, started_at);

    response
}

pub fn offered_protocol_version(params: &Value) -> Option<&str> {
    params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else if let Some(elided) = elide_inline_image(key, item) {
                        (key.clone(), elided)
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

fn elide_inline_image(key: &str, value: &Value) -> Option<Value> {
    let text = value.as_str()?;
    if key != "image_bytes" || text.len() <= AUDIT_INLINE_LIMIT {
        return None;
    }
    Some(Value::String(format!("[{} bytes elided]", text.len())))
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "pat" | "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
