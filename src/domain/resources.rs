//! Model Context Protocol resource providers
//!
//! Lists and reads `clarifai://` resources through the injected `ModelClient`.
//! URIs are forwarded as opaque strings.

use rust_mcp_sdk::schema::{
    ListResourcesResult, ReadResourceContent, ReadResourceRequestParams, ReadResourceResult,
    Resource, TextResourceContents,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::utils::with_timeout;
use crate::mcp::rpc::{app_error_to_json_rpc, serialized_result, JsonRpcResponse, INVALID_PARAMS};
use crate::{model_client::ResourceEntry, AppState};

struct ResourceTemplate {
    uri_template: &'static str,
    name: &'static str,
    description: &'static str,
}

const RESOURCE_TEMPLATES: [ResourceTemplate; 15] = [
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/inputs",
        name: "List Clarifai Inputs",
        description: "List inputs (images, videos, text) within a specific Clarifai app.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/inputs?query={search_term}",
        name: "Search Clarifai Inputs",
        description: "Search for inputs within a specific Clarifai app using a query string.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/inputs/{input_id}",
        name: "Get Clarifai Input",
        description: "Get details for a specific input.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/annotations",
        name: "List Clarifai Annotations",
        description: "List annotations within a specific Clarifai app.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/annotations?query={search_term}",
        name: "Search Clarifai Annotations",
        description: "Search for annotations within a specific Clarifai app using a query string.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/annotations/{annotation_id}",
        name: "Get Clarifai Annotation",
        description: "Get details for a specific annotation.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/inputs/{input_id}/annotations",
        name: "List Annotations for Input",
        description: "List annotations associated with a specific input.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/models",
        name: "List Clarifai Models",
        description: "List models within a specific Clarifai app or public models.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/models?query={search_term}",
        name: "Search Clarifai Models",
        description: "Search for models within a specific Clarifai app or public models.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/models/{model_id}",
        name: "Get Clarifai Model",
        description: "Get details for a specific model.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/models/{model_id}/versions",
        name: "List Model Versions",
        description: "List versions for a specific model.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/models/{model_id}/versions/{version_id}",
        name: "Get Model Version",
        description: "Get details for a specific model version.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/datasets",
        name: "List Clarifai Datasets",
        description: "List datasets within a specific Clarifai app.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/datasets/{dataset_id}",
        name: "Get Clarifai Dataset",
        description: "Get details for a specific dataset.",
    },
    ResourceTemplate {
        uri_template: "clarifai://{user_id}/{app_id}/datasets/{dataset_id}/versions",
        name: "List Dataset Versions",
        description: "List versions for a specific dataset.",
    },
];

pub fn build_resource_templates() -> Value {
    let templates = RESOURCE_TEMPLATES
        .iter()
        .map(|template| {
            json!({
                "uriTemplate": template.uri_template,
                "name": template.name,
                "description": template.description,
                "mimeType": "application/json",
            })
        })
        .collect::<Vec<_>>();

    json!({ "resourceTemplates": templates })
}

fn to_resource(entry: ResourceEntry) -> Resource {
    Resource {
        annotations: None,
        description: entry.description,
        icons: vec![],
        meta: None,
        mime_type: entry.mime_type.or_else(|| Some("application/json".to_string())),
        name: entry.name,
        size: None,
        title: None,
        uri: entry.uri,
    }
}

fn cursor_param(params: &Value) -> Option<&str> {
    params
        .get("cursor")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|cursor| !cursor.is_empty())
}

pub async fn handle_resources_list(state: &AppState, id: Value, params: Value) -> JsonRpcResponse {
    let (Some(user_id), Some(app_id)) = (&state.default_user_id, &state.default_app_id) else {
        debug!("no default user/app configured, listing no resources");
        return serialized_result(
            id,
            &ListResourcesResult {
                meta: None,
                next_cursor: None,
                resources: vec![],
            },
        );
    };

    let scope = state.call_scope(Some(user_id.clone()), Some(app_id.clone()));
    let outcome = with_timeout(
        state.timeout,
        state.model_client.list_resources(&scope, cursor_param(&params)),
    )
    .await;

    match outcome {
        Ok(page) => serialized_result(
            id,
            &ListResourcesResult {
                meta: None,
                next_cursor: page.next_cursor,
                resources: page.entries.into_iter().map(to_resource).collect(),
            },
        ),
        Err(err) => app_error_to_json_rpc(id, err),
    }
}

pub async fn handle_resources_read(state: &AppState, id: Value, params: Value) -> JsonRpcResponse {
    if params.is_null() {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params");
    }

    let resource_read: ReadResourceRequestParams = match serde_json::from_value(params) {
        Ok(value) => value,
        Err(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params"),
    };
    if resource_read.uri.trim().is_empty() {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params");
    }

    let scope = state.call_scope(state.default_user_id.clone(), state.default_app_id.clone());
    let outcome = with_timeout(
        state.timeout,
        state.model_client.read_resource(&scope, &resource_read.uri),
    )
    .await;

    match outcome {
        Ok(content) => serialized_result(
            id,
            &ReadResourceResult {
                contents: vec![ReadResourceContent::from(TextResourceContents {
                    meta: None,
                    mime_type: Some("application/json".to_string()),
                    text: content.to_string(),
                    uri: resource_read.uri,
                })],
                meta: None,
            },
        ),
        Err(err) => app_error_to_json_rpc(id, err),
    }
}
