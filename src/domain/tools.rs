//! Interactive tools exposed via Model Context Protocol
//!
//! Provides `infer_image`, `clarifai_image_by_path`, `generate_image` and
//! `upload_file` by delegating to the injected `ModelClient`.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rust_mcp_sdk::{
    macros,
    schema::{
        CallToolRequestParams, CallToolResult, ContentBlock, ImageContent, TextContent, Tool,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::domain::utils::{
    clean_base64_data, format_concepts, normalize_filepath, normalize_identifier,
    normalize_text_prompt, read_local_file, resolve_image_source, save_image, sort_concepts,
    with_timeout, DEFAULT_GENERATE_APP_ID, DEFAULT_GENERATE_MODEL_ID, DEFAULT_GENERATE_USER_ID,
    DEFAULT_INFER_MODEL_ID, DEFAULT_PATH_APP_ID, DEFAULT_PATH_MODEL_ID, DEFAULT_PATH_USER_ID,
    INLINE_IMAGE_LIMIT_BYTES,
};
use crate::mcp::rpc::{
    app_error_to_json_rpc, serialized_result, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND,
};
use crate::{errors::AppError, model_client::ImageSource, AppState};

#[macros::mcp_tool(
    name = "infer_image",
    description = "Performs inference on an image using a specified or default Clarifai model. Provide either image_bytes or image_url."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct InferImageTool {
    /// Base64 encoded bytes of the image file.
    pub image_bytes: Option<String>,
    /// URL of the image file.
    pub image_url: Option<String>,
    /// Model ID; defaults to a general classification model.
    pub model_id: Option<String>,
    /// App ID context; defaults to the app associated with the PAT.
    pub app_id: Option<String>,
    /// User ID context; defaults to the user associated with the PAT.
    pub user_id: Option<String>,
}

#[macros::mcp_tool(
    name = "generate_image",
    description = "Generates an image from a text prompt using a specified or default Clarifai text-to-image model."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GenerateImageTool {
    /// Text prompt describing the desired image.
    pub text_prompt: String,
    /// Text-to-image model ID; defaults to a suitable model.
    pub model_id: Option<String>,
    pub app_id: Option<String>,
    pub user_id: Option<String>,
}

#[macros::mcp_tool(
    name = "clarifai_image_by_path",
    description = "Performs inference on a local image file using a specified or default Clarifai model. Defaults to 'general-image-detection' if none specified."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct InferImageByPathTool {
    /// Absolute path to the local image file.
    pub filepath: String,
    /// Model ID; defaults to 'general-image-detection'.
    pub model_id: Option<String>,
    pub app_id: Option<String>,
    pub user_id: Option<String>,
}

#[macros::mcp_tool(
    name = "upload_file",
    description = "Uploads a local file to Clarifai as an input."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct UploadFileTool {
    /// Absolute path to the local file to upload.
    pub filepath: String,
    /// App ID context; defaults to the configured app.
    pub app_id: Option<String>,
    /// User ID context; defaults to the configured user.
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateImageArgs {
    text_prompt: Option<String>,
    model_id: Option<String>,
    app_id: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferRequest {
    pub image: ImageSource,
    pub model_id: String,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub text_prompt: String,
    pub model_id: String,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathInferRequest {
    pub filepath: PathBuf,
    pub model_id: String,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub filepath: PathBuf,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![
        InferImageTool::tool(),
        InferImageByPathTool::tool(),
        GenerateImageTool::tool(),
        UploadFileTool::tool(),
    ]
}

pub fn build_infer_request(args: InferImageTool) -> Result<InferRequest, AppError> {
    let image = resolve_image_source(args.image_bytes, args.image_url)?;
    let model_id = normalize_identifier("invalid_model_id", "model_id", args.model_id)?
        .unwrap_or_else(|| DEFAULT_INFER_MODEL_ID.to_string());

    Ok(InferRequest {
        image,
        model_id,
        user_id: normalize_identifier("invalid_user_id", "user_id", args.user_id)?,
        app_id: normalize_identifier("invalid_app_id", "app_id", args.app_id)?,
    })
}

fn build_generate_request(args: GenerateImageArgs) -> Result<GenerateRequest, AppError> {
    let text_prompt = normalize_text_prompt(args.text_prompt)?;
    let model_id = normalize_identifier("invalid_model_id", "model_id", args.model_id)?;
    let user_id = normalize_identifier("invalid_user_id", "user_id", args.user_id)?;
    let app_id = normalize_identifier("invalid_app_id", "app_id", args.app_id)?;

    // The default model lives in a public app, so its owner is filled in too.
    Ok(match model_id {
        Some(model_id) => GenerateRequest {
            text_prompt,
            model_id,
            user_id,
            app_id,
        },
        None => GenerateRequest {
            text_prompt,
            model_id: DEFAULT_GENERATE_MODEL_ID.to_string(),
            user_id: user_id.or_else(|| Some(DEFAULT_GENERATE_USER_ID.to_string())),
            app_id: app_id.or_else(|| Some(DEFAULT_GENERATE_APP_ID.to_string())),
        },
    })
}

/// Owner defaults apply in order: the public detection model's owner when the
/// model is defaulted and no owner was given, then the configured defaults.
fn build_path_infer_request(
    state: &AppState,
    args: InferImageByPathTool,
) -> Result<PathInferRequest, AppError> {
    let filepath = normalize_filepath(&args.filepath)?;
    let model_id = normalize_identifier("invalid_model_id", "model_id", args.model_id)?;
    let mut user_id = normalize_identifier("invalid_user_id", "user_id", args.user_id)?;
    let mut app_id = normalize_identifier("invalid_app_id", "app_id", args.app_id)?;

    let model_id = match model_id {
        Some(model_id) => model_id,
        None => {
            if user_id.is_none() && app_id.is_none() {
                user_id = Some(DEFAULT_PATH_USER_ID.to_string());
                app_id = Some(DEFAULT_PATH_APP_ID.to_string());
            }
            DEFAULT_PATH_MODEL_ID.to_string()
        }
    };

    Ok(PathInferRequest {
        filepath,
        model_id,
        user_id: user_id.or_else(|| state.default_user_id.clone()),
        app_id: app_id.or_else(|| state.default_app_id.clone()),
    })
}

fn build_upload_request(state: &AppState, args: UploadFileTool) -> Result<UploadRequest, AppError> {
    Ok(UploadRequest {
        filepath: normalize_filepath(&args.filepath)?,
        user_id: normalize_identifier("invalid_user_id", "user_id", args.user_id)?
            .or_else(|| state.default_user_id.clone()),
        app_id: normalize_identifier("invalid_app_id", "app_id", args.app_id)?
            .or_else(|| state.default_app_id.clone()),
    })
}

pub async fn handle_tools_call(state: &AppState, id: Value, params: Value) -> JsonRpcResponse {
    if params.is_null() {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params");
    }

    let tool_call: CallToolRequestParams = match serde_json::from_value(params) {
        Ok(value) => value,
        Err(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params"),
    };
    let arguments = json!(tool_call.arguments.unwrap_or_default());

    match tool_call.name.as_str() {
        "infer_image" => {
            let args: InferImageTool = match serde_json::from_value(arguments) {
                Ok(value) => value,
                Err(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params"),
            };
            match build_infer_request(args) {
                Ok(request) => infer_image(state, id, request).await,
                Err(err) => app_error_to_json_rpc(id, err),
            }
        }
        "clarifai_image_by_path" => {
            let args: InferImageByPathTool = match serde_json::from_value(arguments) {
                Ok(value) => value,
                Err(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params"),
            };
            match build_path_infer_request(state, args) {
                Ok(request) => infer_image_by_path(state, id, request).await,
                Err(err) => app_error_to_json_rpc(id, err),
            }
        }
        "upload_file" => {
            let args: UploadFileTool = match serde_json::from_value(arguments) {
                Ok(value) => value,
                Err(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params"),
            };
            match build_upload_request(state, args) {
                Ok(request) => upload_file(state, id, request).await,
                Err(err) => app_error_to_json_rpc(id, err),
            }
        }
        "generate_image" => {
            let args: GenerateImageArgs = match serde_json::from_value(arguments) {
                Ok(value) => value,
                Err(_) => return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params"),
            };
            match build_generate_request(args) {
                Ok(request) => generate_image(state, id, request).await,
                Err(err) => app_error_to_json_rpc(id, err),
            }
        }
        _ => JsonRpcResponse::error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": tool_call.name,
                },
            })),
        ),
    }
}

async fn infer_image(state: &AppState, id: Value, request: InferRequest) -> JsonRpcResponse {
    let scope = state.call_scope(request.user_id.clone(), request.app_id.clone());
    info!(
        model_id = %request.model_id,
        user_id = ?request.user_id,
        app_id = ?request.app_id,
        from_url = matches!(request.image, ImageSource::Url(_)),
        "running image inference"
    );

    let outcome = with_timeout(
        state.timeout,
        state
            .model_client
            .predict_concepts(&scope, &request.model_id, &request.image),
    )
    .await;

    match outcome {
        Ok(mut concepts) => {
            sort_concepts(&mut concepts);
            info!(concepts_found = concepts.len(), "inference finished");
            tool_result(
                id,
                ContentBlock::from(TextContent::new(format_concepts(&concepts), None, None)),
                Some(Map::from_iter([
                    ("model_id".to_string(), json!(request.model_id)),
                    ("concepts".to_string(), json!(concepts)),
                ])),
            )
        }
        Err(err) => app_error_to_json_rpc(id, err),
    }
}

async fn infer_image_by_path(
    state: &AppState,
    id: Value,
    request: PathInferRequest,
) -> JsonRpcResponse {
    let bytes = match read_local_file("clarifai_image_by_path", &request.filepath).await {
        Ok(bytes) => bytes,
        Err(err) => return app_error_to_json_rpc(id, err),
    };

    let request = InferRequest {
        image: ImageSource::Base64(STANDARD.encode(bytes)),
        model_id: request.model_id,
        user_id: request.user_id,
        app_id: request.app_id,
    };
    infer_image(state, id, request).await
}

async fn upload_file(state: &AppState, id: Value, request: UploadRequest) -> JsonRpcResponse {
    let bytes = match read_local_file("upload_file", &request.filepath).await {
        Ok(bytes) => bytes,
        Err(err) => return app_error_to_json_rpc(id, err),
    };
    let size_bytes = bytes.len();
    let scope = state.call_scope(request.user_id.clone(), request.app_id.clone());
    info!(
        filepath = %request.filepath.display(),
        size_bytes,
        user_id = ?request.user_id,
        app_id = ?request.app_id,
        "uploading file as input"
    );

    let outcome = with_timeout(state.timeout, state.model_client.upload_input(&scope, bytes)).await;
    let response = match outcome {
        Ok(response) => response,
        Err(err) => return app_error_to_json_rpc(id, err),
    };

    let text = match serde_json::to_string_pretty(&response) {
        Ok(rendered) => format!("File uploaded successfully.\nAPI Response:\n{rendered}"),
        Err(err) => {
            warn!(error = %err, "failed to render upload response");
            "File uploaded successfully.".to_string()
        }
    };

    tool_result(
        id,
        ContentBlock::from(TextContent::new(text, None, None)),
        Some(Map::from_iter([
            (
                "filepath".to_string(),
                json!(request.filepath.display().to_string()),
            ),
            ("size_bytes".to_string(), json!(size_bytes)),
            ("response".to_string(), response),
        ])),
    )
}

fn tool_result(
    id: Value,
    content: ContentBlock,
    structured: Option<Map<String, Value>>,
) -> JsonRpcResponse {
    serialized_result(
        id,
        &CallToolResult {
            content: vec![content],
            is_error: None,
            meta: None,
            structured_content: structured,
        },
    )
}

async fn generate_image(state: &AppState, id: Value, request: GenerateRequest) -> JsonRpcResponse {
    let scope = state.call_scope(request.user_id.clone(), request.app_id.clone());
    info!(
        model_id = %request.model_id,
        user_id = ?request.user_id,
        app_id = ?request.app_id,
        "generating image"
    );

    let outcome = with_timeout(
        state.timeout,
        state
            .model_client
            .generate_image(&scope, &request.model_id, &request.text_prompt),
    )
    .await;

    let image_base64 = match outcome {
        Ok(image) => image,
        Err(err) => return app_error_to_json_rpc(id, err),
    };
    let image_base64 = clean_base64_data(&image_base64);
    if image_base64.is_empty() {
        return app_error_to_json_rpc(
            id,
            AppError::upstream("API response did not contain image data", None),
        );
    }

    let size_bytes = image_base64.len();
    if let Some(output_dir) = state.output_dir.as_deref() {
        if size_bytes > INLINE_IMAGE_LIMIT_BYTES {
            return match save_image(output_dir, image_base64).await {
                Ok(path) => tool_result(
                    id,
                    ContentBlock::from(TextContent::new(
                        format!("Image saved to: {}", path.display()),
                        None,
                        None,
                    )),
                    Some(Map::from_iter([
                        ("path".to_string(), json!(path.display().to_string())),
                        ("size_bytes".to_string(), json!(size_bytes)),
                    ])),
                ),
                Err(err) => app_error_to_json_rpc(id, err),
            };
        }
    }

    debug!(size_bytes, "returning generated image inline");
    tool_result(
        id,
        ContentBlock::from(ImageContent::new(
            image_base64.to_string(),
            "image/png".to_string(),
            None,
            None,
        )),
        None,
    )
}
