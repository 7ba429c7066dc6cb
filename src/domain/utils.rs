//! Domain-specific shared validations and formatting utilities

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    errors::AppError,
    model_client::{Concept, ImageSource},
};

pub const DEFAULT_INFER_MODEL_ID: &str = "general-image-recognition";
pub const DEFAULT_GENERATE_MODEL_ID: &str = "stable-diffusion-xl";
pub const DEFAULT_GENERATE_USER_ID: &str = "stability-ai";
pub const DEFAULT_GENERATE_APP_ID: &str = "stable-diffusion-2";
pub const DEFAULT_PATH_MODEL_ID: &str = "general-image-detection";
pub const DEFAULT_PATH_USER_ID: &str = "clarifai";
pub const DEFAULT_PATH_APP_ID: &str = "main";
/// Generated images above this many base64 bytes are written to disk.
pub const INLINE_IMAGE_LIMIT_BYTES: usize = 10 * 1024;

static IDENTIFIER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").ok());

pub fn normalize_identifier(
    code: &'static str,
    field: &str,
    value: Option<String>,
) -> Result<Option<String>, AppError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let normalized = value.trim();
    if normalized.is_empty() {
        return Ok(None);
    }

    let pattern = IDENTIFIER_PATTERN
        .as_ref()
        .ok_or_else(|| AppError::internal("identifier pattern failed to compile"))?;
    if !pattern.is_match(normalized) {
        return Err(AppError::bad_request(
            code,
            format!("{field} must contain only alphanumeric characters, dashes, underscores, and dots"),
        ));
    }

    Ok(Some(normalized.to_string()))
}

pub fn normalize_text_prompt(prompt: Option<String>) -> Result<String, AppError> {
    prompt
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("invalid_text_prompt", "text_prompt is required"))
}

/// Trims whitespace and strips a leading `data:<mime>;base64,` prefix.
pub fn clean_base64_data(data: &str) -> &str {
    let trimmed = data.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload.trim();
        }
    }
    trimmed
}

pub fn resolve_image_source(
    image_bytes: Option<String>,
    image_url: Option<String>,
) -> Result<ImageSource, AppError> {
    let image_bytes = image_bytes
        .as_deref()
        .map(clean_base64_data)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let image_url = image_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    match (image_bytes, image_url) {
        (Some(bytes), None) => Ok(ImageSource::Base64(bytes)),
        (None, Some(url)) => Ok(ImageSource::Url(url)),
        (Some(_), Some(_)) => Err(AppError::bad_request(
            "ambiguous_image_input",
            "provide either image_bytes or image_url, not both",
        )),
        (None, None) => Err(AppError::bad_request(
            "missing_image_input",
            "one of image_bytes or image_url is required",
        )),
    }
}

/// Highest score first; ties keep name order.
pub fn sort_concepts(concepts: &mut [Concept]) {
    concepts.sort_by(|left, right| {
        right
            .value
            .total_cmp(&left.value)
            .then_with(|| left.name.cmp(&right.name))
    });
}

pub fn format_concepts(concepts: &[Concept]) -> String {
    if concepts.is_empty() {
        return "Inference successful, but no concepts met the threshold or the model does not output concepts.".to_string();
    }

    let listed = concepts
        .iter()
        .map(|concept| format!("{}: {:.2}", concept.name, concept.value))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Inference Concepts: {listed}")
}

pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout(timeout.as_secs())),
    }
}

pub fn generated_image_filename() -> String {
    let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("generated_image_{timestamp}_{}.png", &suffix[..8])
}

/// Decodes the base64 image and writes it under `output_dir`, creating the
/// directory when missing.
pub async fn save_image(output_dir: &Path, image_base64: &str) -> Result<PathBuf, AppError> {
    let bytes = STANDARD
        .decode(clean_base64_data(image_base64))
        .map_err(|err| AppError::upstream(format!("generated image is not valid base64: {err}"), None))?;

    tokio::fs::create_dir_all(output_dir).await.map_err(|err| {
        AppError::internal(format!(
            "failed to create output directory {}: {err}",
            output_dir.display()
        ))
    })?;

    let path = output_dir.join(generated_image_filename());
    debug!(path = %path.display(), size_bytes = bytes.len(), "writing generated image");
    tokio::fs::write(&path, &bytes).await.map_err(|err| {
        AppError::internal(format!("failed to write {}: {err}", path.display()))
    })?;

    info!(path = %path.display(), "saved generated image");
    Ok(path)
}

pub fn normalize_filepath(filepath: &str) -> Result<PathBuf, AppError> {
    let trimmed = filepath.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(
            "invalid_filepath",
            "filepath must not be empty",
        ));
    }
    Ok(PathBuf::from(trimmed))
}

/// Read failures are reported as upstream errors carrying the tool and path.
pub async fn read_local_file(tool: &str, path: &Path) -> Result<Vec<u8>, AppError> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        AppError::upstream(
            format!("Failed to read file: {err}"),
            Some(json!({
                "tool": tool,
                "filepath": path.display().to_string(),
            })),
        )
    })?;

    debug!(path = %path.display(), size_bytes = bytes.len(), "read local file");
    Ok(bytes)
}
