use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppError;

/// Credentials and user/app context attached to every model API call.
#[derive(Clone, PartialEq, Eq)]
pub struct CallScope {
    pub pat: Arc<str>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

impl std::fmt::Debug for CallScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallScope")
            .field("pat", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("app_id", &self.app_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Base64 payload with any data-URI prefix already removed.
    Base64(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Concept {
    pub name: String,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourcePage {
    pub entries: Vec<ResourceEntry>,
    pub next_cursor: Option<String>,
}

/// Seam to the hosted model API. Implementations own the wire protocol.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn predict_concepts(
        &self,
        scope: &CallScope,
        model_id: &str,
        image: &ImageSource,
    ) -> Result<Vec<Concept>, AppError>;

    /// Returns the generated image as base64 text.
    async fn generate_image(
        &self,
        scope: &CallScope,
        model_id: &str,
        prompt: &str,
    ) -> Result<String, AppError>;

    async fn list_resources(
        &self,
        scope: &CallScope,
        cursor: Option<&str>,
    ) -> Result<ResourcePage, AppError>;

    /// `uri` is passed through untouched; interpreting it is up to the client.
    async fn read_resource(&self, scope: &CallScope, uri: &str) -> Result<Value, AppError>;

    /// Posts raw file bytes as a new input and returns the API response.
    async fn upload_input(&self, scope: &CallScope, bytes: Vec<u8>) -> Result<Value, AppError>;
}

/// Stand-in used when no model API client has been linked into the binary.
#[derive(Debug, Clone)]
pub struct UnavailableModelClient {
    api_addr: String,
}

impl UnavailableModelClient {
    pub fn new(api_addr: impl Into<String>) -> Self {
        Self {
            api_addr: api_addr.into(),
        }
    }

    fn unavailable(&self) -> AppError {
        AppError::not_implemented(
            "model_client_unavailable",
            format!("no model API client is available for {}", self.api_addr),
        )
    }
}

#[async_trait]
impl ModelClient for UnavailableModelClient {
    async fn predict_concepts(
        &self,
        _scope: &CallScope,
        _model_id: &str,
        _image: &ImageSource,
    ) -> Result<Vec<Concept>, AppError> {
        Err(self.unavailable())
    }

    async fn generate_image(
        &self,
        _scope: &CallScope,
        _model_id: &str,
        _prompt: &str,
    ) -> Result<String, AppError> {
        Err(self.unavailable())
    }

    async fn list_resources(
        &self,
        _scope: &CallScope,
        _cursor: Option<&str>,
    ) -> Result<ResourcePage, AppError> {
        Err(self.unavailable())
    }

    async fn read_resource(&self, _scope: &CallScope, _uri: &str) -> Result<Value, AppError> {
        Err(self.unavailable())
    }

    async fn upload_input(&self, _scope: &CallScope, _bytes: Vec<u8>) -> Result<Value, AppError> {
        Err(self.unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> CallScope {
        CallScope {
            pat: Arc::from("super-secret"),
            user_id: Some("clarifai".to_string()),
            app_id: None,
        }
    }

    #[test]
    fn debug_output_redacts_pat() {
        let rendered = format!("{:?}", scope());
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("clarifai"));
    }

    #[tokio::test]
    async fn unavailable_client_reports_not_implemented() {
        let client = UnavailableModelClient::new("api.example.com:443");
        let err = client
            .generate_image(&scope(), "stable-diffusion-xl", "a cat")
            .await
            .expect_err("no client available");

        assert!(matches!(err, AppError::NotImplemented { .. }));
        assert!(err.to_string().contains("api.example.com:443"));
    }
}
