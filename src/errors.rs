use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: String,
    },
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("not found: {message}")]
    NotFound {
        code: &'static str,
        message: String,
    },
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        details: Option<Value>,
    },
    #[error("upstream call timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
    #[error("not implemented: {message}")]
    NotImplemented {
        code: &'static str,
        message: String,
    },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::Upstream {
            message: message.into(),
            details,
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn not_implemented(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotImplemented {
            code,
            message: message.into(),
        }
    }
}
