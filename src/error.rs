//! Error handling

use axum::Json;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::UpstreamErrorKind;
use crate::inference::InferenceError;

/// Failures of the JSON API. Every variant renders as the
/// `{"success": false, "error": ...}` envelope with a 200 status.
#[derive(Debug)]
pub enum ApiError {
    /// No keyword, or only whitespace
    EmptyKeyword,
    /// The upstream could not be reached
    Transport(InferenceError),
    /// The upstream model is still loading
    ModelWarming,
    /// The upstream reported some other error
    Upstream(String),
    /// Anything else that went wrong in the pipeline
    Internal(String),
}

impl ApiError {
    /// Builds the matching variant for an upstream error payload.
    pub fn from_upstream(message: String, kind: UpstreamErrorKind) -> Self {
        match kind {
            UpstreamErrorKind::Warming => Self::ModelWarming,
            UpstreamErrorKind::Generic => Self::Upstream(message),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKeyword => write!(f, "请输入关键词"),
            Self::Transport(_) => write!(f, "网络连接失败，请检查网络设置。"),
            Self::ModelWarming => write!(f, "模型正在唤醒中，请等待 20 秒后再次点击生成..."),
            Self::Upstream(message) => write!(f, "API 报错: {message}"),
            Self::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        ApiError::Transport(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// The error envelope
#[derive(Serialize, Debug)]
struct ErrorEnvelope {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            ApiError::EmptyKeyword => info!("Rejected generate request without a keyword"),
            ApiError::Transport(err) => warn!("{}", err),
            ApiError::ModelWarming => info!("Upstream model is still loading"),
            ApiError::Upstream(message) => warn!("Upstream error: {}", message),
            ApiError::Internal(message) => tracing::error!("Generation failed: {}", message),
        }
        Json(ErrorEnvelope {
            success: false,
            error: self.to_string(),
        })
        .into_response()
    }
}

/// Errors for the page and static file routes.
#[derive(Debug)]
pub enum AppError {
    /// When you didn't do the right thing
    BadRequest,
    /// When a requested resource is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for AppError {
    fn from(err: axum::http::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::BadRequest => {
                info!("Bad request received");
                (axum::http::StatusCode::BAD_REQUEST, "Bad Request")
            }
            AppError::NotFound(path) => {
                info!("404 {path}");
                (axum::http::StatusCode::NOT_FOUND, "Not Found")
            }
            AppError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                )
            }
        };
        (status, body).into_response()
    }
}
