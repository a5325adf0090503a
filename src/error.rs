use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::ai::AiError;
use crate::auth::AuthError;
use crate::payments::stripe::StripeError;
use crate::store::StoreError;
use crate::supabase::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidPrompt(String),

    #[error("{message}")]
    QuotaExceeded { message: String, details: Value },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_)
            | ApiError::InvalidPrompt(_)
            | ApiError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            ApiError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Payment(_) => StatusCode::BAD_GATEWAY,
            ApiError::GenerationFailed(_)
            | ApiError::ProcessingFailed(_)
            | ApiError::Database(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Auth(_) => "AUTH_ERROR",
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::InvalidPrompt(_) => "INVALID_PROMPT",
            ApiError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict { code, .. } => *code,
            ApiError::GenerationFailed(_) => "GENERATION_FAILED",
            ApiError::ProcessingFailed(_) => "PROCESSING_FAILED",
            ApiError::InvalidSignature(_) => "INVALID_SIGNATURE",
            ApiError::Payment(_) => "PAYMENT_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{} ({}): {}", self.code(), status, self);
        } else {
            log::warn!("{} ({}): {}", self.code(), status, self);
        }

        let details = match &self {
            ApiError::QuotaExceeded { details, .. } => Some(details),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Database(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e.to_string())
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        ApiError::GenerationFailed(e.to_string())
    }
}

impl From<StripeError> for ApiError {
    fn from(e: StripeError) -> Self {
        ApiError::Payment(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::ProcessingFailed(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
