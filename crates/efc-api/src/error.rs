use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use efc_db::StoreError;

/// Every handler failure. Each variant maps to one status and a stable
/// machine-readable code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{field} is already in use")]
    Conflict { field: &'static str },

    #[error("the only chapter of a course cannot be deleted")]
    CannotDeleteSoleChapter,

    #[error("the change could not be applied; nothing was modified")]
    TransactionFailure,

    #[error("{0}")]
    Validation(String),

    #[error("upload is larger than {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } | Self::CannotDeleteSoleChapter => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TransactionFailure | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::CannotDeleteSoleChapter => "cannot_delete_sole_chapter",
            Self::TransactionFailure => "transaction_failure",
            Self::Validation(_) => "validation",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let mut body = serde_json::json!({ "error": self.code(), "message": message });
        if let Self::Conflict { field } = &self {
            body["field"] = serde_json::Value::from(*field);
        }
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict { field } => Self::Conflict { field },
            StoreError::CannotDeleteSoleChapter => Self::CannotDeleteSoleChapter,
            StoreError::InvalidPosition { .. } => Self::Validation(err.to_string()),
            StoreError::TransactionFailure(detail) => {
                error!("Chapter renumbering failed: {}", detail);
                Self::TransactionFailure
            }
            StoreError::Sqlite(_) | StoreError::Poisoned => Self::Internal(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
