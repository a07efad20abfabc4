use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use ava_core::{AvaError, BackupError, MemoryError};

/// Error type for admin handlers.
///
/// Every variant renders as `{"detail": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A domain error from `ava_core`.
    #[error(transparent)]
    Core(#[from] AvaError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        Self::Core(AvaError::Backup(err))
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        Self::Core(AvaError::Memory(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(core) => match core {
                AvaError::Memory(MemoryError::NotFound { .. })
                | AvaError::Backup(BackupError::NotFound { .. }) => StatusCode::NOT_FOUND,
                AvaError::InvalidInput(_)
                | AvaError::Memory(MemoryError::InvalidId(_))
                | AvaError::Memory(MemoryError::InvalidPatch(_)) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %detail, "admin request failed");
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error = %detail,
                "admin request rejected"
            );
        }
        (status, axum::Json(json!({ "detail": detail }))).into_response()
    }
}
