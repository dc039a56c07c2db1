use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::document::DocumentError;
use crate::export::ExportError;
use crate::persistence::StorageError;
use crate::upstream::UpstreamError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage unavailable")]
    StorageUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Export failed: {0}")]
    Export(String),

    /// The upstream API refused the request with a client error.
    #[error("Upstream rejected request ({status}): {message}")]
    UpstreamRejected { status: StatusCode, message: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<DocumentError> for AppError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::LastPage => AppError::UnprocessableEntity(e.to_string()),
            DocumentError::PageOutOfRange { .. } => AppError::NotFound(e.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unavailable => AppError::StorageUnavailable,
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<ExportError> for AppError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::AlreadyRunning(_) => AppError::Conflict(e.to_string()),
            other => AppError::Export(other.to_string()),
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Unauthorized | UpstreamError::NotSignedIn => {
                AppError::Unauthorized(e.to_string())
            }
            UpstreamError::InvalidUpload(msg) => AppError::Validation(msg),
            UpstreamError::Api { status, message } => match StatusCode::from_u16(status) {
                Ok(status) if status == StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
                Ok(status) if status.is_client_error() => {
                    AppError::UpstreamRejected { status, message }
                }
                _ => AppError::Upstream(message),
            },
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::StorageUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORAGE_UNAVAILABLE",
                "Local storage is not available; changes are kept in memory only".to_string(),
            ),
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Saving the document failed".to_string(),
                )
            }
            AppError::Export(msg) => {
                tracing::error!("Export error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_FAILED", msg.clone())
            }
            AppError::UpstreamRejected { status, message } => {
                (*status, "UPSTREAM_REJECTED", message.clone())
            }
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportKind;

    fn status_of(e: impl Into<AppError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn test_domain_errors_map_to_statuses() {
        assert_eq!(status_of(DocumentError::LastPage), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_of(DocumentError::PageOutOfRange { index: 4, len: 2 }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(StorageError::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(ExportError::AlreadyRunning(ExportKind::Pdf)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ExportError::Docx("zip".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_errors_map_to_statuses() {
        assert_eq!(status_of(UpstreamError::NotSignedIn), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(UpstreamError::InvalidUpload("big".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(UpstreamError::Api { status: 400, message: "Email already registered".to_string() }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(UpstreamError::Api { status: 401, message: "bad password".to_string() }),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(UpstreamError::Api { status: 500, message: "down".to_string() }),
            StatusCode::BAD_GATEWAY
        );
    }
}
