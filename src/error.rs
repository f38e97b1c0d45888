use axum::{Json,
    http::StatusCode,
    response::IntoResponse
};
use std::collections::BTreeMap;

use serde_json::json;
use thiserror::Error;

use crate::{archive::ArchiveError, label::LabelError, paths::PathError, storage::StorageError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Several submitted names collide; maps each name to its reason.
    #[error("Conflicting names: {0:?}")]
    NameConflicts(BTreeMap<String, String>),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Multipart error: {0}")]
    Multipart(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Label generation error: {0}")]
    Generation(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AppError::NotFound(format!("{} not found on disk", path)),
            StorageError::AlreadyExists(path) => {
                AppError::Conflict(format!("{} already exists on disk", path))
            }
            other => AppError::Io(other.to_string()),
        }
    }
}

impl From<LabelError> for AppError {
    fn from(err: LabelError) -> Self {
        match err {
            LabelError::Io(e) => AppError::Io(e.to_string()),
            other => AppError::Generation(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<PathError> for AppError {
    fn from(err: PathError) -> Self {
        match &err {
            PathError::Io(e) => AppError::Io(e.to_string()),
            PathError::InvalidSegment(_) => AppError::Validation(err.to_string()),
            PathError::InvalidStoredPath(_) => AppError::Internal(err.to_string()),
            PathError::OutsideRoot(abs) => {
                tracing::error!("Path {} is outside the application root", abs);
                AppError::Internal("Path is outside the application root".into())
            }
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::NameConflicts(_) => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Io(_)
            | AppError::Generation(_)
            | AppError::Internal(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let error_message = match self {
            AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg)
            | AppError::BadRequest(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::UnsupportedMediaType(msg)
            | AppError::Multipart(msg) => msg,
            AppError::NameConflicts(errors) => {
                let body = Json(json!({
                    "error": "Some names are already in use",
                    "errors": errors,
                }));
                return (status, body).into_response();
            }
            AppError::Io(msg) => {
                tracing::error!("I/O Error: {}", msg);
                msg
            }
            AppError::Generation(msg) => {
                tracing::error!("Label Generation Error: {}", msg);
                msg
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal Error: {}", msg);
                msg
            }
            AppError::Database(err) => {
                tracing::error!("Database Error: {:}", err);
                "Database error".to_string()
            }
        };

        // Return standardized JSON error response
        let body = Json(json!({"error": error_message}));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Io("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::Generation("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_payload_on_disk_is_not_found() {
        let err: AppError = StorageError::NotFound("uploads/a/b".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn corrupt_stored_paths_are_server_errors() {
        let err: AppError = PathError::InvalidStoredPath("../etc/passwd".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: AppError = PathError::OutsideRoot("/srv/secret/a.png".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("/srv/secret"));
        let err: AppError = PathError::InvalidSegment("..".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
