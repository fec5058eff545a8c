use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access forbidden")]
    Forbidden,

    #[error("Only the owner of this item can do that")]
    NotOwner,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(i64),

    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    #[error("Folder {0} cannot be moved into itself or one of its descendants")]
    CycleDetected(i64),

    #[error("Target belongs to another department")]
    CrossDepartment,

    #[error("Version {version} already exists for document {document_id}")]
    DuplicateVersion { document_id: i64, version: i32 },

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Stable classification string exposed to clients
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotOwner => "not_owner",
            AppError::NotFound(_) => "not_found",
            AppError::DocumentNotFound(_) => "document_not_found",
            AppError::InvalidParent(_) => "invalid_parent",
            AppError::CycleDetected(_) => "cycle_detected",
            AppError::CrossDepartment => "cross_department",
            AppError::DuplicateVersion { .. } => "duplicate_version",
            AppError::ConversionFailed(_) => "conversion_failed",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Internal(_) => "internal",
            AppError::Database(_) => "database",
            AppError::Io(_) => "io",
            AppError::Json(_) => "invalid_json",
            AppError::Validation(_) => "validation",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::NotOwner => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidParent(_)
            | AppError::CycleDetected(_)
            | AppError::CrossDepartment
            | AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateVersion { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ConversionFailed(_)
            | AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal Server Error".to_string(), None)
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                ("Database Error".to_string(), None)
            }
            AppError::Io(err) => {
                tracing::error!("IO error: {}", err);
                ("IO Error".to_string(), None)
            }
            AppError::ConversionFailed(msg) => {
                tracing::error!("Conversion failed: {}", msg);
                ("Document conversion failed".to_string(), None)
            }
            AppError::Json(err) => ("Invalid JSON".to_string(), Some(err.to_string())),
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg)
            | AppError::InvalidParent(msg) => (self.to_string(), Some(msg.clone())),
            AppError::PayloadTooLarge(msg) => (msg.clone(), None),
            _ => (self.to_string(), None),
        };

        let body = ErrorResponse {
            code: status.as_u16(),
            kind: self.kind(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(msg.into()))
    }
}

/// Helper to convert anyhow errors to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::convert::ConvertError> for AppError {
    fn from(err: crate::convert::ConvertError) -> Self {
        AppError::ConversionFailed(err.to_string())
    }
}

/// True when the database rejected a write because of a unique index
pub fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = AppError::NotFound("User not found".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_hierarchy_errors_are_unprocessable() {
        assert_eq!(
            AppError::CycleDetected(3).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::CrossDepartment.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(AppError::NotOwner.kind(), "not_owner");
        assert_eq!(AppError::NotOwner.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::DuplicateVersion { document_id: 1, version: 2 }.kind(),
            "duplicate_version"
        );
    }

    #[test]
    fn test_conversion_errors_map_to_conversion_failed() {
        let err: AppError = crate::convert::ConvertError::Timeout(std::time::Duration::from_secs(5)).into();
        assert!(matches!(err, AppError::ConversionFailed(ref msg) if msg.contains("timed out")));
        assert_eq!(err.kind(), "conversion_failed");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("Item not found");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
