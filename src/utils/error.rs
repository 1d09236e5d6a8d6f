use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::services::redeemer::ScanError;
use crate::services::{IssueError, RedeemError, ValidationErrors};
use crate::store::BackendError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(ValidationErrors),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The station's camera or decoder failed. Reported inline.
    #[error("Scanner error: {0}")]
    CapabilityError(ScanError),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::CapabilityError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::CapabilityError(_) => "CAPABILITY_ERROR",
            AppError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(errors) => {
                warn!(fields = errors.fields.len(), "Rejected invalid input");
            }
            AppError::AuthError(msg) | AppError::Forbidden(msg) => {
                warn!(code = self.code(), message = %msg, "Access denied");
            }
            AppError::NotFound(msg) | AppError::Conflict(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::CapabilityError(reason) => {
                warn!(reason = ?reason, "Scanner capability failure");
            }
            AppError::Unavailable(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(msg) => AppError::NotFound(msg),
            e @ BackendError::UnknownCode(_) => AppError::NotFound(e.to_string()),
            BackendError::Conflict(msg) => AppError::Conflict(msg),
            e @ BackendError::CodeTaken => AppError::Conflict(e.to_string()),
            BackendError::PermissionDenied(msg) => AppError::Forbidden(msg),
            BackendError::Unavailable(msg) => AppError::Unavailable(msg),
            BackendError::Database(sqlx::Error::PoolTimedOut) => {
                AppError::Unavailable("The database did not respond in time".to_string())
            }
            BackendError::Database(e) => AppError::DatabaseError(e),
            BackendError::Decode(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<IssueError> for AppError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Validation(errors) => AppError::ValidationError(errors),
            e @ IssueError::CodeExhausted { .. } => AppError::InternalServerError(e.to_string()),
            IssueError::Backend(e) => e.into(),
        }
    }
}

impl From<RedeemError> for AppError {
    fn from(err: RedeemError) -> Self {
        match err {
            e @ RedeemError::UnknownCode(_) => AppError::NotFound(e.to_string()),
            RedeemError::Scan(reason) => AppError::CapabilityError(reason),
            RedeemError::Backend(e) => e.into(),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::ValidationError(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Database internals never reach the client.
        let (public_message, details) = match &self {
            AppError::ValidationError(errors) => (
                errors.to_string(),
                Some(json!({ "fields": errors.fields })),
            ),
            AppError::CapabilityError(reason) => {
                (reason.to_string(), Some(json!({ "reason": reason })))
            }
            AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unavailable(msg)
            | AppError::InternalServerError(msg) => (msg.clone(), None),
            AppError::DatabaseError(_) => ("A database error occurred".to_string(), None),
        };

        error_response(code, public_message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_errors_list_fields() {
        let err: AppError = ValidationErrors::single("email", "Email is not valid").into();
        let (status, body) = body(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["fields"][0]["field"], "email");
    }

    #[tokio::test]
    async fn test_database_details_are_hidden() {
        let (status, body) = body(AppError::DatabaseError(sqlx::Error::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "A database error occurred");
    }

    #[tokio::test]
    async fn test_backend_rejections_surface_verbatim() {
        let err: AppError = BackendError::Conflict("A booth with slug 'bp' already exists".into()).into();
        let (status, body) = body(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "A booth with slug 'bp' already exists");

        let err: AppError = BackendError::PermissionDenied("nope".into()).into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_scan_failure_is_inline_notice() {
        let err: AppError = RedeemError::Scan(ScanError::DeviceBusy).into();
        let (status, body) = body(err).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"]["reason"], "device_busy");
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err: AppError = BackendError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
