use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::inventory::UpdateError;
use crate::maintenance::MaintenanceError;
use crate::store::RecordError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `ACTOR_MISSING`,
    /// `NOT_FOUND`, `CONFLICT`, `AUDIT_APPEND_FAILED`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "stock must not be negative")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    ActorMissing,
    NotFound(String),
    Conflict(String),
    /// The stock change is committed but not yet on the inventory log.
    AuditAppendFailed(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::ActorMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "ACTOR_MISSING",
                    message: "X-Actor-Id header is required".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::AuditAppendFailed(detail) => {
                tracing::error!("Inventory log append failed: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        code: "AUDIT_APPEND_FAILED",
                        message: "Stock change recorded but not yet confirmed in the inventory log; it will be replayed".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(id) => AppError::NotFound(format!("Product {id} not found")),
            RecordError::Conflict { id, .. } => {
                AppError::Conflict(format!("Product {id} was modified concurrently"))
            }
            RecordError::LogAppend(detail) => AppError::AuditAppendFailed(detail),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<UpdateError> for AppError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::Validation(msg) => AppError::Validation(msg),
            UpdateError::NotFound(id) => AppError::NotFound(format!("Product {id} not found")),
            UpdateError::Conflict(id) => {
                AppError::Conflict(format!("Product {id} was modified concurrently"))
            }
            UpdateError::AuditAppend(detail) => AppError::AuditAppendFailed(detail),
            UpdateError::Store(e) => e.into(),
        }
    }
}

impl From<MaintenanceError> for AppError {
    fn from(err: MaintenanceError) -> Self {
        AppError::Internal(err.to_string())
    }
}
