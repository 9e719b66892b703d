//! API error types with JSON response bodies.
//!
//! Body shape is `{ "message": ..., "error": ... }` where `error` is an
//! optional structured detail object. Guard violations carry the current
//! status and billing state so clients can self-correct.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::models::enums::{BillingStatus, TestStatus};
use crate::workflow::WorkflowError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid transition")]
    InvalidTransition {
        required: String,
        current: TestStatus,
        billing: BillingStatus,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, detail.clone(), None),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone(), None),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone(), None),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, detail.clone(), None),
            ApiError::InvalidTransition {
                required,
                current,
                billing,
            } => (
                StatusCode::BAD_REQUEST,
                format!("This operation requires {required}"),
                Some(serde_json::json!({
                    "required": required,
                    "current_status": current,
                    "billing_status": billing,
                })),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            message,
            error: detail,
        };
        (status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} not found: {id}"))
            }
            WorkflowError::InvalidTransition {
                required,
                current,
                billing,
            } => ApiError::InvalidTransition {
                required,
                current,
                billing,
            },
            WorkflowError::Forbidden(detail) => ApiError::Forbidden(detail),
            WorkflowError::Validation(detail) => ApiError::BadRequest(detail),
            WorkflowError::Conflict(detail) => ApiError::Conflict(detail),
            WorkflowError::Database(e) => ApiError::Internal(e.to_string()),
            WorkflowError::Report(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
