//! API error types with IntoResponse.
//!
//! Infrastructure failures (`transaction_start_failed`, `commit_failed`) get
//! their own error classes, disjoint from business error classes, so a
//! caller at the HTTP boundary can tell a retryable infrastructure fault
//! from a request that was simply wrong.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::{DbError, TxError};

/// API error with automatic HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
    /// Request payload failed validation (400).
    Validation { message: String },

    /// Resource not found (404).
    NotFound { resource: &'static str, id: String },

    /// Transaction could not be started (503); the whole call may be retried.
    TxStart(TxError),

    /// Commit failed after the handler succeeded (500); outcome unknown,
    /// never reported as success.
    TxCommit(TxError),

    /// Route configuration defect (500).
    RouteConfig(TxError),

    /// Database error (500, logged, detail withheld).
    Database(DbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation { message } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "validation_error", "message": message }),
            ),
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{resource} '{id}' not found")
                }),
            ),
            Self::TxStart(e) => {
                tracing::error!(error = %e, "transaction start failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error": "transaction_start_failed",
                        "message": "could not start a database transaction"
                    }),
                )
            }
            Self::TxCommit(e) => {
                tracing::error!(error = %e, "commit failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "commit_failed",
                        "message": "the transaction could not be committed"
                    }),
                )
            }
            Self::RouteConfig(e) => {
                tracing::error!(error = %e, "route transaction configuration defect");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "route_misconfigured",
                        "message": "an internal error occurred"
                    }),
                )
            }
            Self::Database(e) => {
                // Log the actual error, return a generic message.
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<TxError> for ApiError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::CommitFailed(_) => Self::TxCommit(err),
            TxError::MissingIntent(_) => Self::RouteConfig(err),
            // ContextInactive, StartFailed, Completed: the call never got a
            // usable transaction.
            _ => Self::TxStart(err),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::Tx(tx) => tx.into(),
            other => Self::Database(other),
        }
    }
}
