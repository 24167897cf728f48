use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::password::HashError;

/// ErrorBody
///
/// The single JSON error shape returned by every failing endpoint: `{"message": "..."}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

/// RepoError
///
/// Failures surfaced by the persistence layer. Constraint violations are split
/// out so handlers can answer 409 instead of a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A unique constraint rejected the write (e.g. a taken email).
    #[error("conflict: {0}")]
    Conflict(String),
    /// A foreign-key constraint rejected the write: the row is still referenced,
    /// or references a row that no longer exists.
    #[error("reference violation: {0}")]
    Referenced(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepoError {
    /// Classifies a raw sqlx error, promoting unique and foreign-key violations.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepoError::Conflict(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return RepoError::Referenced(db_err.message().to_string());
            }
        }
        RepoError::Database(err)
    }
}

/// ApiError
///
/// Error type returned by handlers. Converts into a `{"message": ...}` response
/// with the carried status.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(detail) => {
                tracing::debug!("repository conflict: {}", detail);
                ApiError::conflict("Resource already exists")
            }
            RepoError::Referenced(detail) => {
                tracing::debug!("repository reference violation: {}", detail);
                ApiError::conflict("Request conflicts with related records")
            }
            RepoError::Database(e) => {
                // Details stay in the logs; clients get the generic body.
                tracing::error!("database error: {:?}", e);
                ApiError::internal()
            }
        }
    }
}

impl From<HashError> for ApiError {
    fn from(err: HashError) -> Self {
        tracing::error!("{}", err);
        ApiError::internal()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}
