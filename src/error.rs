//! Central error taxonomy shared by every component and surfaced over HTTP.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::bundle::validator::ValidatorError;

pub type Result<T> = std::result::Result<T, AppError>;

/// The error kinds from spec §7, each mapped to a fixed HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{kind}: {message}", kind = .0, message = .1)]
    PreconditionFailed(&'static str, String),
    #[error("database unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::PreconditionFailed(kind, _) => kind,
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PreconditionFailed(_, _) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_) | AppError::StoreUnavailable(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let status = self.status();
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthenticated,
            AuthError::TokenExpired | AuthError::TokenInvalid => AppError::Unauthenticated,
            AuthError::Forbidden => AppError::Forbidden,
            AuthError::Hash(msg) | AuthError::Sign(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ValidatorError> for AppError {
    fn from(err: ValidatorError) -> Self {
        match &err {
            ValidatorError::CoreFieldModified(name) => AppError::PreconditionFailed(
                "core_field_modified",
                format!("core field(s) modified in form `{name}`"),
            ),
            ValidatorError::MissingRenderer(name) => AppError::PreconditionFailed(
                "missing_renderer",
                format!("renderer `{name}` is not builtin and not bundled"),
            ),
            ValidatorError::Structural(msg) => AppError::InvalidInput(msg.clone()),
        }
    }
}
