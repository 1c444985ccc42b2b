use crate::services::{
    admin_auth::AuthError,
    content_processor::ProcessingError,
    github_store::RemoteStoreError,
    kv_store::KvError,
    metadata_repository::RepositoryError,
    ooxml::OoxmlError,
    versioning::VersionError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{} {}", self.status, self.message);
        }

        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        let status = match &err {
            RepositoryError::EmptyId => StatusCode::BAD_REQUEST,
            RepositoryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RepositoryError::Conflict { .. } => StatusCode::CONFLICT,
            RepositoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        let status = match &err {
            ProcessingError::TooLarge { .. }
            | ProcessingError::Package(OoxmlError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ProcessingError::UnsupportedType(_)
            | ProcessingError::InvalidContent(_)
            | ProcessingError::Package(OoxmlError::Zip(_)) => StatusCode::BAD_REQUEST,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<VersionError> for AppError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::Processing(inner) => inner.into(),
            VersionError::Repository(inner) => inner.into(),
            VersionError::NotFound(_) => AppError::not_found(err.to_string()),
            VersionError::TypeMismatch { .. }
            | VersionError::InvalidArgument(_)
            | VersionError::InvalidOperation(_) => AppError::bad_request(err.to_string()),
        }
    }
}

impl From<RemoteStoreError> for AppError {
    fn from(err: RemoteStoreError) -> Self {
        let status = match &err {
            RemoteStoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            RemoteStoreError::NotFound(_) => StatusCode::NOT_FOUND,
            RemoteStoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            RemoteStoreError::Api { .. } | RemoteStoreError::Transport(_) => StatusCode::BAD_GATEWAY,
            RemoteStoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::IncorrectPassword | AuthError::NotLoggedIn => StatusCode::UNAUTHORIZED,
            AuthError::EmptyPassword => StatusCode::BAD_REQUEST,
            AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
