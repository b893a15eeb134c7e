//! Unified error model for the session lifecycle and the gateway.
//! One enum is shared by the identity clients, the auth context and the HTTP
//! surface, along with the mapping to HTTP status codes and JSON bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// No session, or the session is invalid/expired.
    #[error("{code}: {message}")]
    Unauthenticated { code: String, message: String },
    /// Valid session, insufficient role.
    #[error("{code}: {message}")]
    Forbidden { code: String, message: String },
    /// Network or service failure talking to the identity provider or database.
    #[error("{code}: {message}")]
    ProviderUnavailable { code: String, message: String },
    /// Bad login/registration input, duplicate email, malformed configuration.
    #[error("{code}: {message}")]
    ValidationFailure { code: String, message: String },
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::ProviderUnavailable { code, .. }
            | AppError::ValidationFailure { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::ProviderUnavailable { message, .. }
            | AppError::ValidationFailure { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn unavailable<S: Into<String>>(code: S, msg: S) -> Self { AppError::ProviderUnavailable { code: code.into(), message: msg.into() } }
    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::ValidationFailure { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::ProviderUnavailable { .. } => 503,
            AppError::ValidationFailure { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Internal { .. } => 500,
        }
    }

    pub fn is_unauthenticated(&self) -> bool { matches!(self, AppError::Unauthenticated { .. }) }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() { "provider_timeout" } else { "provider_unreachable" };
        AppError::ProviderUnavailable { code: code.into(), message: err.to_string() }
    }
}

/// Error bodies are `{"error": "<message>"}`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
