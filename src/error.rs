//! Error types for the tiered cache.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt;

/// Tiered-cache error type.
#[derive(Debug)]
pub enum Error {
    /// Configuration error — fatal at construction.
    Configuration(String),
    /// I/O or throttling error talking to the authoritative store.
    Transient(String),
    /// Wrapper encode/decode failure.
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Error::Transient(msg) => write!(f, "transient backend error: {msg}"),
            Error::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Transient(_) => StatusCode::BAD_GATEWAY,
            Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string()
        });
        (status, Json(body)).into_response()
    }
}
