//! Proxy error handling with structured responses.

use std::error::Error as _;
use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors the proxy turns into its own HTTP responses.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Inbound body exceeded the configured cap.
    #[error("Request body too large (max {})", human_size(.limit))]
    BodyTooLarge { limit: usize },

    /// Reading the inbound body failed.
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// The configured upstream URL cannot be combined with the request path.
    #[error("Invalid upstream URL {url}: {message}")]
    InvalidUpstream { url: String, message: String },

    /// Connecting to or talking to the upstream failed.
    #[error("{0}")]
    Upstream(String),

    /// Upstream did not answer in time.
    #[error("Request timeout")]
    Timeout,

    /// HTTP client construction failed.
    #[error("Failed to build upstream client: {0}")]
    Client(String),

    /// Listener could not be bound.
    #[error("Failed to bind proxy listener: {0}")]
    Bind(#[source] io::Error),

    /// The serve loop exited with an error.
    #[error("Proxy server failed: {0}")]
    Serve(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::BodyRead(_)
            | Self::InvalidUpstream { .. }
            | Self::Client(_)
            | Self::Bind(_)
            | Self::Serve(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `error.type` reported to clients.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout_error",
            _ => "proxy_error",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProxyError::Timeout;
        }
        // reqwest's top-level message hides the cause (refused, reset, DNS).
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        ProxyError::Upstream(message)
    }
}

/// Error body: `{"error":{"type":...,"message":...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Proxy error: {}", self);
        } else {
            warn!("Proxy rejected request: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                kind: self.error_type(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn human_size(bytes: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    if *bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}
