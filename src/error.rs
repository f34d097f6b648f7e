use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Pulsecheck application
#[derive(Error, Debug)]
pub enum PulseError {
    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No valid proxies found")]
    NoValidProxies,

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),

    // Probe errors
    #[error("Proxy connection failed: {0}")]
    ProxyConnectionFailed(String),

    #[error("CONNECT failed: {0}")]
    ConnectFailed(String),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Operation timed out")]
    Timeout,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Pulsecheck operations
pub type Result<T> = std::result::Result<T, PulseError>;

impl PulseError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            PulseError::InvalidRequest(_)
            | PulseError::NoValidProxies
            | PulseError::InvalidProxyAddress(_)
            | PulseError::InvalidTargetUrl(_)
            | PulseError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            PulseError::ProxyConnectionFailed(_)
            | PulseError::ConnectFailed(_)
            | PulseError::Tls(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            PulseError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            PulseError::Io(_) | PulseError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for PulseError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for PulseError {
    fn from(err: url::ParseError) -> Self {
        PulseError::InvalidTargetUrl(err.to_string())
    }
}
