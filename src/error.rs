use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Identity error: {0}")]
    IdentityError(#[from] IdentityError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::WebSocketError(WebSocketError::InvalidUpgrade(_)) => StatusCode::BAD_REQUEST,
            AppError::IdentityError(IdentityError::EmptyUsername) => StatusCode::BAD_REQUEST,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failures on the websocket path: the upgrade itself, or the transport
/// underneath an established session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebSocketError {
    #[error("Invalid upgrade request: {0}")]
    InvalidUpgrade(String),

    #[error("Receive failed: {0}")]
    ReceiveError(String),

    #[error("Message sending failed: {0}")]
    SendError(String),

    #[error("Frame exceeds the configured size limit")]
    Overflow,

    /// The peer broke framing rules, e.g. a continuation with no message started.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Storage error: {0}")]
    StorageError(String),
}
