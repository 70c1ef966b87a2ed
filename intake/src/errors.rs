use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// File extension is not in the accepted set
    #[error("File type '{extension}' not allowed")]
    UnsupportedType { extension: String },

    /// Destination file already exists; uploads never overwrite
    #[error("File '{filename}' already exists")]
    Conflict { filename: String },

    /// Received bytes exceeded the configured cap mid-stream
    #[error("File too large (max {limit} bytes)")]
    PayloadTooLarge { limit: u64 },

    /// Invalid request data (malformed multipart, missing file field, bad filename)
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload stream failed mid-read, e.g. the client disconnected
    #[error("Failed to read upload stream")]
    Stream {
        #[source]
        source: std::io::Error,
    },

    /// Local filesystem failure while persisting the upload
    #[error("Storage I/O failure")]
    Io(#[from] std::io::Error),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UnsupportedType { .. } => StatusCode::BAD_REQUEST,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Stream { .. } => StatusCode::BAD_REQUEST,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::UnsupportedType { extension } => {
                format!("File type '{extension}' not allowed")
            }
            Error::Conflict { filename } => {
                format!("File '{filename}' already exists")
            }
            Error::PayloadTooLarge { limit } => {
                format!("File too large (max {} MB)", limit / (1024 * 1024))
            }
            Error::BadRequest { message } => message.clone(),
            Error::Stream { .. } => "Failed to read upload stream".to_string(),
            Error::Io(_) | Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Io(_) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Conflict { .. } | Error::PayloadTooLarge { .. } => {
                tracing::warn!("Rejected upload: {}", self);
            }
            Error::UnsupportedType { .. } | Error::BadRequest { .. } | Error::Stream { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({ "detail": self.user_message() });

        (status, axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
