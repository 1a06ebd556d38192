use crate::api::models::predictions::ValidationError;
use crate::scoring::ScoringError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Credential or API key missing, invalid or expired. The reason is only ever logged.
    #[error("Not authenticated: {reason}")]
    Unauthenticated { reason: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Request body failed feature/batch validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The model could not produce a prediction
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Error::Unauthenticated { reason: reason.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Scoring(_) | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            // Never reveal which of the two auth checks failed
            Error::Unauthenticated { .. } => "Unauthorized".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::Validation(err) => err.to_string(),
            Error::Scoring(_) => "Prediction failed".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Scoring(_) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::Validation(_) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
