//! # AppError
//!
//! Centralized error handling for the messaging core.
//! Every failure a service can surface maps to one of these variants.

use thiserror::Error;

/// The primary error type for all service operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Identity fields missing from the request context.
    #[error("missing context: {0}")]
    MissingContext(String),

    /// Required input absent or malformed (e.g., message without content)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Resource not found (e.g., User, Message)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Credentials present but rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure (e.g., DB down, broken row)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        AppError::NotFound(entity.to_string(), id.to_string())
    }
}

// Ports report failures through anyhow; anything coming out of a store is internal.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for messaging logic.
pub type Result<T> = std::result::Result<T, AppError>;
