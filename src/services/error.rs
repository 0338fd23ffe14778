//! Error taxonomy for marketplace operations.

use std::collections::HashMap;
use thiserror::Error;

/// Field name to list of messages
pub type FieldErrors = HashMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("invalid credentials")]
    Authentication,

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Validation failure on a single field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }
}

/// Whether a database error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
