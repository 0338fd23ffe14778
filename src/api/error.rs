//! Unified API error handling.
//!
//! Every failure leaves the API as
//! `{"success": false, "message": "...", "code": "...", "errors": {...}}`
//! with the status code matching its `ErrorCode`.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, rejection::JsonRejection, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::services::ServiceError;
use crate::AppState;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Unavailable,
    InvalidState,
    PayloadTooLarge,
    TooManyRequests,
    ValidationError,

    // Server errors (5xx)
    InternalError,
    DatabaseError,
    StorageError,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            // Business-rule rejections share 400
            ErrorCode::Conflict => StatusCode::BAD_REQUEST,
            ErrorCode::Unavailable => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidState => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::TooManyRequests => "too_many_requests",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::StorageError => "storage_error",
        }
    }
}

/// The error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error code
    pub code: String,
    /// Field-level validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    errors: Option<HashMap<String, Vec<String>>>,
    /// Underlying cause of a server error, only rendered when enabled
    detail: Option<String>,
    /// Seconds until a rate-limited caller may retry
    retry_after: Option<u64>,
}

impl ApiError {
    /// Create a new API error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            errors: None,
            detail: None,
            retry_after: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Add validation errors as details
    pub fn with_validation_errors(mut self, errors: HashMap<String, Vec<String>>) -> Self {
        self.errors = Some(errors);
        self
    }

    fn with_detail(mut self, detail: impl std::fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    // -------------------------------------------------------------------------
    // Convenience constructors for common error types
    // -------------------------------------------------------------------------

    /// Bad request error (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Unauthorized error (401) - authentication required
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Forbidden error (403) - authenticated but not allowed
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Validation error (422) with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        Self::new(ErrorCode::ValidationError, message).with_validation_errors(errors)
    }

    /// Single field validation error
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    /// Internal server error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Too many requests error (429)
    /// Too many requests (429) with a `Retry-After` hint
    pub fn rate_limited(retry_after: u64) -> Self {
        let mut err = Self::new(
            ErrorCode::TooManyRequests,
            format!("Too many requests. Try again in {} seconds.", retry_after),
        );
        err.retry_after = Some(retry_after);
        err
    }
}

/// The detailed envelope of a server error, carried as a response extension
/// until `expose_error_details` decides whether it replaces the body
#[derive(Debug, Clone)]
struct DetailedError(ErrorResponse);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            success: false,
            message: self.message,
            code: self.code.as_str().to_string(),
            errors: self.errors,
        };

        let detailed = self.detail.map(|detail| {
            DetailedError(ErrorResponse {
                message: format!("{}: {}", response.message, detail),
                ..response.clone()
            })
        });

        let mut res = (self.status, Json(response)).into_response();
        if let Some(detailed) = detailed {
            res.extensions_mut().insert(detailed);
        }
        if let Some(seconds) = self.retry_after {
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        res
    }
}

/// Middleware that swaps in the detailed server error body when
/// `server.expose_error_details` is set
pub async fn expose_error_details(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if !state.config.server.expose_error_details {
        return response;
    }

    match response.extensions_mut().remove::<DetailedError>() {
        Some(DetailedError(body)) => (response.status(), Json(body)).into_response(),
        None => response,
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

// -------------------------------------------------------------------------
// Conversion implementations for common error types
// -------------------------------------------------------------------------

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(errors) => ApiError::validation(errors),
            ServiceError::Authentication => ApiError::unauthorized("Invalid credentials"),
            ServiceError::Authorization(msg) => ApiError::forbidden(msg),
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Conflict(msg) => ApiError::new(ErrorCode::Conflict, msg),
            ServiceError::Unavailable(msg) => ApiError::new(ErrorCode::Unavailable, msg),
            ServiceError::InvalidState(msg) => ApiError::new(ErrorCode::InvalidState, msg),
            ServiceError::Database(e) => ApiError::from(e),
            ServiceError::Storage(e) => {
                tracing::error!(error = %e, "Image storage error");
                ApiError::new(ErrorCode::StorageError, "Failed to store image").with_detail(e)
            }
            ServiceError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::internal("An unexpected error occurred").with_detail(msg)
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);

        match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            _ => ApiError::new(ErrorCode::DatabaseError, "A database error occurred")
                .with_detail(err),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::new(ErrorCode::PayloadTooLarge, "The request body is too large")
        } else {
            ApiError::bad_request(err.body_text())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::validation_field("body", "Expected a JSON request body")
            }
            other => ApiError::validation_field("body", other.body_text()),
        }
    }
}

// -------------------------------------------------------------------------
// Builder for validation errors (integrates with existing validation module)
// -------------------------------------------------------------------------

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    /// Create a new validation error builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the error of a `validate_*` check, if any
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    /// Unwrap a `parse_*` result, recording its error and falling back to the default
    pub fn parsed<T: Default>(&mut self, field: &str, result: Result<T, String>) -> T {
        result.unwrap_or_else(|message| {
            self.add(field, message);
            T::default()
        })
    }

    /// Merge errors collected elsewhere
    pub fn extend(&mut self, errors: HashMap<String, Vec<String>>) -> &mut Self {
        for (field, messages) in errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        self
    }

    /// Check if there are any errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Build the ApiError if there are any errors
    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(ApiError::validation(self.errors))
        }
    }

    /// Return Ok(()) if no errors, or Err(ApiError) if there are errors
    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
