//! Success envelope and the JSON body extractor.

use axum::{
    extract::FromRequest,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::error::ApiError;

/// `{"success": true, "message": "...", "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    #[serde(skip)]
    status: StatusCode,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// A success envelope with a message and no data
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// `Json<T>` whose rejections render as 422 validation errors
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "data": [1, 2]}));

        let body = serde_json::to_value(ApiResponse::message("Logged out")).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "message": "Logged out"}));
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created("Created", 1).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
