use axum::{
    extract::rejection::JsonRejection,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

// A single failed input check, reported back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("database error: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Internal error text carried on the response so that development builds
/// of the router can surface it; see [`expose_error_detail`].
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::Validation(errors) => (
                status,
                Json(json!({ "message": "Validation failed", "errors": errors })),
            )
                .into_response(),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                let mut response = (
                    status,
                    Json(json!({
                        "message": "Internal server error",
                        "error": "Something went wrong",
                    })),
                )
                    .into_response();
                response.extensions_mut().insert(ErrorDetail(detail));
                response
            }
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message) => {
                (status, Json(json!({ "message": message }))).into_response()
            }
        }
    }
}

// Only layered onto the router when APP_ENV=development
pub async fn expose_error_detail<B>(request: Request<B>, next: Next<B>) -> Response {
    let mut response = next.run(request).await;
    match response.extensions_mut().remove::<ErrorDetail>() {
        Some(ErrorDetail(detail)) => (
            response.status(),
            Json(json!({ "message": "Internal server error", "error": detail })),
        )
            .into_response(),
        None => response,
    }
}
