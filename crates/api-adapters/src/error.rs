//! HTTP mapping of `AppError`. Clients only ever see `{ "message": ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::AppError;
use serde_json::json;

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::MissingContext(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::NotFound(_, _) => StatusCode::NOT_FOUND,
        AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = match &self.0 {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                INTERNAL_MESSAGE.to_string()
            }
            AppError::MissingContext(msg)
            | AppError::ValidationError(msg)
            | AppError::Unauthorized(msg) => msg.clone(),
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
