use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use raffle_core::Error;
use thiserror::Error;

/// HTTP-facing wrapper around the service error.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::GiveawayEnded => StatusCode::CONFLICT,
            Error::BotDetected => StatusCode::FORBIDDEN,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::ConfigError(_)
            | Error::IoError(_)
            | Error::JsonError(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            Error::Validation(fields) => serde_json::json!({
                "error": "validation failed",
                "fields": fields,
            }),
            e if status.is_server_error() => {
                tracing::error!("Request failed: {}", e);
                serde_json::json!({ "error": "internal error" })
            }
            e => serde_json::json!({ "error": e.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
