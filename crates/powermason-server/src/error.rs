//! HTTP error mapping. Every failure leaves as `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use powermason_core::PowermasonError;

#[derive(Debug)]
pub enum AppError {
    /// Missing, malformed or expired bearer token.
    Unauthenticated(String),
    Core(PowermasonError),
}

impl From<PowermasonError> for AppError {
    fn from(e: PowermasonError) -> Self {
        Self::Core(e)
    }
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Core(PowermasonError::Validation(msg.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Core(PowermasonError::Internal(e)) => {
                // Internal details stay in the log.
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            Self::Core(e) => {
                let status = StatusCode::from_u16(e.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_status() {
        let resp = AppError::from(PowermasonError::Conflict("dup".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let resp = AppError::Unauthenticated("no token".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_errors_are_generic_500s() {
        let resp =
            AppError::from(PowermasonError::Internal(anyhow::anyhow!("pool closed"))).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
