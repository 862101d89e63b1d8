use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use palaver_engine::ChatError;

/// Newtype so engine errors can carry an HTTP status.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ChatError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            ChatError::NotAuthorized(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            ChatError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ChatError::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
