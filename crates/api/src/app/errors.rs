use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use crate::app::services::ServiceError;

/// Map a service error onto the HTTP error table.
///
/// Internal causes go to the log only; the body carries a generic message.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::InvalidArgument(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg)
        }
        ServiceError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::AuthenticationFailed => json_error(
            StatusCode::UNAUTHORIZED,
            "authentication_failed",
            "invalid email or password",
        ),
        ServiceError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        ServiceError::Internal(cause) => {
            error!(cause = %cause, "request failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "internal server error",
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
