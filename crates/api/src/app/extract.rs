//! Request extractors that report rejections through the JSON error envelope.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::app::errors::json_error;

/// JSON body extractor that answers 400 `invalid_argument` instead of axum's
/// plain-text 422 for malformed or incomplete bodies.
///
/// The deserializer's message is logged, not returned.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                debug!(error = %rejection.body_text(), "request body rejected");
                let message = match rejection {
                    JsonRejection::MissingJsonContentType(_) => {
                        "expected a request body with content type application/json"
                    }
                    _ => "request body is not valid JSON for this operation",
                };
                Err(json_error(StatusCode::BAD_REQUEST, "invalid_argument", message))
            }
        }
    }
}
