use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};

use gatekeep_directory::NewUser;

use crate::app::extract::JsonBody;
use crate::app::dto::{LoginRequest, LoginResponse};
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Response {
    let result = services
        .login(&body.email, &body.password)
        .await
        .map(LoginResponse::from);
    respond(StatusCode::OK, result)
}

/// POST /auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<NewUser>,
) -> Response {
    respond(StatusCode::CREATED, services.register_user(body).await)
}
