use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::dto::WhoAmIResponse;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Identity and permission codes of the verified credential, as issued.
pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let claims = principal.claims();
    Json(WhoAmIResponse {
        user_id: claims.user_id,
        email: claims.email.clone(),
        name: claims.name.clone(),
        permissions: claims.permissions.clone(),
        elevated: principal.principal().elevated,
        issued_at: claims.iat,
        expires_at: claims.exp,
    })
}
