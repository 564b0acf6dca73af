use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use gatekeep_auth::{JwtValidator, PermissionCode};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    /// Permission code that marks a credential as elevated.
    pub admin_permission: PermissionCode,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Ok(token) = extract_bearer(req.headers()) else {
        return unauthorized("missing or malformed bearer token");
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "bearer token rejected");
            return unauthorized("invalid or expired credential");
        }
    };

    req.extensions_mut()
        .insert(PrincipalContext::new(claims, &state.admin_permission));

    next.run(req).await
}

fn unauthorized(message: &'static str) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "authentication_failed", message)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn missing_or_malformed_headers_are_unauthorized() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_bearer(&headers("Basic abc")), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_bearer(&headers("Bearer   ")), Err(StatusCode::UNAUTHORIZED));
    }
}
