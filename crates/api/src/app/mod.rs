//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the service facade over the directory
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses
//! - `extract.rs`: body extractors that reject through `errors.rs`

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.jwt(),
        admin_permission: services.admin_permission().clone(),
    };

    // Protected routes: require a verified bearer credential.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/register", post(routes::auth::register))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
