use axum::{routing::get, Router};

pub mod auth;
pub mod common;
pub mod organizations;
pub mod permissions;
pub mod roles;
pub mod system;
pub mod tariffs;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/users", users::router())
        .nest("/organizations", organizations::router())
        .nest("/permissions", permissions::router())
        .nest("/roles", roles::router())
        .nest("/tariffs", tariffs::router())
}
