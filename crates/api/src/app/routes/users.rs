use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use gatekeep_core::UserId;
use gatekeep_directory::{NewUser, UserPatch};
use gatekeep_infra::associations::{UserPermissions, UserRoles};

use crate::app::extract::JsonBody;
use crate::app::routes::common::{
    acting, attach_members, detach_members, list_members, no_content, parse_id, respond,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).patch(update_user).delete(delete_user))
        .route("/:id/effective-permissions", get(effective_permissions))
        .route(
            "/:id/roles",
            get(list_members::<UserRoles>)
                .post(attach_members::<UserRoles>)
                .delete(detach_members::<UserRoles>),
        )
        .route(
            "/:id/permissions",
            get(list_members::<UserPermissions>)
                .post(attach_members::<UserPermissions>)
                .delete(detach_members::<UserPermissions>),
        )
        .route(
            "/:id/tariff",
            get(get_tariff).put(set_tariff).delete(clear_tariff),
        )
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<NewUser>,
) -> Response {
    respond(StatusCode::CREATED, services.register_user(body).await)
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::PageQuery>,
) -> Response {
    let page = match query.page() {
        Ok(p) => p,
        Err(e) => return errors::service_error_to_response(e),
    };
    let result = services
        .list_users(page)
        .await
        .map(|items| dto::Listing::new(items, page));
    respond(StatusCode::OK, result)
}

/// GET /users/:id - the user with its resolved permission set
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.get_user(id).await)
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UserPatch>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.update_user(acting(&principal), id, body).await,
    )
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    no_content(services.delete_user(acting(&principal), id).await)
}

pub async fn effective_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.resolve_user_permissions(id).await)
}

pub async fn get_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.user_tariff(id).await)
}

pub async fn set_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::TariffRequest>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services
            .set_user_tariff(acting(&principal), id, body.tariff_id)
            .await,
    )
}

pub async fn clear_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    no_content(services.clear_user_tariff(acting(&principal), id).await)
}
