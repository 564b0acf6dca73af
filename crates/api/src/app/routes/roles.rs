use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use gatekeep_core::RoleId;
use gatekeep_directory::{NewRole, RolePatch};
use gatekeep_infra::associations::RolePermissions;

use crate::app::extract::JsonBody;
use crate::app::routes::common::{
    acting, attach_members, detach_members, list_members, no_content, parse_id, respond,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id", get(get_role).patch(update_role).delete(delete_role))
        .route(
            "/:id/permissions",
            get(list_members::<RolePermissions>)
                .post(attach_members::<RolePermissions>)
                .delete(detach_members::<RolePermissions>),
        )
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    JsonBody(body): JsonBody<NewRole>,
) -> Response {
    respond(
        StatusCode::CREATED,
        services.create_role(acting(&principal), body).await,
    )
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::PageQuery>,
) -> Response {
    let page = match query.page() {
        Ok(p) => p,
        Err(e) => return errors::service_error_to_response(e),
    };
    let result = services
        .list_roles(page)
        .await
        .map(|items| dto::Listing::new(items, page));
    respond(StatusCode::OK, result)
}

/// GET /roles/:id - the role with the permissions it owns
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: RoleId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.get_role(id).await)
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RolePatch>,
) -> Response {
    let id: RoleId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.update_role(acting(&principal), id, body).await,
    )
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Response {
    let id: RoleId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    no_content(services.delete_role(acting(&principal), id).await)
}
