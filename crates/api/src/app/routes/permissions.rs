use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use gatekeep_core::PermissionId;
use gatekeep_directory::{NewPermission, PermissionPatch};

use crate::app::extract::JsonBody;
use crate::app::routes::common::{acting, no_content, parse_id, respond};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route(
            "/:id",
            get(get_permission)
                .patch(update_permission)
                .delete(delete_permission),
        )
}

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    JsonBody(body): JsonBody<NewPermission>,
) -> Response {
    respond(
        StatusCode::CREATED,
        services.create_permission(acting(&principal), body).await,
    )
}

pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::PageQuery>,
) -> Response {
    let page = match query.page() {
        Ok(p) => p,
        Err(e) => return errors::service_error_to_response(e),
    };
    let result = services
        .list_permissions(page)
        .await
        .map(|items| dto::Listing::new(items, page));
    respond(StatusCode::OK, result)
}

pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: PermissionId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.get_permission(id).await)
}

pub async fn update_permission(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<PermissionPatch>,
) -> Response {
    let id: PermissionId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.update_permission(acting(&principal), id, body).await,
    )
}

pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Response {
    let id: PermissionId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    no_content(services.delete_permission(acting(&principal), id).await)
}
