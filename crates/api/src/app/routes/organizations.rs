use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use gatekeep_core::OrganizationId;
use gatekeep_directory::{NewOrganization, OrganizationPatch};
use gatekeep_infra::associations::{OrganizationPermissions, OrganizationRoles};

use crate::app::extract::JsonBody;
use crate::app::routes::common::{
    acting, attach_members, detach_members, list_members, no_content, parse_id, respond,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route(
            "/:id",
            get(get_organization)
                .patch(update_organization)
                .delete(delete_organization),
        )
        .route("/:id/effective-permissions", get(effective_permissions))
        .route(
            "/:id/roles",
            get(list_members::<OrganizationRoles>)
                .post(attach_members::<OrganizationRoles>)
                .delete(detach_members::<OrganizationRoles>),
        )
        .route(
            "/:id/permissions",
            get(list_members::<OrganizationPermissions>)
                .post(attach_members::<OrganizationPermissions>)
                .delete(detach_members::<OrganizationPermissions>),
        )
        .route(
            "/:id/tariff",
            get(get_tariff).put(set_tariff).delete(clear_tariff),
        )
}

pub async fn create_organization(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    JsonBody(body): JsonBody<NewOrganization>,
) -> Response {
    respond(
        StatusCode::CREATED,
        services.create_organization(acting(&principal), body).await,
    )
}

pub async fn list_organizations(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::PageQuery>,
) -> Response {
    let page = match query.page() {
        Ok(p) => p,
        Err(e) => return errors::service_error_to_response(e),
    };
    let result = services
        .list_organizations(page)
        .await
        .map(|items| dto::Listing::new(items, page));
    respond(StatusCode::OK, result)
}

pub async fn get_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrganizationId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.get_organization(id).await)
}

pub async fn update_organization(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<OrganizationPatch>,
) -> Response {
    let id: OrganizationId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services
            .update_organization(acting(&principal), id, body)
            .await,
    )
}

pub async fn delete_organization(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrganizationId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    no_content(services.delete_organization(acting(&principal), id).await)
}

pub async fn effective_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrganizationId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.resolve_organization_permissions(id).await,
    )
}

pub async fn get_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrganizationId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.organization_tariff(id).await)
}

pub async fn set_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::TariffRequest>,
) -> Response {
    let id: OrganizationId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services
            .set_organization_tariff(acting(&principal), id, body.tariff_id)
            .await,
    )
}

pub async fn clear_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Response {
    let id: OrganizationId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    no_content(
        services
            .clear_organization_tariff(acting(&principal), id)
            .await,
    )
}
