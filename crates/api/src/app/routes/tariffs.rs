use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use gatekeep_core::TariffId;
use gatekeep_directory::{NewTariff, TariffPatch};
use gatekeep_infra::associations::TariffRoles;

use crate::app::extract::JsonBody;
use crate::app::routes::common::{
    acting, attach_members, detach_members, list_members, no_content, parse_id, respond,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_tariffs).post(create_tariff))
        .route(
            "/:id",
            get(get_tariff).patch(update_tariff).delete(delete_tariff),
        )
        .route(
            "/:id/roles",
            get(list_members::<TariffRoles>)
                .post(attach_members::<TariffRoles>)
                .delete(detach_members::<TariffRoles>),
        )
}

pub async fn create_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    JsonBody(body): JsonBody<NewTariff>,
) -> Response {
    respond(
        StatusCode::CREATED,
        services.create_tariff(acting(&principal), body).await,
    )
}

pub async fn list_tariffs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::PageQuery>,
) -> Response {
    let page = match query.page() {
        Ok(p) => p,
        Err(e) => return errors::service_error_to_response(e),
    };
    let result = services
        .list_tariffs(page)
        .await
        .map(|items| dto::Listing::new(items, page));
    respond(StatusCode::OK, result)
}

/// GET /tariffs/:id - the tariff with its bundled roles
pub async fn get_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: TariffId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.get_tariff(id).await)
}

pub async fn update_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<TariffPatch>,
) -> Response {
    let id: TariffId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.update_tariff(acting(&principal), id, body).await,
    )
}

pub async fn delete_tariff(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Response {
    let id: TariffId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    no_content(services.delete_tariff(acting(&principal), id).await)
}
