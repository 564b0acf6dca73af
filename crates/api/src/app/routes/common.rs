//! Helpers shared by the resource routers, including the generic handlers
//! behind every `/{owner}/:id/{members}` association route.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use gatekeep_auth::ActingPrincipal;
use gatekeep_core::DomainError;
use gatekeep_infra::Association;

use crate::app::extract::JsonBody;
use crate::app::services::{AppServices, ServiceError};
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

/// Serialize a successful result with `status`, or map the error.
pub fn respond<T: Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub fn no_content(result: Result<(), ServiceError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Parse a path id; malformed or non-positive ids are invalid arguments.
pub fn parse_id<I>(raw: &str) -> Result<I, Response>
where
    I: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|e: DomainError| errors::service_error_to_response(e.into()))
}

/// Acting principal of the request, if the auth middleware established one.
pub fn acting(ctx: &Option<Extension<PrincipalContext>>) -> Option<&ActingPrincipal> {
    ctx.as_ref().map(|Extension(ctx)| ctx.principal())
}

pub async fn list_members<A>(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response
where
    A: Association,
    A::Owner: FromStr<Err = DomainError>,
    A::Member: Serialize,
{
    let owner: A::Owner = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.list_members::<A>(owner).await)
}

pub async fn attach_members<A>(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::IdsRequest>,
) -> Response
where
    A: Association,
    A::Owner: FromStr<Err = DomainError>,
    A::Member: Serialize,
{
    let owner: A::Owner = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.attach::<A>(acting(&principal), owner, &body.ids).await,
    )
}

pub async fn detach_members<A>(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::IdsRequest>,
) -> Response
where
    A: Association,
    A::Owner: FromStr<Err = DomainError>,
    A::Member: Serialize,
{
    let owner: A::Owner = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.detach::<A>(acting(&principal), owner, &body.ids).await,
    )
}
