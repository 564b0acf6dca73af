use serde::{Deserialize, Serialize};

use gatekeep_auth::PermissionCode;
use gatekeep_core::{TariffId, UserId};
use gatekeep_directory::{Page, Permission, User};
use gatekeep_infra::Credential;

use crate::app::services::ServiceError;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Member ids for attach / detach.
#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TariffRequest {
    pub tariff_id: TariffId,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Result<Page, ServiceError> {
        Ok(Page::new(self.limit, self.offset)?)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>, page: Page) -> Self {
        Self {
            items,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
    pub user: User,
    pub permissions: Vec<Permission>,
}

impl From<Credential> for LoginResponse {
    fn from(credential: Credential) -> Self {
        Self {
            token: credential.token,
            token_type: "Bearer",
            expires_at: credential.claims.exp,
            user: credential.user,
            permissions: credential.permissions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub permissions: Vec<PermissionCode>,
    pub elevated: bool,
    pub issued_at: i64,
    pub expires_at: i64,
}
