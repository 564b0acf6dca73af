//! Process configuration, read once from the environment at start-up.

use std::net::SocketAddr;

use thiserror::Error;

use gatekeep_auth::{PermissionCode, DEFAULT_MIN_PASSWORD_LEN};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
/// Upper bound on `GATEKEEP_TOKEN_TTL_HOURS` (ten years), so `iat + ttl` stays
/// a representable timestamp.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;
pub const MAX_PASSWORD_MIN_LEN: i64 = 1024;
pub const DEFAULT_ADMIN_PERMISSION: &str = "admin";

/// Development-only signing secret used when `JWT_SECRET` is unset.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// Credentials for the administrator account ensured at start-up.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// `true` when `jwt_secret` is [`DEV_JWT_SECRET`].
    pub using_dev_secret: bool,
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub init_schema: bool,
    pub token_ttl: chrono::Duration,
    pub password_min_len: usize,
    pub admin_permission: PermissionCode,
    pub admin: Option<AdminBootstrap>,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("using_dev_secret", &self.using_dev_secret)
            .field("database", &self.database_url.is_some())
            .field("init_schema", &self.init_schema)
            .field("token_ttl", &self.token_ttl)
            .field("password_min_len", &self.password_min_len)
            .field("admin_permission", &self.admin_permission)
            .field("admin", &self.admin)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            using_dev_secret: true,
            database_url: None,
            init_schema: false,
            token_ttl: chrono::Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            password_min_len: DEFAULT_MIN_PASSWORD_LEN,
            admin_permission: PermissionCode::new(DEFAULT_ADMIN_PERMISSION),
            admin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("GATEKEEP_BIND_ADDR") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "GATEKEEP_BIND_ADDR",
                expected: "a socket address",
                value: v.clone(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let (jwt_secret, using_dev_secret) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (DEV_JWT_SECRET.to_string(), true),
        };

        let ttl_hours = parse_positive(
            &get,
            "GATEKEEP_TOKEN_TTL_HOURS",
            DEFAULT_TOKEN_TTL_HOURS,
            MAX_TOKEN_TTL_HOURS,
        )?;
        let token_ttl = chrono::Duration::try_hours(ttl_hours).ok_or(ConfigError::Invalid {
            var: "GATEKEEP_TOKEN_TTL_HOURS",
            expected: "a representable number of hours",
            value: ttl_hours.to_string(),
        })?;
        let password_min_len = parse_positive(
            &get,
            "GATEKEEP_PASSWORD_MIN_LEN",
            DEFAULT_MIN_PASSWORD_LEN as i64,
            MAX_PASSWORD_MIN_LEN,
        )? as usize;

        let admin_permission = match get("GATEKEEP_ADMIN_PERMISSION") {
            Some(v) => PermissionCode::parse(v.clone()).map_err(|_| ConfigError::Invalid {
                var: "GATEKEEP_ADMIN_PERMISSION",
                expected: "a permission code",
                value: v.clone(),
            })?,
            None => PermissionCode::new(DEFAULT_ADMIN_PERMISSION),
        };

        let init_schema = match get("GATEKEEP_INIT_SCHEMA") {
            Some(v) => parse_flag("GATEKEEP_INIT_SCHEMA", &v)?,
            None => false,
        };

        let admin = match (get("GATEKEEP_ADMIN_EMAIL"), get("GATEKEEP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "GATEKEEP_ADMIN_EMAIL",
                    "GATEKEEP_ADMIN_PASSWORD",
                ));
            }
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            using_dev_secret,
            database_url: get("DATABASE_URL"),
            init_schema,
            token_ttl,
            password_min_len,
            admin_permission,
            admin,
        })
    }
}

/// Integer in `1..=max`, or `default` when unset.
fn parse_positive<G>(get: &G, var: &'static str, default: i64, max: i64) -> Result<i64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(v) => match v.trim().parse::<i64>() {
            Ok(n) if n > 0 && n <= max => Ok(n),
            _ => Err(ConfigError::Invalid {
                var,
                expected: "a positive integer within range",
                value: v,
            }),
        },
    }
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a boolean",
            value: value.to_string(),
        }),
    }
}
