use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use gatekeep_auth::Argon2PasswordHasher;
use gatekeep_infra::{AppConfig, Directory, InMemoryDirectory, PostgresDirectory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatekeep_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.using_dev_secret {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }
    tracing::info!(?config, "configuration loaded");

    let directory: Arc<dyn Directory> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            let store = PostgresDirectory::new(pool);
            if config.init_schema {
                store.init_schema().await.context("failed to create schema")?;
            }
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory directory");
            Arc::new(InMemoryDirectory::new())
        }
    };

    let services = Arc::new(gatekeep_api::app::services::AppServices::new(
        directory,
        Arc::new(Argon2PasswordHasher::new()),
        &config,
    ));

    if let Some(admin) = &config.admin {
        services
            .bootstrap_admin(admin)
            .await
            .context("failed to bootstrap administrator")?;
    }

    let app = gatekeep_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
