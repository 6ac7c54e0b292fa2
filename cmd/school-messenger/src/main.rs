//! # school-messenger
//!
//! The entry point that assembles the application based on compile-time features.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{build_router, AppState};
use configs::{LogFormat, LogSettings, Settings, StorageBackend};
use secrecy::ExposeSecret;
use services::Services;
use storage_adapters::MemoryStore;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-postgres")]
use storage_adapters::PgStore;

#[cfg(feature = "auth-jwt")]
use auth_adapters::JwtVerifier;

#[cfg(not(feature = "auth-jwt"))]
compile_error!("school-messenger needs a session verifier; enable the auth-jwt feature");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);

    // 1. Storage
    let services = build_services(&settings).await?;

    // 2. Session verification
    let secret = settings
        .auth
        .jwt_secret
        .as_ref()
        .context("auth.jwt_secret is required")?;
    let verifier = Arc::new(JwtVerifier::new(
        secret.expose_secret().as_bytes(),
        settings.auth.issuer.as_deref(),
    ));

    // 3. HTTP
    let state = AppState::new(services, verifier);
    let app = build_router(state, &settings.cors.allowed_origins);

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "school-messenger listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("shut down cleanly");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

async fn build_services(settings: &Settings) -> anyhow::Result<Services> {
    match settings.storage.backend {
        #[cfg(feature = "db-postgres")]
        StorageBackend::Postgres => {
            let url = settings
                .database
                .url
                .as_ref()
                .context("database.url is required")?;
            let store = PgStore::connect(url.expose_secret(), settings.database.max_connections)
                .await?;
            store.migrate().await?;
            Ok(Services::from_store(Arc::new(store)))
        }
        #[cfg(not(feature = "db-postgres"))]
        StorageBackend::Postgres => anyhow::bail!("built without the db-postgres feature"),
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; data is lost on restart");
            Ok(Services::from_store(Arc::new(MemoryStore::new())))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
