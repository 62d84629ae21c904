//! Bastion Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use bastion_core::{
    api::{self, AppState},
    auth::{RedisSessionStore, TokenConfig, TokenService},
    config::Config,
    db::{Database, PgPermissionSource, PgTenantDirectory},
    permission::{PermissionQuery, RedisPermissionCache},
    telemetry,
    tenant::{PredicateInjector, TenantResolver},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    let metrics = telemetry::init_telemetry(&config.observability, "bastion-server")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Bastion Server");

    let db = Database::connect(&config.database).await?;

    let sessions = Arc::new(RedisSessionStore::connect(&config.redis.url, config.redis.key_prefix.clone()).await?);
    let tokens = Arc::new(TokenService::new(TokenConfig::from(&config.security), sessions)?);

    let tenants = TenantResolver::new(Arc::new(PgTenantDirectory::new(db.pool().clone())));

    let permissions = Arc::new(PermissionQuery::new(
        Arc::new(RedisPermissionCache::connect(&config.redis.url).await?),
        Arc::new(PgPermissionSource::new(db.pool().clone(), PredicateInjector::new(&config.tenant))),
        &config.permission,
        config.tenant.enabled,
    ));
    let warm_tenant = config.tenant.enabled.then_some(config.tenant.default_tenant_id);
    match permissions.warm_up([warm_tenant]).await {
        Ok(roles) => tracing::info!(roles, "Permission cache warmed"),
        Err(e) => tracing::warn!(error = %e, "Permission cache warm-up failed; loading lazily"),
    }

    let state = AppState {
        tokens,
        permissions,
        tenants,
        metrics,
        db: Some(db),
    };
    let app = api::build_router(state, config.security.public_paths.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
