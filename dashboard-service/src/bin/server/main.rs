use std::sync::Arc;

use auth::PasswordHasher;
use auth::SystemClock;
use auth::TokenCodec;
use dashboard_service::config::Config;
use dashboard_service::domain::account::service::AccountService;
use dashboard_service::domain::auth::service::AuthService;
use dashboard_service::inbound::http::router::create_router;
use dashboard_service::outbound::storage;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = "dashboard-service",
        version = env!("CARGO_PKG_VERSION"),
        "Service starting"
    );

    let config = Config::load()?;

    tracing::info!(
        http_port = config.server.http_port,
        storage_backend = %config.storage.backend,
        token_ttl_seconds = config.jwt.ttl_seconds,
        "Configuration loaded"
    );

    let storage = storage::connect(&config.storage).await?;

    let token_codec = Arc::new(TokenCodec::new(
        config.jwt.secret.as_bytes(),
        Arc::new(SystemClock),
    )?);
    let auth_service = Arc::new(AuthService::new(
        Arc::clone(&storage),
        Arc::new(PasswordHasher::new()),
        token_codec,
        config.jwt.ttl_seconds,
    ));
    let account_service = Arc::new(AccountService::new(Arc::clone(&storage)));

    let http_address = format!("0.0.0.0:{}", config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_address).await?;
    tracing::info!(
        address = %http_address,
        port = config.server.http_port,
        protocol = "http",
        "Http server listening"
    );

    let http_application = create_router(auth_service, account_service, Arc::new(config.oauth));

    if let Err(e) = axum::serve(http_listener, http_application).await {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }

    tracing::info!("Server exited successfully");

    Ok(())
}
