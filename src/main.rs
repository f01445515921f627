use fivehub::app::{create_app, AppContext};
use fivehub::config;
use fivehub::config::rate_limit::RateLimitConfig;
use fivehub::config::session::SessionConfig;
use fivehub::migration::Migrator;
use fivehub::services::bootstrap_admin::{ensure_bootstrap_admin, BootstrapAdminConfig};
use fivehub::services::cache::CacheService;
use fivehub::services::discord::DiscordClient;
use fivehub::services::upload::UploadConfig;
use fivehub::services::webhook::WebhookNotifier;
use sea_orm_migration::MigratorTrait;
use std::env;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    // Validate configuration before doing anything else
    let database_config = config::database::DatabaseConfig::from_env()?;
    let session_config = SessionConfig::from_env()?;
    let discord_config = config::discord::DiscordConfig::from_env()?;
    let upload_config = UploadConfig::from_env();
    let bootstrap = BootstrapAdminConfig::from_env();
    let rate_limit = RateLimitConfig::from_env();
    prepare_storage(&upload_config)?;

    tracing::info!("Starting FiveHub API v{}...", env!("CARGO_PKG_VERSION"));

    let db = config::database::get_database(&database_config).await?;
    tracing::info!("Database connected successfully");

    Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    ensure_bootstrap_admin(&db, &bootstrap).await?;

    // Redis is optional: without it every read goes to the database
    let cache = match config::redis::get_redis().await {
        Ok(Some(conn)) => {
            tracing::info!("Redis connected successfully");
            CacheService::new(conn)
        }
        Ok(None) => {
            tracing::info!("REDIS_URL not set, running without cache");
            CacheService::disabled()
        }
        Err(e) => {
            tracing::warn!("Redis unavailable, running without cache: {}", e);
            CacheService::disabled()
        }
    };

    let app = create_app(AppContext {
        db,
        cache,
        upload: upload_config,
        discord: DiscordClient::new(discord_config)?,
        session: session_config,
        webhook: WebhookNotifier::new()?,
        bootstrap,
        rate_limit,
    });

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// `LOG_FORMAT=json` switches to one JSON object per line for log shippers.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fivehub=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn prepare_storage(config: &UploadConfig) -> anyhow::Result<()> {
    for dir in [&config.upload_dir, &config.archive_dir] {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create storage directory '{}': {}", dir, e))?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}
