mod attempts;
mod handlers;
mod language_config;
mod metrics;
mod routes;

use arbiter_common::config::Config;
use arbiter_common::storage::DiskStore;
use attempts::{AttemptRegistry, ATTEMPT_RETENTION, SWEEP_INTERVAL};
use axum::Router;
use language_config::LanguageRegistry;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct AppState {
    pub redis: ConnectionManager,
    pub languages: LanguageRegistry,
    pub attempts: Arc<AttemptRegistry>,
    pub store: DiskStore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Arbiter API booting...");

    let config = Config::from_env();

    metrics::register_metrics()?;

    let languages = LanguageRegistry::load_from_file(&config.languages_path).map_err(|e| {
        error!("Failed to load language configurations: {}", e);
        anyhow::anyhow!(e)
    })?;
    info!("Accepting submissions for: {:?}", languages.enabled_languages());

    let client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = ConnectionManager::new(client).await?;
    info!("Connected to Redis: {}", config.redis_url);

    let store = DiskStore::new(
        config.storage_dir.clone(),
        &config.storage_public_url,
        &config.storage_signing_key,
    );
    info!(root = %config.storage_dir.display(), "Asset storage ready");

    let attempts = Arc::new(AttemptRegistry::new(ATTEMPT_RETENTION));
    tokio::spawn(attempts::sweep_forever(attempts.clone(), SWEEP_INTERVAL));

    let state = Arc::new(AppState {
        redis: redis_conn,
        languages,
        attempts,
        store,
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&config.api_addr).await?;
    info!("HTTP server listening on {}", config.api_addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await?;
    Ok(())
}
