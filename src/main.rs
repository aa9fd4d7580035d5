use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use studybuddy::api::{self, app_state::AppState};
use studybuddy::config::loader::{ConfigLoader, default_config_path};
use studybuddy::observability::{
    AppMetrics, ObservabilityState, create_observability_router, init_tracing,
};
use studybuddy::oracle::create_oracle;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = ConfigLoader::load_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    ConfigLoader::validate(&config)?;

    let _log_guard = init_tracing(&config.logging);
    info!(path = %config_path.display(), "Configuration loaded");

    let oracle = create_oracle(&config.oracle)?;
    info!(
        backend = %config.oracle.backend,
        model = %config.oracle.model,
        "Generation backend initialized"
    );

    let metrics = Arc::new(AppMetrics::default());
    let app_state = AppState::load(&config, oracle, metrics.clone()).await?;
    info!(
        flashcards = app_state.store.len(),
        cache_entries = app_state.cache.len(),
        "Stores loaded"
    );

    let observability_state = Arc::new(ObservabilityState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        metrics,
        app_state.cache.clone(),
        app_state.store.clone(),
    ));
    let shutdown = app_state.shutdown.clone();
    let api_router = api::create_router(app_state, &config.server.cors_origins);
    let router = create_observability_router(observability_state).merge(api_router);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
