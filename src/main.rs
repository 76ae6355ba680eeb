use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use context_compressor::{
    api::routes,
    config::Config,
    orchestrator::{compression_engine::CompressionEngine, CompressionOrchestrator},
    services::{HeuristicTokenEstimator, LlmBridgeClient},
    storage::{self, SeaOrmCompressionCache, SeaOrmMetricsStore},
};

#[derive(Parser, Debug)]
#[command(name = "context-compressor", version, about = "Conversation context compression service")]
struct Args {
    /// Configuration file (defaults to ~/.context-compressor/config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = args.port {
        config.server_port = port;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("context_compressor={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize database
    let db_conn = storage::init_db(&config.database_url).await?;
    let cache = Arc::new(SeaOrmCompressionCache::new(db_conn.clone()));
    let metrics = Arc::new(SeaOrmMetricsStore::new(db_conn));

    // Generator backend
    let generator = Arc::new(LlmBridgeClient::with_timeout(
        config.ollama_url.clone(),
        Duration::from_secs(config.generation_timeout_secs),
    ));
    match generator.health_check().await {
        Ok(true) => {
            tracing::info!("Generator backend reachable at {}", generator.base_url());
            if let Ok(models) = generator.list_models().await {
                tracing::info!("Available models: {}", models.join(", "));
            }
        }
        Ok(false) => tracing::warn!("Generator health check returned false"),
        Err(e) => tracing::warn!(
            "Generator not available: {}. Summary strategies will be skipped.",
            e
        ),
    }

    // Requests naming a model override this default
    let estimator = match &config.compression.default_model {
        Some(model) => HeuristicTokenEstimator::for_model(model.clone()),
        None => HeuristicTokenEstimator::new(),
    };
    let engine = Arc::new(CompressionEngine::from_config(
        &config,
        Arc::new(estimator),
        generator,
        cache,
        metrics,
    ));
    let orchestrator = Arc::new(CompressionOrchestrator::new(engine));

    // Periodic cache expiry and metrics retention
    let sweep = orchestrator.clone();
    let interval_secs = config.cache_cleanup_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = sweep.cleanup_cache().await {
                tracing::error!("Cache cleanup failed: {}", e);
            }
            let retention = sweep.monitor().retention_days();
            if let Err(e) = sweep.monitor().cleanup_old_metrics(retention).await {
                tracing::error!("Metrics cleanup failed: {}", e);
            }
        }
    });

    let port = config.server_port;
    let cors_enabled = config.cors_enabled;
    tracing::info!(
        "Compression {} (preferred strategy: {})",
        if config.compression.enabled { "enabled" } else { "disabled" },
        config.compression.strategy
    );

    let writer = orchestrator.clone();
    let state = routes::AppState {
        config: Arc::new(RwLock::new(config)),
        orchestrator,
    };

    let mut app: Router = routes::create_router(state).layer(TraceLayer::new_for_http());
    if cors_enabled {
        app = app.layer(CorsLayer::permissive());
    }

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    writer.flush_pending_writes().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down, flushing pending store writes");
}
