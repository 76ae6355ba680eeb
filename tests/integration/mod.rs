// tests/integration/mod.rs

// ============================================
// Re-export commonly used types
// ============================================
pub use serde_json::json;
pub use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use context_compressor::{
    api::routes::{create_router, AppState},
    config::Config,
    models::Message,
    orchestrator::{compression_engine::CompressionEngine, CompressionOrchestrator},
    services::text_generator::{GenerationError, TextGenerator},
    services::HeuristicTokenEstimator,
    storage::{init_db, SeaOrmCompressionCache, SeaOrmMetricsStore},
};
use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use tokio::sync::RwLock;

// ============================================
// Public modules (test files)
// ============================================
pub mod api;
pub mod concurrency;

// ============================================
// Shared Test Helpers
// ============================================

/// Generator that answers every prompt with the same text.
pub struct StaticGenerator {
    reply: String,
    healthy: bool,
    fails: bool,
}

impl StaticGenerator {
    pub fn healthy(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            healthy: true,
            fails: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            reply: String::new(),
            healthy: false,
            fails: true,
        }
    }

    /// Passes health checks but fails every generation.
    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            healthy: true,
            fails: true,
        }
    }
}

#[async_trait]
impl TextGenerator for StaticGenerator {
    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, GenerationError> {
        if self.fails {
            Err(GenerationError::Unavailable("offline".to_string()))
        } else {
            Ok(self.reply.clone())
        }
    }

    async fn is_healthy(&self) -> bool {
        self.healthy
    }
}

/// A migrated SQLite database in a fresh temporary directory. Keep the
/// `TempDir` alive for as long as the connection is used.
pub async fn test_db() -> (TempDir, DatabaseConnection) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let db = init_db(&url).await.unwrap();
    (dir, db)
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.compression.enabled = true;
    config.compression.strategies.intelligent_summary.enabled = true;
    config
}

pub fn build_orchestrator(
    db: DatabaseConnection,
    config: &Config,
    generator: Arc<dyn TextGenerator>,
) -> Arc<CompressionOrchestrator> {
    let engine = CompressionEngine::from_config(
        config,
        Arc::new(HeuristicTokenEstimator::new()),
        generator,
        Arc::new(SeaOrmCompressionCache::new(db.clone())),
        Arc::new(SeaOrmMetricsStore::new(db)),
    );
    Arc::new(CompressionOrchestrator::new(Arc::new(engine)))
}

pub async fn create_test_app() -> (TempDir, Router) {
    let (dir, app, _) = create_test_app_with_orchestrator().await;
    (dir, app)
}

/// Also hands back the orchestrator so tests can flush background writes.
pub async fn create_test_app_with_orchestrator() -> (TempDir, Router, Arc<CompressionOrchestrator>) {
    let (dir, db) = test_db().await;
    let config = create_test_config();
    let orchestrator = build_orchestrator(
        db,
        &config,
        Arc::new(StaticGenerator::healthy("the team agreed to ship on friday")),
    );

    let state = AppState {
        config: Arc::new(RwLock::new(config)),
        orchestrator: orchestrator.clone(),
    };

    (dir, create_router(state), orchestrator)
}

/// Alternating user/assistant filler that trips no importance detector.
pub fn plain_conversation(len: usize) -> Vec<Message> {
    (0..len)
        .map(|i| {
            let content = format!("plain words here {:03}", i);
            if i % 2 == 0 {
                Message::user(content)
            } else {
                Message::assistant(content)
            }
        })
        .collect()
}
