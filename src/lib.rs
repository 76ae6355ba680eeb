//! Context Compressor - conversation context compression for chat backends

pub mod api;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::{Message, Role};
pub use crate::orchestrator::compression_engine::{
    CompressionEngine, CompressionOutcome, CompressionRequest, SkipReason, TriggerDecision, TriggerReason,
};
pub use crate::orchestrator::strategies::{CompressionError, CompressionResult, StrategyKind};
pub use crate::orchestrator::CompressionOrchestrator;
pub use crate::services::llm_bridge_client::LlmBridgeClient;
pub use crate::storage::db::init_db;
pub use crate::storage::{SeaOrmCompressionCache, SeaOrmMetricsStore};
