pub mod llm_bridge_client;
pub mod text_generator;
pub mod token_estimator;

// Re-export for convenience
pub use llm_bridge_client::LlmBridgeClient;
pub use text_generator::{GenerationError, TextGenerator};
pub use token_estimator::{HeuristicTokenEstimator, TokenEstimator};
