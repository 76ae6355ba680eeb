pub mod compression_engine;
pub mod importance_engine;
pub mod monitor;
pub mod patterns;
pub mod quality;
pub mod strategies;

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::CompressionConfig;
use crate::models::{Message, Role};
use crate::storage::metrics_store::CompressionStats;
use crate::storage::StoreError;
use compression_engine::{
    CompressionEngine, CompressionOutcome, CompressionRequest, RecommendationReport,
};
use importance_engine::CompressionCandidate;
use monitor::CompressionMonitor;
use strategies::{CompressionError, CompressionResult, StrategyKind};

/// Approximate provider price per 1K tokens, in dollars.
const COST_PER_1K_TOKENS: f64 = 0.002;
/// Approximate response latency per prompt token, in milliseconds.
const LATENCY_PER_TOKEN_MS: i64 = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionSavingsEstimate {
    pub tokens_saved: i64,
    pub percentage_saved: f64,
    pub estimated_cost_savings: f64,
    pub response_time_improvement_ms: i64,
}

impl CompressionSavingsEstimate {
    fn from_result(result: &CompressionResult) -> Self {
        if result.original_token_count == 0 {
            return Self::default();
        }
        let tokens_saved = result.tokens_saved();
        let percentage = tokens_saved as f64 / result.original_token_count as f64 * 100.0;
        let cost = tokens_saved as f64 / 1000.0 * COST_PER_1K_TOKENS;

        Self {
            tokens_saved,
            percentage_saved: (percentage * 100.0).round() / 100.0,
            estimated_cost_savings: (cost * 10_000.0).round() / 10_000.0,
            response_time_improvement_ms: tokens_saved * LATENCY_PER_TOKEN_MS,
        }
    }
}

/// What `compress_context` did, alongside the messages it returned.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionMetadata {
    pub compression_applied: bool,
    pub reason: String,
    pub original_token_count: usize,
    pub compressed_token_count: usize,
    pub compression_ratio: f64,
    pub compression_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<StrategyKind>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<CompressionSavingsEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompressionMetadata {
    fn unchanged(reason: &str, tokens: usize, error: Option<String>) -> Self {
        Self {
            compression_applied: false,
            reason: reason.to_string(),
            original_token_count: tokens,
            compressed_token_count: tokens,
            compression_ratio: 1.0,
            compression_time_ms: 0,
            quality_score: None,
            strategy_used: None,
            cached: false,
            details: Map::new(),
            savings: None,
            error,
        }
    }

    fn applied(result: &CompressionResult) -> Self {
        let cached = result.is_cached();
        let reason = if cached {
            "cached".to_string()
        } else {
            result
                .metadata
                .get("trigger")
                .and_then(Value::as_str)
                .unwrap_or("forced")
                .to_string()
        };

        Self {
            compression_applied: true,
            reason,
            original_token_count: result.original_token_count,
            compressed_token_count: result.compressed_token_count,
            compression_ratio: result.compression_ratio,
            compression_time_ms: result.compression_time_ms,
            quality_score: Some(result.quality_score),
            strategy_used: Some(result.strategy_used),
            cached,
            details: result.metadata.clone(),
            savings: Some(CompressionSavingsEstimate::from_result(result)),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreservationPriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageImportance {
    pub message_index: usize,
    pub importance_score: f32,
    pub is_question: bool,
    pub contains_code: bool,
    pub estimated_tokens: usize,
    pub role: Role,
    pub timestamp: Option<String>,
    pub preservation_priority: PreservationPriority,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationInsights {
    pub total_messages: usize,
    pub total_tokens: usize,
    pub compression_candidate: bool,
    pub context_utilization: f64,
    pub high_importance_count: usize,
    pub medium_importance_count: usize,
    pub low_importance_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportanceReport {
    pub message_importance: Vec<MessageImportance>,
    pub conversation_insights: ConversationInsights,
    pub compression_candidates: Vec<CompressionCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub summary: String,
    pub original_message_count: usize,
    pub original_token_count: usize,
    pub summary_token_count: usize,
    pub compression_ratio: f64,
    pub quality_score: f32,
    pub compression_time_ms: u64,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompressionStatus {
    pub enabled: bool,
    pub configuration: CompressionConfig,
    pub statistics: Option<CompressionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics_error: Option<String>,
}

/// Entry point for callers that hold plain message lists.
pub struct CompressionOrchestrator {
    engine: Arc<CompressionEngine>,
    monitor: Arc<CompressionMonitor>,
}

impl CompressionOrchestrator {
    pub fn new(engine: Arc<CompressionEngine>) -> Self {
        let monitor = Arc::new(CompressionMonitor::new(
            engine.metrics().clone(),
            engine.config().monitoring.clone(),
        ));
        Self { engine, monitor }
    }

    pub fn engine(&self) -> &Arc<CompressionEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<CompressionMonitor> {
        &self.monitor
    }

    /// Waits for metrics and cache writes still running in the background.
    pub async fn flush_pending_writes(&self) {
        self.engine.flush_pending_writes().await;
    }

    /// Compressed messages when compression applied, otherwise the input unchanged.
    pub async fn compress_context(&self, request: CompressionRequest) -> (Vec<Message>, CompressionMetadata) {
        let original_tokens = self
            .engine
            .analyzer()
            .for_model(request.model_name.as_deref())
            .content_tokens(&request.messages);
        let original = request.messages.clone();

        match self.engine.compress_conversation(request).await {
            CompressionOutcome::Compressed(result) => {
                let metadata = CompressionMetadata::applied(&result);
                (result.compressed_messages, metadata)
            }
            CompressionOutcome::Skipped(reason) => (
                original,
                CompressionMetadata::unchanged(reason.as_str(), original_tokens, None),
            ),
            CompressionOutcome::Failed(error) => (
                original,
                CompressionMetadata::unchanged(
                    "compression_failed",
                    original_tokens,
                    Some(error.to_string()),
                ),
            ),
        }
    }

    pub fn analyze_importance(&self, messages: &[Message]) -> ImportanceReport {
        if messages.is_empty() {
            return ImportanceReport::default();
        }

        let analyzer = self.engine.analyzer();
        let metrics =
            analyzer.analyze_conversation(messages, self.engine.config().default_max_context_tokens);

        let message_importance: Vec<MessageImportance> = messages
            .iter()
            .enumerate()
            .map(|(i, message)| {
                let score = analyzer.message_importance(message, messages.len() - i - 1);
                let is_question = analyzer.is_question(&message.content);
                let contains_code = analyzer.contains_code(&message.content);
                let priority = if score > 0.8 {
                    PreservationPriority::Critical
                } else if score > 0.6 {
                    PreservationPriority::High
                } else if is_question || contains_code || message.role == Role::User {
                    PreservationPriority::Medium
                } else {
                    PreservationPriority::Low
                };

                MessageImportance {
                    message_index: i,
                    importance_score: score,
                    is_question,
                    contains_code,
                    estimated_tokens: analyzer.estimate_tokens(&message.content),
                    role: message.role,
                    timestamp: message.timestamp.clone(),
                    preservation_priority: priority,
                }
            })
            .collect();

        let count = |pred: fn(f32) -> bool| {
            message_importance
                .iter()
                .filter(|m| pred(m.importance_score))
                .count()
        };
        let conversation_insights = ConversationInsights {
            total_messages: messages.len(),
            total_tokens: metrics.total_tokens,
            compression_candidate: metrics.compression_candidate,
            context_utilization: metrics.context_utilization,
            high_importance_count: count(|s| s > 0.7),
            medium_importance_count: count(|s| (0.4..=0.7).contains(&s)),
            low_importance_count: count(|s| s < 0.4),
        };

        ImportanceReport {
            conversation_insights,
            compression_candidates: analyzer.identify_compression_candidates(messages),
            message_importance,
        }
    }

    /// Forces an intelligent summary over all but the preserved recent messages.
    pub async fn summarize_messages(
        &self,
        messages: Vec<Message>,
        model_name: Option<String>,
    ) -> Result<SummaryReport, CompressionError> {
        if messages.is_empty() {
            return Err(CompressionError::NoSummaryProduced(
                "no messages to summarize".to_string(),
            ));
        }

        let original_message_count = messages.len();
        let analyzer = self.engine.analyzer().for_model(model_name.as_deref());
        let mut request = CompressionRequest::new(messages)
            .forced()
            .strategy(StrategyKind::IntelligentSummary);
        request.model_name = model_name;

        let result = match self.engine.compress_conversation(request).await {
            CompressionOutcome::Compressed(result) => result,
            CompressionOutcome::Failed(error) => return Err(error),
            CompressionOutcome::Skipped(reason) => {
                return Err(CompressionError::NoSummaryProduced(reason.as_str().to_string()))
            }
        };

        let summary_message = result
            .compressed_messages
            .iter()
            .find(|m| m.is_summary)
            .ok_or_else(|| {
                CompressionError::NoSummaryProduced("result contains no summary message".to_string())
            })?;
        let degraded = summary_message.is_degraded_summary();
        let summary = summary_message
            .summary_text()
            .unwrap_or(&summary_message.content)
            .to_string();

        Ok(SummaryReport {
            summary_token_count: analyzer.estimate_tokens(&summary),
            summary,
            original_message_count,
            original_token_count: result.original_token_count,
            compression_ratio: result.compression_ratio,
            quality_score: result.quality_score,
            compression_time_ms: result.compression_time_ms,
            degraded,
        })
    }

    pub async fn recommendations(
        &self,
        messages: &[Message],
        model_name: Option<String>,
        max_context_tokens: Option<usize>,
    ) -> RecommendationReport {
        self.engine
            .get_compression_recommendations(messages, model_name, max_context_tokens)
            .await
    }

    pub async fn compression_stats(
        &self,
        conversation_id: Option<String>,
        days: i64,
    ) -> Result<CompressionStats, StoreError> {
        self.engine.metrics().compression_stats(conversation_id, days).await
    }

    /// Current configuration plus the last 30 days of statistics.
    pub async fn compression_status(&self, conversation_id: Option<String>) -> CompressionStatus {
        let config = self.engine.config();
        let (statistics, statistics_error) = match self.compression_stats(conversation_id, 30).await {
            Ok(stats) => (Some(stats), None),
            Err(e) => {
                tracing::warn!("Failed to load compression statistics: {}", e);
                (None, Some(e.to_string()))
            }
        };

        CompressionStatus {
            enabled: config.enabled,
            configuration: config.clone(),
            statistics,
            statistics_error,
        }
    }

    pub async fn cleanup_cache(&self) -> Result<u64, StoreError> {
        self.engine.cleanup_expired_cache().await
    }
}
