//! Compression strategies and the closed set they are selected from.

pub mod hybrid;
pub mod intelligent_summary;
pub mod rolling_window;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::importance_engine::ImportanceAnalyzer;
use super::quality::PreservedInfo;
use crate::config::StrategiesConfig;
use crate::models::Message;
use crate::services::text_generator::{GenerationError, TextGenerator};

pub use hybrid::HybridStrategy;
pub use intelligent_summary::IntelligentSummaryStrategy;
pub use rolling_window::RollingWindowStrategy;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Generator error: {0}")]
    Generation(#[from] GenerationError),
    #[error("Generator did not answer within {0}s")]
    GenerationTimeout(u64),
    #[error("Generator returned an empty summary")]
    EmptySummary,
    #[error("Strategy {0} produced no messages")]
    EmptyOutput(StrategyKind),
    #[error("No summary produced: {0}")]
    NoSummaryProduced(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RollingWindow,
    IntelligentSummary,
    Hybrid,
}

impl StrategyKind {
    /// Fallback order used when the preferred strategy cannot run.
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::RollingWindow,
        StrategyKind::IntelligentSummary,
        StrategyKind::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RollingWindow => "rolling_window",
            StrategyKind::IntelligentSummary => "intelligent_summary",
            StrategyKind::Hybrid => "hybrid",
        }
    }

    /// Rough expected compressed/original ratio for a conversation of `message_count`.
    pub fn estimated_ratio(&self, message_count: usize) -> f64 {
        let base = match self {
            StrategyKind::RollingWindow => 0.4,
            StrategyKind::IntelligentSummary => 0.3,
            StrategyKind::Hybrid => 0.35,
        };
        let adjusted = if message_count > 50 {
            base - 0.1
        } else if message_count < 20 {
            base + 0.1
        } else {
            base
        };
        f64::clamp(adjusted, 0.1, 0.8)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown strategy: {}", s))
    }
}

/// Input handed to a strategy.
#[derive(Debug, Clone)]
pub struct CompressionContext {
    messages: Vec<Message>,
    pub max_context_tokens: usize,
    preserve_recent_count: usize,
    pub target_compression_ratio: f32,
    pub model_name: Option<String>,
    pub conversation_id: Option<String>,
}

impl CompressionContext {
    pub fn new(messages: Vec<Message>, max_context_tokens: usize, preserve_recent_count: usize) -> Self {
        let preserve_recent_count = preserve_recent_count.min(messages.len());
        Self {
            messages,
            max_context_tokens,
            preserve_recent_count,
            target_compression_ratio: 0.3,
            model_name: None,
            conversation_id: None,
        }
    }

    pub fn with_target_ratio(mut self, ratio: f32) -> Self {
        self.target_compression_ratio = ratio;
        self
    }

    pub fn with_model(mut self, model_name: Option<String>) -> Self {
        self.model_name = model_name;
        self
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Always `<= messages().len()`.
    pub fn preserve_recent_count(&self) -> usize {
        self.preserve_recent_count
    }

    /// `(older, recent)` where `recent` is the verbatim tail.
    pub fn split_recent(&self) -> (&[Message], &[Message]) {
        self.messages
            .split_at(self.messages.len() - self.preserve_recent_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    pub compressed_messages: Vec<Message>,
    pub original_token_count: usize,
    pub compressed_token_count: usize,
    pub compression_ratio: f64,
    pub compression_time_ms: u64,
    pub quality_score: f32,
    pub strategy_used: StrategyKind,
    pub preserved: PreservedInfo,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CompressionResult {
    pub fn is_cached(&self) -> bool {
        self.metadata
            .get("cached")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn tokens_saved(&self) -> i64 {
        self.original_token_count as i64 - self.compressed_token_count as i64
    }
}

#[async_trait]
pub trait CompressionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn can_compress(&self, ctx: &CompressionContext) -> bool;

    async fn compress(&self, ctx: &CompressionContext) -> Result<CompressionResult, CompressionError>;

    /// Expected wall time in milliseconds.
    fn estimate_compression_time(&self, ctx: &CompressionContext) -> u64 {
        ctx.messages().len() as u64
    }
}

/// The three strategies, built once from their sub-configs.
pub struct StrategySet {
    rolling_window: Arc<RollingWindowStrategy>,
    intelligent_summary: Arc<IntelligentSummaryStrategy>,
    hybrid: HybridStrategy,
}

impl StrategySet {
    pub fn new(
        config: &StrategiesConfig,
        generation_timeout: Duration,
        analyzer: Arc<ImportanceAnalyzer>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let rolling_window = Arc::new(RollingWindowStrategy::new(
            config.rolling_window.clone(),
            analyzer.clone(),
        ));
        let intelligent_summary = Arc::new(IntelligentSummaryStrategy::new(
            config.intelligent_summary.clone(),
            generation_timeout,
            analyzer.clone(),
            generator,
        ));
        let hybrid = HybridStrategy::new(
            config.hybrid.clone(),
            analyzer,
            rolling_window.clone(),
            intelligent_summary.clone(),
        );

        Self {
            rolling_window,
            intelligent_summary,
            hybrid,
        }
    }

    pub fn get(&self, kind: StrategyKind) -> &dyn CompressionStrategy {
        match kind {
            StrategyKind::RollingWindow => self.rolling_window.as_ref() as &dyn CompressionStrategy,
            StrategyKind::IntelligentSummary => self.intelligent_summary.as_ref(),
            StrategyKind::Hybrid => &self.hybrid,
        }
    }

    /// Strategies in fallback order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn CompressionStrategy> {
        StrategyKind::ALL.into_iter().map(move |kind| self.get(kind))
    }

    pub fn is_enabled(&self, kind: StrategyKind) -> bool {
        match kind {
            StrategyKind::RollingWindow => self.rolling_window.is_enabled(),
            StrategyKind::IntelligentSummary => self.intelligent_summary.is_enabled(),
            StrategyKind::Hybrid => self.hybrid.is_enabled(),
        }
    }
}

/// Counts questions and code blocks among `messages`.
pub(crate) fn count_preserved(analyzer: &ImportanceAnalyzer, messages: &[Message]) -> (usize, usize) {
    messages.iter().fold((0, 0), |(questions, code), m| {
        (
            questions + usize::from(analyzer.is_question(&m.content)),
            code + usize::from(analyzer.contains_code(&m.content)),
        )
    })
}

pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
