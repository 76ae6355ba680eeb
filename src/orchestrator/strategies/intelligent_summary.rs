use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{
    count_preserved, elapsed_ms, CompressionContext, CompressionError, CompressionResult,
    CompressionStrategy, StrategyKind,
};
use crate::config::{IntelligentSummaryConfig, SummaryFailureMode};
use crate::models::Message;
use crate::orchestrator::importance_engine::ImportanceAnalyzer;
use crate::orchestrator::quality::{compression_ratio, quality_score, PreservedInfo};
use crate::services::text_generator::TextGenerator;

const SUMMARY_PROMPT: &str = "Please provide a concise summary of this conversation in approximately {target} characters. Focus on key points, decisions, and important information:\n\n{transcript}\n\nSummary:";

/// Replaces the older span with a single generated summary message.
pub struct IntelligentSummaryStrategy {
    config: IntelligentSummaryConfig,
    timeout: Duration,
    analyzer: Arc<ImportanceAnalyzer>,
    generator: Arc<dyn TextGenerator>,
}

impl IntelligentSummaryStrategy {
    pub fn new(
        config: IntelligentSummaryConfig,
        timeout: Duration,
        analyzer: Arc<ImportanceAnalyzer>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            timeout,
            analyzer,
            generator,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &IntelligentSummaryConfig {
        &self.config
    }

    pub async fn generator_healthy(&self) -> bool {
        self.generator.is_healthy().await
    }

    /// One generator call summarising `messages` to about `length_ratio` of
    /// the transcript length.
    pub async fn generate_summary(
        &self,
        messages: &[Message],
        length_ratio: f32,
    ) -> Result<String, CompressionError> {
        let transcript = format_transcript(messages);
        let target = (transcript.chars().count() as f32 * length_ratio) as usize;
        let prompt = SUMMARY_PROMPT
            .replace("{target}", &target.to_string())
            .replace("{transcript}", &transcript);

        let reply = tokio::time::timeout(
            self.timeout,
            self.generator.generate(&prompt, &self.config.summarization_model),
        )
        .await
        .map_err(|_| CompressionError::GenerationTimeout(self.timeout.as_secs()))??;

        let summary = clean_summary(&reply);
        if summary.is_empty() {
            return Err(CompressionError::EmptySummary);
        }
        Ok(summary)
    }
}

pub fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn clean_summary(reply: &str) -> String {
    let trimmed = reply.trim();
    trimmed
        .strip_prefix("Summary:")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

#[async_trait]
impl CompressionStrategy for IntelligentSummaryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::IntelligentSummary
    }

    async fn can_compress(&self, _ctx: &CompressionContext) -> bool {
        self.config.enabled && self.generator.is_healthy().await
    }

    async fn compress(&self, ctx: &CompressionContext) -> Result<CompressionResult, CompressionError> {
        let start = Instant::now();
        let (older, recent) = ctx.split_recent();

        let mut compressed = Vec::with_capacity(recent.len() + 1);
        let mut critical_loss = 0;
        let mut degraded = false;

        if !older.is_empty() {
            match self.generate_summary(older, self.config.summary_length_ratio).await {
                Ok(summary) => compressed.push(Message::summary(&summary)),
                Err(e) => match self.config.failure_mode {
                    SummaryFailureMode::Fail => return Err(e),
                    SummaryFailureMode::Degrade => {
                        tracing::warn!("Summary generation failed, degrading: {}", e);
                        compressed.push(Message::failed_summary(&e.to_string()));
                        critical_loss = 1;
                        degraded = true;
                    }
                },
            }
        }
        compressed.extend_from_slice(recent);

        let (questions_preserved, code_preserved) = count_preserved(&self.analyzer, recent);
        let preserved = PreservedInfo {
            questions_preserved,
            code_preserved,
            recent_preserved: recent.len(),
            critical_loss,
        };

        let tokens = self.analyzer.for_model(ctx.model_name.as_deref());
        let original_token_count = tokens.content_tokens(ctx.messages());
        let compressed_token_count = tokens.content_tokens(&compressed);

        let mut metadata = Map::new();
        metadata.insert("summarization_model".into(), json!(self.config.summarization_model));
        metadata.insert("summary_length_ratio".into(), json!(self.config.summary_length_ratio));
        metadata.insert("messages_summarized".into(), json!(older.len()));
        metadata.insert("recent_preserved".into(), json!(recent.len()));
        metadata.insert("summary_degraded".into(), json!(degraded));

        Ok(CompressionResult {
            quality_score: quality_score(ctx.messages().len(), compressed.len(), &preserved),
            compressed_messages: compressed,
            original_token_count,
            compressed_token_count,
            compression_ratio: compression_ratio(original_token_count, compressed_token_count),
            compression_time_ms: elapsed_ms(start),
            strategy_used: StrategyKind::IntelligentSummary,
            preserved,
            metadata,
        })
    }
}
