use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Instant;

use super::{
    count_preserved, elapsed_ms, CompressionContext, CompressionError, CompressionResult,
    CompressionStrategy, StrategyKind,
};
use crate::config::RollingWindowConfig;
use crate::models::Message;
use crate::orchestrator::importance_engine::ImportanceAnalyzer;
use crate::orchestrator::quality::{compression_ratio, quality_score, PreservedInfo};

/// Keeps the recent tail verbatim plus the most important older messages.
pub struct RollingWindowStrategy {
    config: RollingWindowConfig,
    analyzer: Arc<ImportanceAnalyzer>,
}

impl RollingWindowStrategy {
    pub fn new(config: RollingWindowConfig, analyzer: Arc<ImportanceAnalyzer>) -> Self {
        Self { config, analyzer }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RollingWindowConfig {
        &self.config
    }

    /// Older messages worth keeping, in their original order.
    ///
    /// Recency is scored from the end of `older`, so the newest older message
    /// gets the full bonus. Over-full selections are reranked without recency.
    pub fn select_older(&self, older: &[Message]) -> Vec<Message> {
        let mut kept: Vec<usize> = older
            .iter()
            .enumerate()
            .filter(|(index, message)| {
                let position_from_end = older.len() - 1 - index;
                self.analyzer.message_importance(message, position_from_end)
                    >= self.config.importance_threshold
            })
            .map(|(index, _)| index)
            .collect();

        if kept.len() > self.config.window_size {
            let mut ranked: Vec<(usize, f32)> = kept
                .iter()
                .map(|&index| (index, self.analyzer.message_importance(&older[index], 0)))
                .collect();
            // stable: equal scores keep conversation order
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked.truncate(self.config.window_size);

            kept = ranked.into_iter().map(|(index, _)| index).collect();
            kept.sort_unstable();
        }

        kept.into_iter().map(|index| older[index].clone()).collect()
    }

    pub(crate) fn run(&self, ctx: &CompressionContext) -> CompressionResult {
        let start = Instant::now();
        let (older, recent) = ctx.split_recent();

        let mut compressed = self.select_older(older);
        let older_kept = compressed.len();
        compressed.extend_from_slice(recent);

        let (questions_preserved, code_preserved) = count_preserved(&self.analyzer, &compressed);
        let preserved = PreservedInfo {
            questions_preserved,
            code_preserved,
            recent_preserved: recent.len(),
            critical_loss: 0,
        };

        let tokens = self.analyzer.for_model(ctx.model_name.as_deref());
        let original_token_count = tokens.content_tokens(ctx.messages());
        let compressed_token_count = tokens.content_tokens(&compressed);

        let mut metadata = Map::new();
        metadata.insert("window_size".into(), json!(self.config.window_size));
        metadata.insert("importance_threshold".into(), json!(self.config.importance_threshold));
        metadata.insert("older_messages_kept".into(), json!(older_kept));
        metadata.insert("older_messages_dropped".into(), json!(older.len() - older_kept));
        metadata.insert("recent_preserved".into(), json!(recent.len()));

        CompressionResult {
            quality_score: quality_score(ctx.messages().len(), compressed.len(), &preserved),
            compressed_messages: compressed,
            original_token_count,
            compressed_token_count,
            compression_ratio: compression_ratio(original_token_count, compressed_token_count),
            compression_time_ms: elapsed_ms(start),
            strategy_used: StrategyKind::RollingWindow,
            preserved,
            metadata,
        }
    }
}

#[async_trait]
impl CompressionStrategy for RollingWindowStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RollingWindow
    }

    async fn can_compress(&self, ctx: &CompressionContext) -> bool {
        self.config.enabled && ctx.messages().len() > self.config.window_size + 2
    }

    async fn compress(&self, ctx: &CompressionContext) -> Result<CompressionResult, CompressionError> {
        let result = self.run(ctx);
        tracing::debug!(
            "Rolling window kept {} of {} messages",
            result.compressed_messages.len(),
            ctx.messages().len()
        );
        Ok(result)
    }
}
