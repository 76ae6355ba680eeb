use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Instant;

use super::{
    count_preserved, elapsed_ms, CompressionContext, CompressionError, CompressionResult,
    CompressionStrategy, IntelligentSummaryStrategy, RollingWindowStrategy, StrategyKind,
};
use crate::config::HybridConfig;
use crate::models::Message;
use crate::orchestrator::importance_engine::ImportanceAnalyzer;
use crate::orchestrator::quality::{compression_ratio, quality_score, PreservedInfo};

/// Tier 2 messages survive at or above this importance (scored at position 0).
const TIER2_IMPORTANCE_THRESHOLD: f32 = 0.4;

/// Recent tail kept when tier 3 falls back to a rolling-window pass.
const TIER3_FALLBACK_PRESERVE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier3Method {
    Summary,
    RollingWindow,
    None,
}

impl Tier3Method {
    fn as_str(self) -> &'static str {
        match self {
            Tier3Method::Summary => "summary",
            Tier3Method::RollingWindow => "rolling_window",
            Tier3Method::None => "none",
        }
    }
}

/// Three tiers: oldest summarised, middle filtered by importance, newest verbatim.
pub struct HybridStrategy {
    config: HybridConfig,
    analyzer: Arc<ImportanceAnalyzer>,
    rolling_window: Arc<RollingWindowStrategy>,
    summary: Arc<IntelligentSummaryStrategy>,
}

impl HybridStrategy {
    pub fn new(
        config: HybridConfig,
        analyzer: Arc<ImportanceAnalyzer>,
        rolling_window: Arc<RollingWindowStrategy>,
        summary: Arc<IntelligentSummaryStrategy>,
    ) -> Self {
        Self {
            config,
            analyzer,
            rolling_window,
            summary,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn compress_tier3(&self, ctx: &CompressionContext, tier3: &[Message]) -> (Vec<Message>, Tier3Method) {
        if tier3.is_empty() {
            return (Vec::new(), Tier3Method::None);
        }

        let tier3_ctx = CompressionContext::new(tier3.to_vec(), ctx.max_context_tokens, 0)
            .with_target_ratio(self.config.tier3_summary_ratio)
            .with_model(ctx.model_name.clone())
            .with_conversation(ctx.conversation_id.clone());

        if self.summary.can_compress(&tier3_ctx).await {
            match self
                .summary
                .generate_summary(tier3, self.config.tier3_summary_ratio)
                .await
            {
                Ok(summary) => return (vec![Message::summary(&summary)], Tier3Method::Summary),
                Err(e) => tracing::warn!("Tier 3 summary failed, using rolling window: {}", e),
            }
        }

        let window_ctx = CompressionContext::new(
            tier3.to_vec(),
            ctx.max_context_tokens,
            TIER3_FALLBACK_PRESERVE,
        )
        .with_model(ctx.model_name.clone())
        .with_conversation(ctx.conversation_id.clone());

        (
            self.rolling_window.run(&window_ctx).compressed_messages,
            Tier3Method::RollingWindow,
        )
    }
}

#[async_trait]
impl CompressionStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    async fn can_compress(&self, ctx: &CompressionContext) -> bool {
        self.config.enabled
            && ctx.messages().len()
                > self.config.tier1_messages + self.config.tier2_messages + ctx.preserve_recent_count()
    }

    async fn compress(&self, ctx: &CompressionContext) -> Result<CompressionResult, CompressionError> {
        let start = Instant::now();
        let len = ctx.messages().len();

        let tier1_start = len.saturating_sub(self.config.tier1_messages);
        let tier2_start = tier1_start.saturating_sub(self.config.tier2_messages);
        let tier3 = &ctx.messages()[..tier2_start];
        let tier2 = &ctx.messages()[tier2_start..tier1_start];
        let tier1 = &ctx.messages()[tier1_start..];

        let (mut compressed, tier3_method) = self.compress_tier3(ctx, tier3).await;
        let tier3_output = compressed.len();

        let tier2_kept: Vec<Message> = tier2
            .iter()
            .filter(|m| self.analyzer.message_importance(m, 0) >= TIER2_IMPORTANCE_THRESHOLD)
            .cloned()
            .collect();
        let tier2_count = tier2_kept.len();
        compressed.extend(tier2_kept);
        compressed.extend_from_slice(tier1);

        // summaries carry no original question or code text
        let counted = if tier3_method == Tier3Method::Summary {
            &compressed[tier3_output..]
        } else {
            &compressed[..]
        };
        let (questions_preserved, code_preserved) = count_preserved(&self.analyzer, counted);
        let preserved = PreservedInfo {
            questions_preserved,
            code_preserved,
            recent_preserved: tier1.len(),
            critical_loss: 0,
        };

        let tokens = self.analyzer.for_model(ctx.model_name.as_deref());
        let original_token_count = tokens.content_tokens(ctx.messages());
        let compressed_token_count = tokens.content_tokens(&compressed);

        let mut metadata = Map::new();
        metadata.insert("tier1_messages".into(), json!(self.config.tier1_messages));
        metadata.insert("tier2_messages".into(), json!(self.config.tier2_messages));
        metadata.insert("tier3_summary_ratio".into(), json!(self.config.tier3_summary_ratio));
        metadata.insert("tier1_count".into(), json!(tier1.len()));
        metadata.insert("tier2_count".into(), json!(tier2_count));
        metadata.insert("tier3_count".into(), json!(tier3.len()));
        metadata.insert("tier3_method".into(), json!(tier3_method.as_str()));

        Ok(CompressionResult {
            quality_score: quality_score(len, compressed.len(), &preserved),
            compressed_messages: compressed,
            original_token_count,
            compressed_token_count,
            compression_ratio: compression_ratio(original_token_count, compressed_token_count),
            compression_time_ms: elapsed_ms(start),
            strategy_used: StrategyKind::Hybrid,
            preserved,
            metadata,
        })
    }
}
