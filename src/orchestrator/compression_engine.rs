use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::importance_engine::{
    AnalyzerSettings, CompressionCandidate, ConversationMetrics, ImportanceAnalyzer,
};
use super::quality::compression_ratio;
use super::strategies::{
    elapsed_ms, CompressionContext, CompressionError, CompressionResult, StrategyKind, StrategySet,
};
use crate::config::{CompressionConfig, Config};
use crate::models::Message;
use crate::services::text_generator::TextGenerator;
use crate::services::token_estimator::TokenEstimator;
use crate::storage::cache_store::{CompressionCache, NewCacheEntry};
use crate::storage::metrics_store::{
    CompressionStatRecord, MetricsSink, OperationType, PerformanceRecord,
};
use crate::storage::StoreError;

#[derive(Debug, Clone, Default)]
pub struct CompressionRequest {
    pub messages: Vec<Message>,
    pub conversation_id: Option<String>,
    pub model_name: Option<String>,
    pub max_context_tokens: Option<usize>,
    /// Skip the cache and trigger checks, including the enabled switch.
    pub force: bool,
    /// Run this strategy instead of selecting one.
    pub strategy: Option<StrategyKind>,
}

impl CompressionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn strategy(mut self, kind: StrategyKind) -> Self {
        self.strategy = Some(kind);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    TokenThreshold,
    MessageThreshold,
    UtilizationThreshold,
    Forced,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::TokenThreshold => "token_threshold",
            TriggerReason::MessageThreshold => "message_threshold",
            TriggerReason::UtilizationThreshold => "utilization_threshold",
            TriggerReason::Forced => "forced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CompressionDisabled,
    NoMessages,
    RecentlyCompressed,
    NoTriggers,
    NoSuitableStrategy,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::CompressionDisabled => "compression_disabled",
            SkipReason::NoMessages => "no_messages",
            SkipReason::RecentlyCompressed => "recently_compressed",
            SkipReason::NoTriggers => "no_triggers",
            SkipReason::NoSuitableStrategy => "no_suitable_strategy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Compress(TriggerReason),
    Skip(SkipReason),
}

impl TriggerDecision {
    pub fn should_compress(&self) -> bool {
        matches!(self, TriggerDecision::Compress(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            TriggerDecision::Compress(reason) => reason.as_str(),
            TriggerDecision::Skip(reason) => reason.as_str(),
        }
    }
}

#[derive(Debug)]
pub enum CompressionOutcome {
    Skipped(SkipReason),
    Compressed(CompressionResult),
    Failed(CompressionError),
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyEvaluation {
    pub strategy: StrategyKind,
    pub enabled: bool,
    pub available: bool,
    pub estimated_time_ms: u64,
    pub estimated_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationReport {
    pub should_compress: bool,
    pub reason: String,
    pub recommended_strategy: Option<StrategyKind>,
    pub conversation_metrics: ConversationMetrics,
    pub strategies: Vec<StrategyEvaluation>,
    pub compression_candidates: Vec<CompressionCandidate>,
}

/// SHA-256 over the ordered message contents. Roles and timestamps do not
/// participate.
pub fn context_hash(messages: &[Message]) -> String {
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    // serializing a Vec<&str> cannot fail
    let canonical = serde_json::to_string(&contents).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Whether a fresh result may be replayed to later requests for the same
/// content. Override runs and results that lost information are not.
fn is_cacheable(request: &CompressionRequest, result: &CompressionResult) -> bool {
    let degraded = result
        .metadata
        .get("summary_degraded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    request.strategy.is_none() && result.preserved.critical_loss == 0 && !degraded
}

/// Decides whether, how, and with which strategy a conversation is compressed.
///
/// Metrics and cache writes run as background tasks so a slow store never
/// delays the caller. [`CompressionEngine::flush_pending_writes`] waits for them.
pub struct CompressionEngine {
    config: CompressionConfig,
    analyzer: Arc<ImportanceAnalyzer>,
    strategies: StrategySet,
    cache: Arc<dyn CompressionCache>,
    metrics: Arc<dyn MetricsSink>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl CompressionEngine {
    pub fn new(
        config: CompressionConfig,
        analyzer: Arc<ImportanceAnalyzer>,
        strategies: StrategySet,
        cache: Arc<dyn CompressionCache>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            analyzer,
            strategies,
            cache,
            metrics,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    /// Wires the analyzer and strategy set from a loaded configuration.
    pub fn from_config(
        config: &Config,
        estimator: Arc<dyn TokenEstimator>,
        generator: Arc<dyn TextGenerator>,
        cache: Arc<dyn CompressionCache>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let analyzer = Arc::new(ImportanceAnalyzer::new(
            estimator,
            AnalyzerSettings::from(&config.compression),
        ));
        let strategies = StrategySet::new(
            &config.compression.strategies,
            std::time::Duration::from_secs(config.generation_timeout_secs),
            analyzer.clone(),
            generator,
        );
        Self::new(config.compression.clone(), analyzer, strategies, cache, metrics)
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &ImportanceAnalyzer {
        &self.analyzer
    }

    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    fn max_tokens(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.config.default_max_context_tokens)
    }

    pub async fn should_compress(
        &self,
        messages: &[Message],
        conversation_id: Option<&str>,
        max_context_tokens: Option<usize>,
    ) -> TriggerDecision {
        self.trigger_decision(messages, conversation_id, max_context_tokens, None)
            .await
    }

    async fn trigger_decision(
        &self,
        messages: &[Message],
        conversation_id: Option<&str>,
        max_context_tokens: Option<usize>,
        model_name: Option<&str>,
    ) -> TriggerDecision {
        if !self.config.enabled {
            return TriggerDecision::Skip(SkipReason::CompressionDisabled);
        }
        if messages.is_empty() {
            return TriggerDecision::Skip(SkipReason::NoMessages);
        }
        if let Some(id) = conversation_id {
            if self.recently_compressed(id).await {
                return TriggerDecision::Skip(SkipReason::RecentlyCompressed);
            }
        }

        let metrics = self
            .analyzer
            .for_model(model_name)
            .analyze_conversation(messages, self.max_tokens(max_context_tokens));
        let settings = self.analyzer.settings();

        if !metrics.compression_candidate {
            TriggerDecision::Skip(SkipReason::NoTriggers)
        } else if metrics.total_tokens >= settings.token_threshold {
            TriggerDecision::Compress(TriggerReason::TokenThreshold)
        } else if metrics.total_messages >= settings.message_threshold {
            TriggerDecision::Compress(TriggerReason::MessageThreshold)
        } else if metrics.context_utilization > settings.utilization_threshold {
            TriggerDecision::Compress(TriggerReason::UtilizationThreshold)
        } else {
            TriggerDecision::Skip(SkipReason::NoTriggers)
        }
    }

    async fn recently_compressed(&self, conversation_id: &str) -> bool {
        if self.config.recent_compression_window_minutes <= 0 {
            return false;
        }
        let Some(window) = Duration::try_minutes(self.config.recent_compression_window_minutes) else {
            return false;
        };
        match self.metrics.last_compressed_at(conversation_id).await {
            Ok(Some(last)) => Utc::now().signed_duration_since(last) < window,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Could not read compression history for {}: {}", conversation_id, e);
                false
            }
        }
    }

    /// Preferred strategy if it can run, else the first that can in fallback order.
    pub async fn select_strategy(&self, ctx: &CompressionContext) -> Option<StrategyKind> {
        let preferred = self.config.strategy;
        if self.strategies.get(preferred).can_compress(ctx).await {
            return Some(preferred);
        }

        for strategy in self.strategies.iter() {
            if strategy.kind() != preferred && strategy.can_compress(ctx).await {
                tracing::debug!("Preferred strategy {} unavailable, using {}", preferred, strategy.kind());
                return Some(strategy.kind());
            }
        }

        None
    }

    fn build_context(&self, request: &CompressionRequest) -> CompressionContext {
        CompressionContext::new(
            request.messages.clone(),
            self.max_tokens(request.max_context_tokens),
            self.config.preserve_recent_messages,
        )
        .with_target_ratio(self.config.compression_ratio_target)
        .with_model(request.model_name.clone())
        .with_conversation(request.conversation_id.clone())
    }

    pub async fn compress_conversation(&self, request: CompressionRequest) -> CompressionOutcome {
        if request.messages.is_empty() {
            return CompressionOutcome::Skipped(SkipReason::NoMessages);
        }
        if !self.config.enabled && !request.force {
            return CompressionOutcome::Skipped(SkipReason::CompressionDisabled);
        }

        let hash = context_hash(&request.messages);
        let use_cache = self.config.cache_enabled && !request.force && request.strategy.is_none();

        if use_cache {
            if let Some(result) = self.cached_result(&hash, &request).await {
                tracing::info!(
                    "Serving cached compression for {} messages ({} -> {})",
                    request.messages.len(),
                    result.original_token_count,
                    result.compressed_token_count
                );
                return CompressionOutcome::Compressed(result);
            }
        }

        let trigger = if request.force {
            TriggerReason::Forced
        } else {
            match self
                .trigger_decision(
                    &request.messages,
                    request.conversation_id.as_deref(),
                    request.max_context_tokens,
                    request.model_name.as_deref(),
                )
                .await
            {
                TriggerDecision::Compress(reason) => reason,
                TriggerDecision::Skip(reason) => {
                    tracing::debug!("Skipping compression: {}", reason.as_str());
                    return CompressionOutcome::Skipped(reason);
                }
            }
        };

        let ctx = self.build_context(&request);
        let kind = match request.strategy {
            Some(kind) => kind,
            None => match self.select_strategy(&ctx).await {
                Some(kind) => kind,
                None => {
                    tracing::debug!("No strategy can compress {} messages", ctx.messages().len());
                    return CompressionOutcome::Skipped(SkipReason::NoSuitableStrategy);
                }
            },
        };

        let start = Instant::now();
        let outcome = self.strategies.get(kind).compress(&ctx).await;
        let duration_ms = elapsed_ms(start);

        let mut result = match outcome {
            Ok(result) if result.compressed_messages.is_empty() => {
                let error = CompressionError::EmptyOutput(kind);
                self.record_failure(kind, &request, duration_ms, &error).await;
                return CompressionOutcome::Failed(error);
            }
            Ok(result) => result,
            Err(error) => {
                tracing::error!("Compression with {} failed: {}", kind, error);
                self.record_failure(kind, &request, duration_ms, &error).await;
                return CompressionOutcome::Failed(error);
            }
        };

        result.compression_time_ms = duration_ms;
        result.metadata.insert("cached".into(), json!(false));
        result.metadata.insert("trigger".into(), json!(trigger.as_str()));

        tracing::info!(
            "Compressed {} -> {} messages with {} (ratio {:.2}, quality {:.2}, {}ms)",
            ctx.messages().len(),
            result.compressed_messages.len(),
            kind,
            result.compression_ratio,
            result.quality_score,
            duration_ms
        );

        self.record_success(&request, &result, trigger).await;

        if self.config.cache_enabled {
            if is_cacheable(&request, &result) {
                self.store_in_cache(hash, &request, &result).await;
            } else {
                tracing::debug!("Not caching {} result for {} messages", kind, request.messages.len());
            }
        }

        CompressionOutcome::Compressed(result)
    }

    async fn cached_result(&self, hash: &str, request: &CompressionRequest) -> Option<CompressionResult> {
        let entry = match self.cache.get(hash).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache lookup failed, treating as miss: {}", e);
                return None;
            }
        };

        let cache = self.cache.clone();
        let key = hash.to_string();
        self.spawn_write(async move {
            if let Err(e) = cache.increment_access(&key).await {
                tracing::warn!("Failed to bump cache access count: {}", e);
            }
        })
        .await;

        let mut metadata = entry.metadata;
        metadata.insert("cached".into(), json!(true));
        metadata.insert("cache_id".into(), json!(entry.id));
        metadata.insert("cache_access_count".into(), json!(entry.access_count + 1));

        let result = CompressionResult {
            compression_ratio: compression_ratio(entry.original_token_count, entry.compressed_token_count),
            compressed_messages: entry.compressed_messages,
            original_token_count: entry.original_token_count,
            compressed_token_count: entry.compressed_token_count,
            compression_time_ms: 0,
            quality_score: entry.quality_score,
            strategy_used: entry.strategy,
            preserved: entry.preserved,
            metadata,
        };

        self.record(PerformanceRecord {
            timestamp: Utc::now(),
            strategy: result.strategy_used.as_str().to_string(),
            operation_type: OperationType::CacheHit,
            duration_ms: 0,
            input_tokens: result.original_token_count,
            output_tokens: Some(result.compressed_token_count),
            compression_ratio: Some(result.compression_ratio),
            quality_score: Some(result.quality_score),
            success: true,
            error_message: None,
            model_name: request.model_name.clone(),
        })
        .await;

        Some(result)
    }

    async fn store_in_cache(&self, hash: String, request: &CompressionRequest, result: &CompressionResult) {
        let entry = NewCacheEntry {
            context_hash: hash,
            conversation_id: request.conversation_id.clone(),
            compressed_messages: result.compressed_messages.clone(),
            original_token_count: result.original_token_count,
            compressed_token_count: result.compressed_token_count,
            strategy: result.strategy_used,
            quality_score: result.quality_score,
            preserved: result.preserved,
            metadata: result.metadata.clone(),
        };

        let Some(ttl) = Duration::try_hours(self.config.cache_ttl_hours) else {
            tracing::warn!("Cache TTL of {}h is out of range, not caching", self.config.cache_ttl_hours);
            return;
        };
        let cache = self.cache.clone();
        self.spawn_write(async move {
            if let Err(e) = cache.put(entry, ttl).await {
                tracing::warn!("Failed to cache compression result: {}", e);
            }
        })
        .await;
    }

    async fn spawn_write<F>(&self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(write);
        let mut pending = self.pending_writes.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Waits for every metrics and cache write spawned so far. A write that
    /// panicked resumes its panic here.
    pub async fn flush_pending_writes(&self) {
        let handles = std::mem::take(&mut *self.pending_writes.lock().await);
        for handle in handles {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::warn!("Background store write did not finish: {}", e),
            }
        }
    }

    async fn record(&self, record: PerformanceRecord) {
        let metrics = self.metrics.clone();
        self.spawn_write(async move {
            if let Err(e) = metrics.record_operation(record).await {
                tracing::warn!("Failed to record compression metrics: {}", e);
            }
        })
        .await;
    }

    async fn record_success(&self, request: &CompressionRequest, result: &CompressionResult, trigger: TriggerReason) {
        self.record(PerformanceRecord {
            timestamp: Utc::now(),
            strategy: result.strategy_used.as_str().to_string(),
            operation_type: OperationType::Compression,
            duration_ms: result.compression_time_ms,
            input_tokens: result.original_token_count,
            output_tokens: Some(result.compressed_token_count),
            compression_ratio: Some(result.compression_ratio),
            quality_score: Some(result.quality_score),
            success: true,
            error_message: None,
            model_name: request.model_name.clone(),
        })
        .await;

        let Some(conversation_id) = &request.conversation_id else {
            return;
        };
        let stat = CompressionStatRecord {
            conversation_id: conversation_id.clone(),
            timestamp: Utc::now(),
            original_tokens: result.original_token_count,
            compressed_tokens: result.compressed_token_count,
            compression_ratio: result.compression_ratio,
            strategy: result.strategy_used.as_str().to_string(),
            compression_time_ms: result.compression_time_ms,
            quality_score: result.quality_score,
            messages_compressed: result.compressed_messages.len(),
            messages_preserved: result.preserved.recent_preserved,
            triggered_by: Some(trigger.as_str().to_string()),
        };
        let metrics = self.metrics.clone();
        self.spawn_write(async move {
            if let Err(e) = metrics.record_compression(stat).await {
                tracing::warn!("Failed to record compression stats: {}", e);
            }
        })
        .await;
    }

    async fn record_failure(
        &self,
        kind: StrategyKind,
        request: &CompressionRequest,
        duration_ms: u64,
        error: &CompressionError,
    ) {
        self.record(PerformanceRecord {
            timestamp: Utc::now(),
            strategy: kind.as_str().to_string(),
            operation_type: OperationType::Compression,
            duration_ms,
            input_tokens: self
                .analyzer
                .for_model(request.model_name.as_deref())
                .content_tokens(&request.messages),
            output_tokens: None,
            compression_ratio: None,
            quality_score: None,
            success: false,
            error_message: Some(error.to_string()),
            model_name: request.model_name.clone(),
        })
        .await;
    }

    /// What compressing `messages` would do, without compressing or recording anything.
    pub async fn get_compression_recommendations(
        &self,
        messages: &[Message],
        model_name: Option<String>,
        max_context_tokens: Option<usize>,
    ) -> RecommendationReport {
        let max_tokens = self.max_tokens(max_context_tokens);
        let conversation_metrics = self
            .analyzer
            .for_model(model_name.as_deref())
            .analyze_conversation(messages, max_tokens);
        let decision = self
            .trigger_decision(messages, None, Some(max_tokens), model_name.as_deref())
            .await;

        let ctx = CompressionContext::new(
            messages.to_vec(),
            max_tokens,
            self.config.preserve_recent_messages,
        )
        .with_target_ratio(self.config.compression_ratio_target)
        .with_model(model_name);

        let mut strategies = Vec::with_capacity(StrategyKind::ALL.len());
        for strategy in self.strategies.iter() {
            let kind = strategy.kind();
            strategies.push(StrategyEvaluation {
                strategy: kind,
                enabled: self.strategies.is_enabled(kind),
                available: strategy.can_compress(&ctx).await,
                estimated_time_ms: strategy.estimate_compression_time(&ctx),
                estimated_ratio: kind.estimated_ratio(messages.len()),
            });
        }

        let recommended_strategy = if decision.should_compress() {
            self.select_strategy(&ctx).await
        } else {
            None
        };

        RecommendationReport {
            should_compress: decision.should_compress(),
            reason: decision.reason().to_string(),
            recommended_strategy,
            conversation_metrics,
            strategies,
            compression_candidates: self.analyzer.identify_compression_candidates(messages),
        }
    }

    /// Removes expired cache entries. Meant for a periodic sweep, not the request path.
    pub async fn cleanup_expired_cache(&self) -> Result<u64, StoreError> {
        let removed = self.cache.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!("Removed {} expired compression cache entries", removed);
        }
        Ok(removed)
    }
}
