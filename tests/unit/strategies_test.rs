use super::{analyzer_for, healthy_generator, plain_conversation, unhealthy_generator, MockGenerator};
use async_trait::async_trait;
use context_compressor::config::{Config, StrategiesConfig, SummaryFailureMode};
use context_compressor::models::{Message, SUMMARY_FAILURE_MARKER};
use context_compressor::orchestrator::strategies::{
    CompressionContext, CompressionError, StrategyKind, StrategySet,
};
use context_compressor::services::text_generator::{GenerationError, TextGenerator};
use std::sync::Arc;
use std::time::Duration;

fn strategies_config() -> StrategiesConfig {
    let mut strategies = Config::default().compression.strategies;
    strategies.intelligent_summary.enabled = true;
    strategies.hybrid.enabled = true;
    strategies
}

fn strategy_set(strategies: &StrategiesConfig, generator: Arc<dyn TextGenerator>) -> StrategySet {
    let config = Config::default();
    StrategySet::new(
        strategies,
        Duration::from_secs(5),
        analyzer_for(&config.compression),
        generator,
    )
}

fn failing_generator() -> MockGenerator {
    let mut generator = MockGenerator::new();
    generator.expect_is_healthy().returning(|| true);
    generator
        .expect_generate()
        .returning(|_, _| Err(GenerationError::Unavailable("backend down".to_string())));
    generator
}

struct SlowGenerator;

#[async_trait]
impl TextGenerator for SlowGenerator {
    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, GenerationError> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok("too late".to_string())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

// ============================================
// Rolling window
// ============================================

#[tokio::test]
async fn test_rolling_window_bounds_output_and_keeps_recent_tail() {
    let set = strategy_set(&strategies_config(), Arc::new(unhealthy_generator()));
    let messages = plain_conversation(25);
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let strategy = set.get(StrategyKind::RollingWindow);
    assert!(strategy.can_compress(&ctx).await);
    let result = strategy.compress(&ctx).await.unwrap();

    let output = &result.compressed_messages;
    assert!(output.len() <= 10 + 10);
    assert_eq!(&output[output.len() - 10..], &messages[15..]);
    assert_eq!(result.preserved.recent_preserved, 10);
    assert_eq!(result.strategy_used, StrategyKind::RollingWindow);
    assert!(result.compressed_token_count < result.original_token_count);
}

#[tokio::test]
async fn test_rolling_window_recency_counts_from_end_of_older_slice() {
    let mut strategies = strategies_config();
    strategies.rolling_window.importance_threshold = 0.45;
    strategies.rolling_window.window_size = 20;
    let set = strategy_set(&strategies, Arc::new(unhealthy_generator()));

    // 14 older assistant replies scored 0.3 plus recency, then a 10 message tail
    let mut messages: Vec<Message> = (0..14)
        .map(|i| Message::assistant(format!("plain words here {:03}", i)))
        .collect();
    messages.extend(plain_conversation(10).into_iter().map(|mut m| {
        m.content = format!("tail {}", m.content);
        m
    }));
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let result = set.get(StrategyKind::RollingWindow).compress(&ctx).await.unwrap();
    let output = &result.compressed_messages;

    // newest older reply: full bonus (0.5) but only half of it (0.4) against the whole conversation
    assert!(output.contains(&messages[13]));
    assert!(output.contains(&messages[12]));
    assert!(!output.contains(&messages[0]));
    assert_eq!(&output[output.len() - 10..], &messages[14..]);
}

#[tokio::test]
async fn test_rolling_window_retains_old_code_message() {
    let set = strategy_set(&strategies_config(), Arc::new(unhealthy_generator()));
    let mut messages = plain_conversation(30);
    messages[2] = Message::user("```\nfn main() { run(); }\n```");
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let result = set
        .get(StrategyKind::RollingWindow)
        .compress(&ctx)
        .await
        .unwrap();

    assert!(result.compressed_messages.contains(&messages[2]));
    assert!(result.preserved.code_preserved >= 1);
}

#[tokio::test]
async fn test_rolling_window_keeps_older_messages_in_order() {
    let set = strategy_set(&strategies_config(), Arc::new(unhealthy_generator()));
    let messages = plain_conversation(40);
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let result = set
        .get(StrategyKind::RollingWindow)
        .compress(&ctx)
        .await
        .unwrap();

    let positions: Vec<usize> = result
        .compressed_messages
        .iter()
        .map(|m| messages.iter().position(|o| o == m).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_rolling_window_needs_more_than_window_plus_two() {
    let set = strategy_set(&strategies_config(), Arc::new(unhealthy_generator()));
    let strategy = set.get(StrategyKind::RollingWindow);

    let short = CompressionContext::new(plain_conversation(12), 4096, 10);
    assert!(!strategy.can_compress(&short).await);

    let long = CompressionContext::new(plain_conversation(13), 4096, 10);
    assert!(strategy.can_compress(&long).await);
}

// ============================================
// Intelligent summary
// ============================================

#[tokio::test]
async fn test_summary_replaces_older_span() {
    let set = strategy_set(
        &strategies_config(),
        Arc::new(healthy_generator("Summary: they agreed on the rollout plan")),
    );
    let messages = plain_conversation(20);
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let result = set
        .get(StrategyKind::IntelligentSummary)
        .compress(&ctx)
        .await
        .unwrap();

    let output = &result.compressed_messages;
    assert_eq!(output.len(), 11);
    assert!(output[0].is_summary);
    assert_eq!(output[0].summary_text(), Some("they agreed on the rollout plan"));
    assert_eq!(&output[1..], &messages[10..]);
    assert_eq!(result.metadata["messages_summarized"], 10);
    assert_eq!(result.metadata["summary_degraded"], false);
    assert_eq!(result.preserved.critical_loss, 0);
}

#[tokio::test]
async fn test_summary_unavailable_when_generator_unhealthy() {
    let set = strategy_set(&strategies_config(), Arc::new(unhealthy_generator()));
    let ctx = CompressionContext::new(plain_conversation(20), 4096, 10);

    assert!(!set.get(StrategyKind::IntelligentSummary).can_compress(&ctx).await);
}

#[tokio::test]
async fn test_summary_failure_propagates_in_fail_mode() {
    let set = strategy_set(&strategies_config(), Arc::new(failing_generator()));
    let ctx = CompressionContext::new(plain_conversation(20), 4096, 10);

    let err = set
        .get(StrategyKind::IntelligentSummary)
        .compress(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, CompressionError::Generation(_)));
}

#[tokio::test]
async fn test_summary_failure_degrades_when_configured() {
    let mut strategies = strategies_config();
    strategies.intelligent_summary.failure_mode = SummaryFailureMode::Degrade;
    let set = strategy_set(&strategies, Arc::new(failing_generator()));
    let ctx = CompressionContext::new(plain_conversation(20), 4096, 10);

    let result = set
        .get(StrategyKind::IntelligentSummary)
        .compress(&ctx)
        .await
        .unwrap();

    let placeholder = &result.compressed_messages[0];
    assert!(placeholder.is_summary);
    assert!(placeholder.is_degraded_summary());
    assert!(placeholder.content.starts_with(SUMMARY_FAILURE_MARKER));
    assert_eq!(result.preserved.critical_loss, 1);
    assert_eq!(result.metadata["summary_degraded"], true);
}

#[tokio::test]
async fn test_empty_summary_is_an_error() {
    let set = strategy_set(&strategies_config(), Arc::new(healthy_generator("  Summary:  ")));
    let ctx = CompressionContext::new(plain_conversation(20), 4096, 10);

    let err = set
        .get(StrategyKind::IntelligentSummary)
        .compress(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, CompressionError::EmptySummary));
}

#[tokio::test]
async fn test_slow_generator_times_out() {
    let config = Config::default();
    let set = StrategySet::new(
        &strategies_config(),
        Duration::from_millis(50),
        analyzer_for(&config.compression),
        Arc::new(SlowGenerator),
    );
    let ctx = CompressionContext::new(plain_conversation(20), 4096, 10);

    let err = set
        .get(StrategyKind::IntelligentSummary)
        .compress(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, CompressionError::GenerationTimeout(_)));
}

#[tokio::test]
async fn test_summary_with_nothing_older_passes_messages_through() {
    let mut generator = MockGenerator::new();
    generator.expect_is_healthy().returning(|| true);
    generator.expect_generate().never();
    let set = strategy_set(&strategies_config(), Arc::new(generator));
    let messages = plain_conversation(5);
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let result = set
        .get(StrategyKind::IntelligentSummary)
        .compress(&ctx)
        .await
        .unwrap();
    assert_eq!(result.compressed_messages, messages);
}

// ============================================
// Hybrid
// ============================================

#[tokio::test]
async fn test_hybrid_summarises_oldest_tier() {
    let set = strategy_set(&strategies_config(), Arc::new(healthy_generator("early setup discussion")));
    let messages = plain_conversation(30);
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let strategy = set.get(StrategyKind::Hybrid);
    assert!(strategy.can_compress(&ctx).await);
    let result = strategy.compress(&ctx).await.unwrap();

    let output = &result.compressed_messages;
    assert!(output[0].is_summary);
    // plain filler scores at least 0.5 at position 0, so tier 2 survives whole
    assert_eq!(output.len(), 1 + 10 + 5);
    assert_eq!(&output[output.len() - 5..], &messages[25..]);
    assert_eq!(result.metadata["tier3_method"], "summary");
    assert_eq!(result.metadata["tier3_count"], 15);
    assert_eq!(result.preserved.recent_preserved, 5);
}

#[tokio::test]
async fn test_hybrid_falls_back_to_rolling_window_for_tier3() {
    let set = strategy_set(&strategies_config(), Arc::new(failing_generator()));
    let messages = plain_conversation(30);
    let ctx = CompressionContext::new(messages.clone(), 4096, 10);

    let result = set.get(StrategyKind::Hybrid).compress(&ctx).await.unwrap();

    assert_eq!(result.metadata["tier3_method"], "rolling_window");
    assert!(result.compressed_messages.iter().all(|m| !m.is_summary));
    assert_eq!(
        &result.compressed_messages[result.compressed_messages.len() - 5..],
        &messages[25..]
    );
}

#[tokio::test]
async fn test_hybrid_requires_all_tiers_plus_preserve() {
    let set = strategy_set(&strategies_config(), Arc::new(unhealthy_generator()));
    let strategy = set.get(StrategyKind::Hybrid);

    let exact = CompressionContext::new(plain_conversation(25), 4096, 10);
    assert!(!strategy.can_compress(&exact).await);

    let enough = CompressionContext::new(plain_conversation(26), 4096, 10);
    assert!(strategy.can_compress(&enough).await);
}

#[tokio::test]
async fn test_disabled_strategies_report_unavailable() {
    let strategies = Config::default().compression.strategies;
    let set = strategy_set(&strategies, Arc::new(healthy_generator("unused")));
    let ctx = CompressionContext::new(plain_conversation(40), 4096, 10);

    assert!(set.is_enabled(StrategyKind::RollingWindow));
    assert!(!set.is_enabled(StrategyKind::IntelligentSummary));
    assert!(!set.get(StrategyKind::IntelligentSummary).can_compress(&ctx).await);
    assert!(!set.get(StrategyKind::Hybrid).can_compress(&ctx).await);
}
