use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::MonitoringConfig;
use crate::storage::metrics_store::{MetricsSink, PerformanceRecord};
use crate::storage::{days_ago, hours_ago, StoreError};

const MAX_RECENT_ERRORS: usize = 10;
const FREQUENT_ERROR_KINDS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub total_operations: usize,
    pub avg_duration_ms: f64,
    pub avg_compression_ratio: f64,
    pub avg_quality_score: f64,
    /// Operations that reported a quality score.
    pub quality_samples: usize,
    pub success_rate: f64,
    pub tokens_processed: usize,
    pub tokens_saved: i64,
    pub last_operation: Option<DateTime<Utc>>,
}

impl AggregateMetrics {
    fn from_records<'a>(records: impl IntoIterator<Item = &'a PerformanceRecord>) -> Self {
        let mut metrics = AggregateMetrics::default();
        let mut duration_sum = 0u64;
        let mut successes = 0usize;
        let (mut ratio_sum, mut ratio_n) = (0.0, 0usize);
        let (mut quality_sum, mut quality_n) = (0.0, 0usize);

        for record in records {
            metrics.total_operations += 1;
            duration_sum += record.duration_ms;
            successes += usize::from(record.success);
            if let Some(ratio) = record.compression_ratio {
                ratio_sum += ratio;
                ratio_n += 1;
            }
            if let Some(quality) = record.quality_score {
                quality_sum += quality as f64;
                quality_n += 1;
            }
            metrics.tokens_processed += record.input_tokens;
            let output = record.output_tokens.unwrap_or(record.input_tokens);
            metrics.tokens_saved += record.input_tokens as i64 - output as i64;
            metrics.last_operation = metrics.last_operation.max(Some(record.timestamp));
        }

        if metrics.total_operations > 0 {
            let n = metrics.total_operations as f64;
            metrics.avg_duration_ms = duration_sum as f64 / n;
            metrics.success_rate = successes as f64 / n;
        }
        if ratio_n > 0 {
            metrics.avg_compression_ratio = ratio_sum / ratio_n as f64;
        }
        if quality_n > 0 {
            metrics.avg_quality_score = quality_sum / quality_n as f64;
        }
        metrics.quality_samples = quality_n;
        metrics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyMetrics {
    pub strategy: String,
    #[serde(flatten)]
    pub metrics: AggregateMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub strategy: String,
    pub error_message: String,
    pub count: usize,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub period_hours: i64,
    pub overall: AggregateMetrics,
    /// Busiest strategy first.
    pub by_strategy: Vec<StrategyMetrics>,
    pub recent_errors: Vec<ErrorSummary>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighDuration,
    LowSuccessRate,
    StrategyHighDuration,
    StrategyLowSuccessRate,
    LowQuality,
    FrequentErrors,
    MonitoringError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub strategy: Option<String>,
    pub metric_value: Option<f64>,
    pub threshold: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    StrategyOptimization,
    QualityOptimization,
    ReliabilityOptimization,
    UsageOptimization,
    CachingOptimization,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationRecommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Severity,
    pub title: String,
    pub description: String,
    pub action: String,
    pub strategy: Option<String>,
}

/// Summaries, alerts and tuning hints derived from recorded operations.
pub struct CompressionMonitor {
    metrics: Arc<dyn MetricsSink>,
    config: MonitoringConfig,
}

impl CompressionMonitor {
    pub fn new(metrics: Arc<dyn MetricsSink>, config: MonitoringConfig) -> Self {
        Self { metrics, config }
    }

    pub async fn performance_summary(&self, hours: i64) -> Result<PerformanceSummary, StoreError> {
        let records = self.metrics.operations_since(hours_ago(hours)?).await?;
        Ok(summarize(&records, hours))
    }

    pub async fn strategy_metrics(&self, strategy: &str, hours: i64) -> Result<AggregateMetrics, StoreError> {
        let records = self.metrics.operations_since(hours_ago(hours)?).await?;
        Ok(AggregateMetrics::from_records(
            records.iter().filter(|r| r.strategy == strategy),
        ))
    }

    pub async fn check_performance_alerts(&self, hours: i64) -> Vec<CompressionAlert> {
        match self.performance_summary(hours).await {
            Ok(summary) => alerts_for(&summary, &self.config),
            Err(e) => {
                tracing::error!("Failed to check performance alerts: {}", e);
                vec![CompressionAlert {
                    alert_type: AlertType::MonitoringError,
                    severity: Severity::Medium,
                    message: format!("Failed to check performance alerts: {}", e),
                    strategy: None,
                    metric_value: None,
                    threshold: None,
                    timestamp: Utc::now(),
                }]
            }
        }
    }

    pub async fn optimization_recommendations(&self) -> Vec<OptimizationRecommendation> {
        match self.performance_summary(24).await {
            Ok(summary) => recommendations_for(&summary),
            Err(e) => {
                tracing::error!("Failed to generate optimization recommendations: {}", e);
                vec![OptimizationRecommendation {
                    kind: RecommendationType::Error,
                    priority: Severity::Medium,
                    title: "Failed to generate recommendations".to_string(),
                    description: format!("Error analyzing performance data: {}", e),
                    action: "Check compression monitoring configuration and database connectivity".to_string(),
                    strategy: None,
                }]
            }
        }
    }

    /// Deletes operation records older than `days`; returns how many.
    pub async fn cleanup_old_metrics(&self, days: i64) -> Result<u64, StoreError> {
        let removed = self
            .metrics
            .delete_operations_before(days_ago(days)?)
            .await?;
        if removed > 0 {
            tracing::info!("Cleaned up {} old compression metric records", removed);
        }
        Ok(removed)
    }

    pub fn retention_days(&self) -> i64 {
        self.config.metrics_retention_days
    }
}

pub fn summarize(records: &[PerformanceRecord], hours: i64) -> PerformanceSummary {
    let mut grouped: HashMap<&str, Vec<&PerformanceRecord>> = HashMap::new();
    for record in records {
        grouped.entry(record.strategy.as_str()).or_default().push(record);
    }

    let mut by_strategy: Vec<StrategyMetrics> = grouped
        .into_iter()
        .map(|(strategy, rs)| StrategyMetrics {
            strategy: strategy.to_string(),
            metrics: AggregateMetrics::from_records(rs),
        })
        .collect();
    by_strategy.sort_by(|a, b| {
        b.metrics
            .total_operations
            .cmp(&a.metrics.total_operations)
            .then_with(|| a.strategy.cmp(&b.strategy))
    });

    let mut errors: HashMap<(&str, &str), ErrorSummary> = HashMap::new();
    for record in records.iter().filter(|r| !r.success) {
        let Some(message) = record.error_message.as_deref() else {
            continue;
        };
        errors
            .entry((record.strategy.as_str(), message))
            .and_modify(|e| {
                e.count += 1;
                e.last_seen = e.last_seen.max(record.timestamp);
            })
            .or_insert_with(|| ErrorSummary {
                strategy: record.strategy.clone(),
                error_message: message.to_string(),
                count: 1,
                last_seen: record.timestamp,
            });
    }
    let mut recent_errors: Vec<ErrorSummary> = errors.into_values().collect();
    recent_errors.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    recent_errors.truncate(MAX_RECENT_ERRORS);

    PerformanceSummary {
        period_hours: hours,
        overall: AggregateMetrics::from_records(records),
        by_strategy,
        recent_errors,
        generated_at: Utc::now(),
    }
}

pub fn alerts_for(summary: &PerformanceSummary, config: &MonitoringConfig) -> Vec<CompressionAlert> {
    let mut alerts = Vec::new();
    let now = Utc::now();
    let max_duration = config.max_duration_ms as f64;
    let overall = &summary.overall;

    if overall.total_operations == 0 {
        return alerts;
    }

    if overall.avg_duration_ms > max_duration {
        alerts.push(CompressionAlert {
            alert_type: AlertType::HighDuration,
            severity: Severity::Medium,
            message: format!(
                "Average compression duration ({:.0}ms) exceeds threshold ({}ms)",
                overall.avg_duration_ms, config.max_duration_ms
            ),
            strategy: None,
            metric_value: Some(overall.avg_duration_ms),
            threshold: Some(max_duration),
            timestamp: now,
        });
    }

    if overall.success_rate < config.min_success_rate {
        alerts.push(CompressionAlert {
            alert_type: AlertType::LowSuccessRate,
            severity: if overall.success_rate < 0.5 {
                Severity::Critical
            } else {
                Severity::High
            },
            message: format!(
                "Compression success rate ({:.2}%) below threshold ({:.2}%)",
                overall.success_rate * 100.0,
                config.min_success_rate * 100.0
            ),
            strategy: None,
            metric_value: Some(overall.success_rate),
            threshold: Some(config.min_success_rate),
            timestamp: now,
        });
    }

    if overall.quality_samples > 0 && overall.avg_quality_score < config.min_quality_score {
        alerts.push(CompressionAlert {
            alert_type: AlertType::LowQuality,
            severity: Severity::Medium,
            message: format!(
                "Average compression quality ({:.2}) below threshold ({:.2})",
                overall.avg_quality_score, config.min_quality_score
            ),
            strategy: None,
            metric_value: Some(overall.avg_quality_score),
            threshold: Some(config.min_quality_score),
            timestamp: now,
        });
    }

    for strategy in &summary.by_strategy {
        let m = &strategy.metrics;
        if m.avg_duration_ms > max_duration {
            alerts.push(CompressionAlert {
                alert_type: AlertType::StrategyHighDuration,
                severity: Severity::Low,
                message: format!(
                    "Strategy {} duration ({:.0}ms) exceeds threshold",
                    strategy.strategy, m.avg_duration_ms
                ),
                strategy: Some(strategy.strategy.clone()),
                metric_value: Some(m.avg_duration_ms),
                threshold: Some(max_duration),
                timestamp: now,
            });
        }
        if m.success_rate < config.min_success_rate {
            alerts.push(CompressionAlert {
                alert_type: AlertType::StrategyLowSuccessRate,
                severity: Severity::Medium,
                message: format!(
                    "Strategy {} success rate ({:.2}%) below threshold",
                    strategy.strategy,
                    m.success_rate * 100.0
                ),
                strategy: Some(strategy.strategy.clone()),
                metric_value: Some(m.success_rate),
                threshold: Some(config.min_success_rate),
                timestamp: now,
            });
        }
    }

    if summary.recent_errors.len() >= FREQUENT_ERROR_KINDS {
        alerts.push(CompressionAlert {
            alert_type: AlertType::FrequentErrors,
            severity: Severity::High,
            message: format!(
                "High error frequency: {} different error types in last {}h",
                summary.recent_errors.len(),
                summary.period_hours
            ),
            strategy: None,
            metric_value: Some(summary.recent_errors.len() as f64),
            threshold: Some(FREQUENT_ERROR_KINDS as f64),
            timestamp: now,
        });
    }

    alerts
}

pub fn recommendations_for(summary: &PerformanceSummary) -> Vec<OptimizationRecommendation> {
    let mut recommendations = Vec::new();

    for strategy in &summary.by_strategy {
        let name = strategy.strategy.as_str();
        let m = &strategy.metrics;

        if m.avg_duration_ms > 2000.0 {
            recommendations.push(OptimizationRecommendation {
                kind: RecommendationType::StrategyOptimization,
                priority: Severity::Medium,
                title: format!("Optimize {} performance", name),
                description: format!(
                    "Strategy {} has high average duration ({:.0}ms). Consider using rolling_window for better performance.",
                    name, m.avg_duration_ms
                ),
                action: format!("Switch to rolling_window strategy or optimize {} configuration", name),
                strategy: Some(name.to_string()),
            });
        }

        if m.quality_samples > 0 && m.avg_quality_score < 0.5 {
            recommendations.push(OptimizationRecommendation {
                kind: RecommendationType::QualityOptimization,
                priority: Severity::Low,
                title: format!("Improve {} quality", name),
                description: format!(
                    "Strategy {} has low average quality score ({:.2}). Consider adjusting configuration parameters.",
                    name, m.avg_quality_score
                ),
                action: format!(
                    "Tune {} parameters like importance_threshold or preserve_recent_messages",
                    name
                ),
                strategy: Some(name.to_string()),
            });
        }

        if m.success_rate < 0.7 {
            recommendations.push(OptimizationRecommendation {
                kind: RecommendationType::ReliabilityOptimization,
                priority: Severity::High,
                title: format!("Address {} reliability issues", name),
                description: format!(
                    "Strategy {} has low success rate ({:.2}%). Check configuration and dependencies.",
                    name,
                    m.success_rate * 100.0
                ),
                action: format!(
                    "Review {} configuration, check generator backend availability, or temporarily disable strategy",
                    name
                ),
                strategy: Some(name.to_string()),
            });
        }
    }

    let total = summary.overall.total_operations;
    if total == 0 {
        recommendations.push(OptimizationRecommendation {
            kind: RecommendationType::UsageOptimization,
            priority: Severity::Low,
            title: "Enable compression for better context management".to_string(),
            description: "No compression operations detected. Enabling compression can help manage long conversations more efficiently.".to_string(),
            action: "Review compression configuration and ensure it's enabled with appropriate triggers".to_string(),
            strategy: None,
        });
    } else if total > 100 {
        recommendations.push(OptimizationRecommendation {
            kind: RecommendationType::CachingOptimization,
            priority: Severity::Low,
            title: "Consider optimizing compression caching".to_string(),
            description: format!(
                "High compression volume ({} operations). Ensure caching is enabled to reduce redundant compression.",
                total
            ),
            action: "Verify compression caching is enabled and tune cache TTL settings".to_string(),
            strategy: None,
        });
    }

    recommendations
}
