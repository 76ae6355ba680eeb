use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entities::{compression_stats, performance_metrics};
use super::{days_ago, format_timestamp, parse_timestamp, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Compression,
    CacheHit,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Compression => "compression",
            OperationType::CacheHit => "cache_hit",
        }
    }

    fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "compression" => Ok(OperationType::Compression),
            "cache_hit" => Ok(OperationType::CacheHit),
            other => Err(StoreError::CorruptRow(format!("unknown operation type {:?}", other))),
        }
    }
}

/// One attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub operation_type: OperationType,
    pub duration_ms: u64,
    pub input_tokens: usize,
    pub output_tokens: Option<usize>,
    pub compression_ratio: Option<f64>,
    pub quality_score: Option<f32>,
    pub success: bool,
    pub error_message: Option<String>,
    pub model_name: Option<String>,
}

/// One successful compression of a known conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionStatRecord {
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub compression_ratio: f64,
    pub strategy: String,
    pub compression_time_ms: u64,
    pub quality_score: f32,
    pub messages_compressed: usize,
    pub messages_preserved: usize,
    pub triggered_by: Option<String>,
}

impl CompressionStatRecord {
    /// Quality scaled by the compression ratio.
    pub fn effectiveness(&self) -> f64 {
        self.quality_score as f64 * self.compression_ratio
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    pub conversation_id: Option<String>,
    pub period_days: i64,
    pub total_compressions: usize,
    pub average_compression_ratio: f64,
    pub average_compression_time_ms: f64,
    pub average_quality_score: f64,
    pub average_effectiveness: f64,
    pub total_tokens_saved: i64,
    pub strategy_usage: BTreeMap<String, usize>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_operation(&self, record: PerformanceRecord) -> Result<(), StoreError>;

    async fn record_compression(&self, record: CompressionStatRecord) -> Result<(), StoreError>;

    async fn last_compressed_at(&self, conversation_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn operations_since(&self, since: DateTime<Utc>) -> Result<Vec<PerformanceRecord>, StoreError>;

    async fn compression_stats(
        &self,
        conversation_id: Option<String>,
        days: i64,
    ) -> Result<CompressionStats, StoreError>;

    /// Deletes operation records older than `cutoff`; returns how many.
    async fn delete_operations_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub struct SeaOrmMetricsStore {
    db: DatabaseConnection,
}

impl SeaOrmMetricsStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_record(model: performance_metrics::Model) -> Result<PerformanceRecord, StoreError> {
        Ok(PerformanceRecord {
            timestamp: parse_timestamp(&model.timestamp)?,
            strategy: model.compression_strategy,
            operation_type: OperationType::parse(&model.operation_type)?,
            duration_ms: model.duration_ms.max(0) as u64,
            input_tokens: model.input_token_count.max(0) as usize,
            output_tokens: model.output_token_count.map(|t| t.max(0) as usize),
            compression_ratio: model.compression_ratio,
            quality_score: model.quality_score.map(|q| q as f32),
            success: model.success,
            error_message: model.error_message,
            model_name: model.model_name,
        })
    }
}

#[async_trait]
impl MetricsSink for SeaOrmMetricsStore {
    async fn record_operation(&self, record: PerformanceRecord) -> Result<(), StoreError> {
        let model = performance_metrics::ActiveModel {
            id: NotSet,
            timestamp: Set(format_timestamp(record.timestamp)),
            compression_strategy: Set(record.strategy),
            operation_type: Set(record.operation_type.as_str().to_string()),
            duration_ms: Set(record.duration_ms as i64),
            input_token_count: Set(record.input_tokens as i64),
            output_token_count: Set(record.output_tokens.map(|t| t as i64)),
            compression_ratio: Set(record.compression_ratio),
            quality_score: Set(record.quality_score.map(f64::from)),
            success: Set(record.success),
            error_message: Set(record.error_message),
            model_name: Set(record.model_name),
        };

        performance_metrics::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    async fn record_compression(&self, record: CompressionStatRecord) -> Result<(), StoreError> {
        let effectiveness = record.effectiveness();
        let model = compression_stats::ActiveModel {
            id: NotSet,
            conversation_id: Set(record.conversation_id),
            compression_timestamp: Set(format_timestamp(record.timestamp)),
            original_token_count: Set(record.original_tokens as i64),
            compressed_token_count: Set(record.compressed_tokens as i64),
            compression_ratio: Set(record.compression_ratio),
            compression_strategy: Set(record.strategy),
            compression_time_ms: Set(record.compression_time_ms as i64),
            quality_score: Set(record.quality_score as f64),
            messages_compressed: Set(record.messages_compressed as i64),
            messages_preserved: Set(record.messages_preserved as i64),
            triggered_by: Set(record.triggered_by),
            effectiveness_score: Set(effectiveness),
        };

        compression_stats::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    async fn last_compressed_at(&self, conversation_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let latest = compression_stats::Entity::find()
            .filter(compression_stats::Column::ConversationId.eq(conversation_id))
            .order_by_desc(compression_stats::Column::CompressionTimestamp)
            .one(&self.db)
            .await?;

        latest
            .map(|row| parse_timestamp(&row.compression_timestamp))
            .transpose()
    }

    async fn operations_since(&self, since: DateTime<Utc>) -> Result<Vec<PerformanceRecord>, StoreError> {
        performance_metrics::Entity::find()
            .filter(performance_metrics::Column::Timestamp.gte(format_timestamp(since)))
            .order_by_asc(performance_metrics::Column::Timestamp)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Self::to_record)
            .collect()
    }

    async fn compression_stats(
        &self,
        conversation_id: Option<String>,
        days: i64,
    ) -> Result<CompressionStats, StoreError> {
        let since = format_timestamp(days_ago(days)?);
        let mut query = compression_stats::Entity::find()
            .filter(compression_stats::Column::CompressionTimestamp.gte(since));
        if let Some(id) = &conversation_id {
            query = query.filter(compression_stats::Column::ConversationId.eq(id.as_str()));
        }
        let rows = query.all(&self.db).await?;

        let mut stats = CompressionStats {
            conversation_id,
            period_days: days,
            total_compressions: rows.len(),
            ..Default::default()
        };
        if rows.is_empty() {
            return Ok(stats);
        }

        let n = rows.len() as f64;
        for row in &rows {
            stats.average_compression_ratio += row.compression_ratio / n;
            stats.average_compression_time_ms += row.compression_time_ms as f64 / n;
            stats.average_quality_score += row.quality_score / n;
            stats.average_effectiveness += row.effectiveness_score / n;
            stats.total_tokens_saved += row.original_token_count - row.compressed_token_count;
            *stats
                .strategy_usage
                .entry(row.compression_strategy.clone())
                .or_default() += 1;
        }

        Ok(stats)
    }

    async fn delete_operations_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = performance_metrics::Entity::delete_many()
            .filter(performance_metrics::Column::Timestamp.lt(format_timestamp(cutoff)))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
