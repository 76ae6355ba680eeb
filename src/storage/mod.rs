pub mod cache_store;
pub mod db;
pub mod entities;
pub mod metrics_store;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub use cache_store::{CacheEntry, CompressionCache, NewCacheEntry, SeaOrmCompressionCache};
pub use db::init_db;
pub use entities::{compression_cache, compression_stats, performance_metrics};
pub use metrics_store::{
    CompressionStatRecord, CompressionStats, MetricsSink, OperationType, PerformanceRecord,
    SeaOrmMetricsStore,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
    #[error("Invalid time window: {0}")]
    InvalidWindow(String),
}

/// Start of a look-back window of `hours`, or `InvalidWindow` when it does
/// not fit in a timestamp.
pub fn hours_ago(hours: i64) -> Result<DateTime<Utc>, StoreError> {
    Duration::try_hours(hours)
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .ok_or_else(|| StoreError::InvalidWindow(format!("{} hours", hours)))
}

pub fn days_ago(days: i64) -> Result<DateTime<Utc>, StoreError> {
    Duration::try_days(days)
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .ok_or_else(|| StoreError::InvalidWindow(format!("{} days", days)))
}

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that text
/// comparison orders them chronologically.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("bad timestamp {:?}: {}", raw, e)))
}
