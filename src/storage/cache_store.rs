use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde_json::{Map, Value};

use super::entities::compression_cache;
use super::{format_timestamp, parse_timestamp, StoreError};
use crate::models::Message;
use crate::orchestrator::quality::PreservedInfo;
use crate::orchestrator::strategies::StrategyKind;

/// A stored compression result, addressable by the hash of its input.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub id: i64,
    pub context_hash: String,
    pub conversation_id: Option<String>,
    pub compressed_messages: Vec<Message>,
    pub original_token_count: usize,
    pub compressed_token_count: usize,
    pub strategy: StrategyKind,
    pub quality_score: f32,
    pub preserved: PreservedInfo,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
}

#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub context_hash: String,
    pub conversation_id: Option<String>,
    pub compressed_messages: Vec<Message>,
    pub original_token_count: usize,
    pub compressed_token_count: usize,
    pub strategy: StrategyKind,
    pub quality_score: f32,
    pub preserved: PreservedInfo,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait CompressionCache: Send + Sync {
    /// Live entry for `hash`, if any.
    async fn get(&self, hash: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Stores `entry` until `ttl` from now. A later put for the same hash wins.
    async fn put(&self, entry: NewCacheEntry, ttl: Duration) -> Result<(), StoreError>;

    async fn increment_access(&self, hash: &str) -> Result<(), StoreError>;

    /// Removes entries expired at `now`; returns how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub struct SeaOrmCompressionCache {
    db: DatabaseConnection,
}

impl SeaOrmCompressionCache {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_entry(model: compression_cache::Model) -> Result<CacheEntry, StoreError> {
        let strategy = model
            .compression_strategy
            .parse::<StrategyKind>()
            .map_err(StoreError::CorruptRow)?;
        let mut metadata: Map<String, Value> = serde_json::from_str(&model.metadata)?;
        let preserved = metadata
            .remove("preserved")
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        Ok(CacheEntry {
            id: model.id,
            context_hash: model.context_hash,
            conversation_id: model.conversation_id,
            compressed_messages: serde_json::from_str(&model.compressed_context)?,
            original_token_count: model.original_token_count.max(0) as usize,
            compressed_token_count: model.compressed_token_count.max(0) as usize,
            strategy,
            quality_score: model.quality_score as f32,
            preserved,
            metadata,
            created_at: parse_timestamp(&model.created_at)?,
            expires_at: parse_timestamp(&model.expires_at)?,
            access_count: model.access_count.max(0) as u64,
        })
    }
}

#[async_trait]
impl CompressionCache for SeaOrmCompressionCache {
    async fn get(&self, hash: &str) -> Result<Option<CacheEntry>, StoreError> {
        let now = format_timestamp(Utc::now());

        let model = compression_cache::Entity::find()
            .filter(compression_cache::Column::ContextHash.eq(hash))
            .filter(compression_cache::Column::ExpiresAt.gt(now))
            .order_by_desc(compression_cache::Column::Id)
            .one(&self.db)
            .await?;

        model.map(Self::to_entry).transpose()
    }

    async fn put(&self, entry: NewCacheEntry, ttl: Duration) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut metadata = entry.metadata;
        metadata.insert("preserved".to_string(), serde_json::to_value(entry.preserved)?);

        let model = compression_cache::ActiveModel {
            id: NotSet,
            context_hash: Set(entry.context_hash),
            conversation_id: Set(entry.conversation_id),
            compressed_context: Set(serde_json::to_string(&entry.compressed_messages)?),
            original_token_count: Set(entry.original_token_count as i64),
            compressed_token_count: Set(entry.compressed_token_count as i64),
            compression_strategy: Set(entry.strategy.as_str().to_string()),
            quality_score: Set(entry.quality_score as f64),
            metadata: Set(serde_json::to_string(&metadata)?),
            created_at: Set(format_timestamp(now)),
            expires_at: Set(format_timestamp(now + ttl)),
            access_count: Set(0),
            last_accessed: Set(format_timestamp(now)),
        };

        compression_cache::Entity::insert(model)
            .on_conflict(
                OnConflict::column(compression_cache::Column::ContextHash)
                    .update_columns([
                        compression_cache::Column::ConversationId,
                        compression_cache::Column::CompressedContext,
                        compression_cache::Column::OriginalTokenCount,
                        compression_cache::Column::CompressedTokenCount,
                        compression_cache::Column::CompressionStrategy,
                        compression_cache::Column::QualityScore,
                        compression_cache::Column::Metadata,
                        compression_cache::Column::CreatedAt,
                        compression_cache::Column::ExpiresAt,
                        compression_cache::Column::AccessCount,
                        compression_cache::Column::LastAccessed,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn increment_access(&self, hash: &str) -> Result<(), StoreError> {
        compression_cache::Entity::update_many()
            .col_expr(
                compression_cache::Column::AccessCount,
                Expr::col(compression_cache::Column::AccessCount).add(1),
            )
            .col_expr(
                compression_cache::Column::LastAccessed,
                Expr::value(format_timestamp(Utc::now())),
            )
            .filter(compression_cache::Column::ContextHash.eq(hash))
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = compression_cache::Entity::delete_many()
            .filter(compression_cache::Column::ExpiresAt.lte(format_timestamp(now)))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
