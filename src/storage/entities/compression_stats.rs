use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversation_compression_stats")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub conversation_id: String,
    pub compression_timestamp: String,
    pub original_token_count: i64,
    pub compressed_token_count: i64,
    pub compression_ratio: f64,
    pub compression_strategy: String,
    pub compression_time_ms: i64,
    pub quality_score: f64,
    pub messages_compressed: i64,
    pub messages_preserved: i64,
    pub triggered_by: Option<String>,
    pub effectiveness_score: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
