use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "compression_cache")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub context_hash: String,
    pub conversation_id: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub compressed_context: String,
    pub original_token_count: i64,
    pub compressed_token_count: i64,
    pub compression_strategy: String,
    pub quality_score: f64,
    #[sea_orm(column_type = "Text")]
    pub metadata: String,
    pub created_at: String,
    pub expires_at: String,
    pub access_count: i64,
    pub last_accessed: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
