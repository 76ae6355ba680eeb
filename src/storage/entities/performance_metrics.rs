use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "compression_performance_metrics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub timestamp: String,
    pub compression_strategy: String,
    pub operation_type: String,
    pub duration_ms: i64,
    pub input_token_count: i64,
    pub output_token_count: Option<i64>,
    pub compression_ratio: Option<f64>,
    pub quality_score: Option<f64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub model_name: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
