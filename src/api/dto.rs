use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Message;
use crate::orchestrator::compression_engine::CompressionRequest;
use crate::orchestrator::monitor::{
    AggregateMetrics, CompressionAlert, OptimizationRecommendation, PerformanceSummary,
};
use crate::orchestrator::strategies::StrategyKind;
use crate::orchestrator::CompressionMetadata;

// ==================== REQUEST DTOs ====================

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CompressRequest {
    pub messages: Vec<Message>,
    pub conversation_id: Option<String>,
    pub model_name: Option<String>,
    pub max_context_tokens: Option<usize>,
    #[serde(default)]
    pub force: bool,
    pub strategy: Option<StrategyKind>,
}

impl From<CompressRequest> for CompressionRequest {
    fn from(req: CompressRequest) -> Self {
        CompressionRequest {
            messages: req.messages,
            conversation_id: req.conversation_id,
            model_name: req.model_name,
            max_context_tokens: req.max_context_tokens,
            force: req.force,
            strategy: req.strategy,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct MessagesRequest {
    pub messages: Vec<Message>,
    pub model_name: Option<String>,
    pub max_context_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub conversation_id: Option<String>,
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StrategyParams {
    pub strategy: Option<String>,
    pub hours: Option<i64>,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, ToSchema)]
pub struct CompressResponse {
    pub messages: Vec<Message>,
    #[schema(value_type = Object)]
    pub metadata: CompressionMetadata,
}

#[derive(Debug, Serialize)]
pub struct PerformanceResponse {
    pub summary: PerformanceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyPerformance>,
}

#[derive(Debug, Serialize)]
pub struct StrategyPerformance {
    pub name: String,
    #[serde(flatten)]
    pub metrics: AggregateMetrics,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertsResponse {
    pub period_hours: i64,
    #[schema(value_type = Vec<Object>)]
    pub alerts: Vec<CompressionAlert>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OptimizationsResponse {
    #[schema(value_type = Vec<Object>)]
    pub recommendations: Vec<OptimizationRecommendation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    pub removed_entries: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub generator_url: String,
    pub compression_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}
