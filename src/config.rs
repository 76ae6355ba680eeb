use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::orchestrator::strategies::StrategyKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
    #[error("Configuration validation failed: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Main configuration for the compression service
#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct Config {
    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// Ollama base URL
    pub ollama_url: String,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,

    /// Upper bound on a single generator call
    #[validate(range(min = 1, max = 600))]
    pub generation_timeout_secs: u64,

    /// Period of the expired-cache sweep
    #[validate(range(min = 1))]
    pub cache_cleanup_interval_secs: u64,

    pub cors_enabled: bool,

    #[validate(nested)]
    pub compression: CompressionConfig,
}

#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct CompressionConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub trigger_token_threshold: usize,
    #[validate(range(min = 1))]
    pub trigger_message_count: usize,
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub trigger_utilization_percent: f64,
    /// Preferred strategy, tried before the fixed fallback order
    pub strategy: StrategyKind,
    pub preserve_recent_messages: usize,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub compression_ratio_target: f32,
    #[validate(range(min = 1))]
    pub default_max_context_tokens: usize,
    pub cache_enabled: bool,
    #[validate(range(min = 1, max = 8760))]
    pub cache_ttl_hours: i64,
    #[validate(range(min = 0, max = 10080))]
    pub recent_compression_window_minutes: i64,
    /// Model token estimates are tuned for when a request names none
    #[serde(default)]
    pub default_model: Option<String>,
    #[validate(nested)]
    pub strategies: StrategiesConfig,
    #[validate(nested)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct StrategiesConfig {
    #[validate(nested)]
    pub rolling_window: RollingWindowConfig,
    #[validate(nested)]
    pub intelligent_summary: IntelligentSummaryConfig,
    #[validate(nested)]
    pub hybrid: HybridConfig,
}

#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct RollingWindowConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub window_size: usize,
    #[validate(range(min = 0.0, max = 1.0))]
    pub importance_threshold: f32,
}

/// What the summary strategy does when the generator fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryFailureMode {
    /// Propagate the error; the engine reports a failed compression.
    #[default]
    Fail,
    /// Emit a placeholder summary and report critical loss.
    Degrade,
}

#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct IntelligentSummaryConfig {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub summarization_model: String,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub summary_length_ratio: f32,
    pub failure_mode: SummaryFailureMode,
}

#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct HybridConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub tier1_messages: usize,
    #[validate(range(min = 1))]
    pub tier2_messages: usize,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub tier3_summary_ratio: f32,
}

#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct MonitoringConfig {
    #[validate(range(min = 1))]
    pub max_duration_ms: u64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_success_rate: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_quality_score: f64,
    #[validate(range(min = 1, max = 3650))]
    pub metrics_retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            database_url: "sqlite://context-compressor.db".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            log_level: "info".to_string(),
            generation_timeout_secs: 30,
            cache_cleanup_interval_secs: 3600,
            cors_enabled: true,
            compression: CompressionConfig::default(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_token_threshold: 3000,
            trigger_message_count: 20,
            trigger_utilization_percent: 80.0,
            strategy: StrategyKind::RollingWindow,
            preserve_recent_messages: 10,
            compression_ratio_target: 0.3,
            default_max_context_tokens: 4096,
            cache_enabled: true,
            cache_ttl_hours: 24,
            recent_compression_window_minutes: 60,
            default_model: None,
            strategies: StrategiesConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            rolling_window: RollingWindowConfig {
                enabled: true,
                window_size: 10,
                importance_threshold: 0.3,
            },
            intelligent_summary: IntelligentSummaryConfig {
                enabled: false,
                summarization_model: "llama3.2:1b".to_string(),
                summary_length_ratio: 0.2,
                failure_mode: SummaryFailureMode::Fail,
            },
            hybrid: HybridConfig {
                enabled: false,
                tier1_messages: 5,
                tier2_messages: 10,
                tier3_summary_ratio: 0.15,
            },
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 5000,
            min_success_rate: 0.85,
            min_quality_score: 0.3,
            metrics_retention_days: 30,
        }
    }
}

impl Config {
    /// Loads defaults, then `~/.context-compressor/config` (if present), then
    /// `CTXC__*` environment overrides.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let home = dirs::home_dir()
            .map(|h| h.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        Self::load_from(&format!("{}/.context-compressor/config", home))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref().display().to_string();
        let settings = config::Config::builder()
            // Core defaults
            .set_default("server_port", 8080)?
            .set_default("database_url", "sqlite://context-compressor.db")?
            .set_default("ollama_url", "http://localhost:11434")?
            .set_default("log_level", "info")?
            .set_default("generation_timeout_secs", 30)?
            .set_default("cache_cleanup_interval_secs", 3600)?
            .set_default("cors_enabled", true)?
            // Compression defaults
            .set_default("compression.enabled", false)?
            .set_default("compression.trigger_token_threshold", 3000)?
            .set_default("compression.trigger_message_count", 20)?
            .set_default("compression.trigger_utilization_percent", 80.0)?
            .set_default("compression.strategy", "rolling_window")?
            .set_default("compression.preserve_recent_messages", 10)?
            .set_default("compression.compression_ratio_target", 0.3)?
            .set_default("compression.default_max_context_tokens", 4096)?
            .set_default("compression.cache_enabled", true)?
            .set_default("compression.cache_ttl_hours", 24)?
            .set_default("compression.recent_compression_window_minutes", 60)?
            .set_default("compression.strategies.rolling_window.enabled", true)?
            .set_default("compression.strategies.rolling_window.window_size", 10)?
            .set_default("compression.strategies.rolling_window.importance_threshold", 0.3)?
            .set_default("compression.strategies.intelligent_summary.enabled", false)?
            .set_default(
                "compression.strategies.intelligent_summary.summarization_model",
                "llama3.2:1b",
            )?
            .set_default("compression.strategies.intelligent_summary.summary_length_ratio", 0.2)?
            .set_default("compression.strategies.intelligent_summary.failure_mode", "fail")?
            .set_default("compression.strategies.hybrid.enabled", false)?
            .set_default("compression.strategies.hybrid.tier1_messages", 5)?
            .set_default("compression.strategies.hybrid.tier2_messages", 10)?
            .set_default("compression.strategies.hybrid.tier3_summary_ratio", 0.15)?
            .set_default("compression.monitoring.max_duration_ms", 5000)?
            .set_default("compression.monitoring.min_success_rate", 0.85)?
            .set_default("compression.monitoring.min_quality_score", 0.3)?
            .set_default("compression.monitoring.metrics_retention_days", 30)?
            .add_source(config::File::with_name(&path).required(false))
            // Environment overrides: CTXC__SERVER_PORT, CTXC__COMPRESSION__ENABLED, etc.
            .add_source(
                config::Environment::with_prefix("CTXC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }
}
