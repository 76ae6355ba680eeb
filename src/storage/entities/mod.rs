pub mod compression_cache;
pub mod compression_stats;
pub mod performance_metrics;
