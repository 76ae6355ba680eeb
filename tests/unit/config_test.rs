use context_compressor::config::{Config, SummaryFailureMode};
use context_compressor::StrategyKind;
use std::io::Write;
use tempfile::TempDir;
use validator::Validate;

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.server_port, 8080);
    assert!(!config.compression.enabled);
    assert_eq!(config.compression.trigger_token_threshold, 3000);
    assert_eq!(config.compression.trigger_message_count, 20);
    assert_eq!(config.compression.preserve_recent_messages, 10);
    assert_eq!(config.compression.strategy, StrategyKind::RollingWindow);
    assert_eq!(config.compression.strategies.rolling_window.window_size, 10);
    assert_eq!(
        config.compression.strategies.intelligent_summary.failure_mode,
        SummaryFailureMode::Fail
    );
    assert_eq!(config.compression.strategies.hybrid.tier1_messages, 5);
    assert_eq!(config.compression.monitoring.metrics_retention_days, 30);
}

#[test]
fn test_load_from_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from(temp_dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.compression.cache_ttl_hours, 24);
    assert_eq!(config.compression.default_max_context_tokens, 4096);
}

#[test]
fn test_load_from_file_overrides_nested_sections() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("compressor.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
server_port = 9090

[compression]
enabled = true
strategy = "hybrid"
preserve_recent_messages = 4

[compression.strategies.intelligent_summary]
enabled = true
failure_mode = "degrade"

[compression.strategies.hybrid]
enabled = true
tier2_messages = 6
"#
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();

    assert_eq!(config.server_port, 9090);
    assert!(config.compression.enabled);
    assert_eq!(config.compression.strategy, StrategyKind::Hybrid);
    assert_eq!(config.compression.preserve_recent_messages, 4);
    assert_eq!(
        config.compression.strategies.intelligent_summary.failure_mode,
        SummaryFailureMode::Degrade
    );
    assert_eq!(config.compression.strategies.hybrid.tier2_messages, 6);
    // untouched keys keep their defaults
    assert_eq!(config.compression.strategies.hybrid.tier1_messages, 5);
    assert_eq!(
        config.compression.strategies.intelligent_summary.summarization_model,
        "llama3.2:1b"
    );
}

#[test]
fn test_load_from_rejects_out_of_range_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(
        &path,
        "[compression.strategies.hybrid]\ntier3_summary_ratio = 2.5\n",
    )
    .unwrap();

    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_config_port_range_validation() {
    let mut config = Config::default();
    config.server_port = 80;
    assert!(config.validate().is_err());

    config.server_port = 65535;
    assert!(config.validate().is_ok());
}
