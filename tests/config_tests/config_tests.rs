//! Config Tests
//!
//! Tests for defaults, the builder and JSON config files.

use std::time::Duration;

use tempfile::TempDir;

use iqrf_dpa::config::{Config, TimeUnlimitedTable};
use iqrf_dpa::protocol::DeviceInterface;
use iqrf_dpa::timing::{FrcResponseTime, NetworkTiming, RfMode, TrSeries};
use iqrf_dpa::DpaError;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_config(content: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dpa.json");
    std::fs::write(&path, content).unwrap();
    (temp_dir, path)
}

// =============================================================================
// Default / Builder Tests
// =============================================================================

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.time_to_wait_for_confirmation(), Duration::from_millis(2000));
    assert_eq!(config.base_time_to_wait_for_response(), Duration::from_millis(2000));
    assert_eq!(config.state_change_timeout(), Duration::from_millis(1000));
    assert_eq!(config.max_request_duration(), Duration::from_millis(10_000));
    assert_eq!(config.default_timing.rf_mode, RfMode::Lp);
    assert_eq!(config.default_timing.tr_series, TrSeries::Unknown);
    assert!(config.networks.is_empty());
}

#[test]
fn test_default_time_unlimited_table() {
    let table = TimeUnlimitedTable::default();

    assert_eq!(table.len(), 3);
    assert!(table.contains(DeviceInterface::Coordinator, "run_discovery"));
    assert!(table.contains(DeviceInterface::Coordinator, "bond_node"));
    assert!(table.contains(DeviceInterface::Frc, "send"));
    assert!(!table.contains(DeviceInterface::Frc, "send_selective"));
    assert!(TimeUnlimitedTable::empty().is_empty());
}

#[test]
fn test_builder() {
    let office = NetworkTiming { rf_mode: RfMode::Std, bonded_nodes: 4, ..NetworkTiming::default() };
    let config = Config::builder()
        .time_to_wait_for_confirmation_ms(500)
        .base_time_to_wait_for_response_ms(1500)
        .state_change_timeout_ms(200)
        .max_request_duration_ms(3000)
        .network("office", office)
        .time_unlimited(TimeUnlimitedTable::empty())
        .build();

    assert_eq!(config.time_to_wait_for_confirmation_ms, 500);
    assert_eq!(config.base_time_to_wait_for_response_ms, 1500);
    assert_eq!(config.state_change_timeout_ms, 200);
    assert_eq!(config.max_request_duration_ms, 3000);
    assert_eq!(config.networks.get("office"), Some(&office));
    assert!(config.time_unlimited.is_empty());
}

// =============================================================================
// File Loading Tests
// =============================================================================

#[test]
fn test_from_file_partial() {
    let (_dir, path) = write_config(
        r#"{
            "time_to_wait_for_confirmation_ms": 800,
            "networks": {
                "garden": { "rf_mode": "std", "tr_series": "tr72x", "frc_response_time": "Ms640" }
            }
        }"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.time_to_wait_for_confirmation_ms, 800);
    assert_eq!(config.base_time_to_wait_for_response_ms, 2000);

    let garden = config.networks["garden"];
    assert_eq!(garden.rf_mode, RfMode::Std);
    assert_eq!(garden.tr_series, TrSeries::Tr72x);
    assert_eq!(garden.frc_response_time, FrcResponseTime::Ms640);
    assert_eq!(garden.bonded_nodes, 0);
    assert_eq!(config.time_unlimited, TimeUnlimitedTable::default());
}

#[test]
fn test_from_file_time_unlimited() {
    let (_dir, path) = write_config(r#"{ "time_unlimited": [["os", "restart"]] }"#);

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.time_unlimited.len(), 1);
    assert!(config.time_unlimited.contains(DeviceInterface::Os, "restart"));
}

#[test]
fn test_json_roundtrip() {
    let config = Config::builder()
        .max_request_duration_ms(1234)
        .network("lab", NetworkTiming::default())
        .build();
    let json = serde_json::to_string(&config).unwrap();
    let (_dir, path) = write_config(&json);

    assert_eq!(Config::from_file(&path).unwrap(), config);
}

#[test]
fn test_from_file_invalid_json() {
    let (_dir, path) = write_config("{ not json");
    assert!(matches!(Config::from_file(&path), Err(DpaError::Config(_))));
}

#[test]
fn test_from_file_missing() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.json");
    assert!(matches!(Config::from_file(&path), Err(DpaError::Io(_))));
}
