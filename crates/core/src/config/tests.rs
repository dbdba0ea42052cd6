use std::io::Write;
use std::time::Duration;

use super::types::{EngineConfig, HardwareConfig, PsysConfig};
use crate::error::CoreError;

const FULL: &str = r#"
[engine]
watchdog_timeout_ms = 500
max_sessions = 4

[[hardware.cells]]
name = "sp0"
type = "scalar"

[[hardware.cells]]
name = "vp0"
type = "vector"

[[hardware.cells]]
name = "vp1"
type = "vector"

[[hardware.channels]]
name = "dma_ext0"
capacity = 30

[[hardware.channels]]
name = "dma_int"
capacity = 8

[[hardware.memory_banks]]
name = "vmem0"
capacity = 64
"#;

#[test]
fn parse_full_toml() {
    let cfg = PsysConfig::from_toml(FULL).unwrap();
    assert_eq!(cfg.engine.watchdog_timeout(), Duration::from_millis(500));
    assert_eq!(cfg.engine.max_sessions, 4);
    assert_eq!(cfg.engine.max_jobs_per_session, 256); // default
    assert_eq!(cfg.hardware.cells.len(), 3);
    assert_eq!(cfg.hardware.cells[1].cell_type, "vector");
    assert_eq!(cfg.hardware.channels[0].capacity, 30);
    assert_eq!(cfg.hardware.memory_banks[0].name, "vmem0");
}

#[test]
fn engine_defaults() {
    let engine = EngineConfig::default();
    assert_eq!(engine.watchdog_timeout_ms, 2000);
    assert_eq!(engine.max_sessions, 64);
    assert_eq!(engine.max_jobs_per_session, 256);
    assert!(engine.validate().is_ok());
}

#[test]
fn missing_cells_rejected() {
    let toml = r#"
[engine]
watchdog_timeout_ms = 100
"#;
    let err = PsysConfig::from_toml(toml).unwrap_err();
    assert!(matches!(err, CoreError::Config(msg) if msg.contains("at least one cell")));
}

#[test]
fn zero_capacity_rejected() {
    let hw = HardwareConfig::default()
        .with_cell("c0", "x")
        .with_channel("dma", 0);
    let err = hw.validate().unwrap_err();
    assert!(err.to_string().contains("zero capacity"));
}

#[test]
fn duplicate_names_rejected() {
    let hw = HardwareConfig::default()
        .with_cell("c0", "x")
        .with_cell("c0", "y");
    assert!(hw.validate().unwrap_err().to_string().contains("duplicate cell name"));

    let hw = HardwareConfig::default()
        .with_cell("c0", "x")
        .with_memory_bank("vmem", 4)
        .with_memory_bank("vmem", 8);
    assert!(hw.validate().unwrap_err().to_string().contains("duplicate name 'vmem'"));
}

#[test]
fn zero_watchdog_rejected() {
    let engine = EngineConfig {
        watchdog_timeout_ms: 0,
        ..EngineConfig::default()
    };
    assert!(engine.validate().is_err());
}

#[test]
fn invalid_toml_is_parse_error() {
    let err = PsysConfig::from_toml("[engine\nwatchdog").unwrap_err();
    assert!(matches!(err, CoreError::ConfigParse(_)));
}

#[test]
fn env_override_applies() {
    std::env::set_var("PSYS_COMPLETION_QUEUE_DEPTH", "7");
    let cfg = PsysConfig::from_toml(FULL).unwrap();
    std::env::remove_var("PSYS_COMPLETION_QUEUE_DEPTH");
    assert_eq!(cfg.engine.completion_queue_depth, 7);
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();
    let cfg = PsysConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.hardware.cells.len(), 3);
}

#[test]
fn missing_file_is_io_error() {
    let err = PsysConfig::from_file("/nonexistent/psys.toml").unwrap_err();
    assert!(matches!(err, CoreError::Io(_)));
}
