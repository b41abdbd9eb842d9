//! Loading configuration files from disk

use a1pms::{LogLevel, PmsConfig, PmsError};
use a1pms_core_registry::A1Dialect;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[supervision]
node_interval_s = 20

[southbound]
probe_dialects = ["OSC_V1"]

[logging]
level = "warn"

[[nodes]]
id = "ric1"
base_url = "http://ric1:8085"
managed_element_ids = ["kista_1", "kista_2"]
"#
    )
    .unwrap();

    let config = PmsConfig::load(file.path()).unwrap();
    assert_eq!(config.supervision.node_interval_s, 20);
    assert_eq!(config.supervision.service_interval_s, 10);
    assert_eq!(config.southbound.probe_dialects, vec![A1Dialect::OscV1]);
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert_eq!(config.nodes[0].managed_element_ids.len(), 2);
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PmsConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, PmsError::Config(_)));
    assert_eq!(err.status_code(), 500);
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[[nodes]]\nid = 3").unwrap();
    assert!(matches!(
        PmsConfig::load(file.path()),
        Err(PmsError::Config(_))
    ));
}
