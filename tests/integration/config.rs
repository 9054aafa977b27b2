//! Configuration integration tests

use std::io::Write;

use tinytorch::util::config::{OrderingPolicy, RefCountConfig};
use tinytorch::util::logger::LogLevel;

#[test]
fn test_config_file_then_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(ordering: AcqRel, log_level: Error)").unwrap();

    let mut config = RefCountConfig::from_file(file.path()).unwrap();
    assert_eq!(config.ordering, OrderingPolicy::AcqRel);

    config
        .apply_overrides(|key| (key == "TINYTORCH_ORDERING").then(|| "seq_cst".to_string()))
        .unwrap();
    assert_eq!(config.ordering, OrderingPolicy::SeqCst);
    assert_eq!(config.log_level, LogLevel::Error);
}

#[test]
fn test_config_serializes_to_ron() {
    let config = RefCountConfig {
        ordering: OrderingPolicy::AcqRel,
        trace_lifecycle: true,
        log_level: LogLevel::Debug,
    };
    let text = ron::to_string(&config).unwrap();
    assert_eq!(RefCountConfig::from_ron_str(&text).unwrap(), config);
}
