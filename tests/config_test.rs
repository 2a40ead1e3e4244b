//! Tests for loading configuration files.

use std::io::Write;
use std::time::Duration;

use huginn::{Aggressiveness, Config, HuginnError};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_explicit_path() {
    let file = write_config(
        r#"
[cache]
max_entries = 250
ttl_ms = 60000
enable_content_validation = false

[batch]
initial_batch_size = 8
min_batch_size = 2
max_batch_size = 64
aggressiveness = "conservative"

[memory]
parallelism = 2

[memory.thresholds]
critical = 95.0
high = 80.0
normal = 65.0
low = 45.0

[features]
batch = false
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache.max_entries, 250);
    assert_eq!(config.cache.ttl, Duration::from_secs(60));
    assert!(!config.cache.enable_content_validation);
    assert_eq!(config.batch.initial_batch_size, 8);
    assert_eq!(config.batch.min_batch_size, 2);
    assert_eq!(config.batch.max_batch_size, 64);
    assert_eq!(config.batch.aggressiveness, Aggressiveness::Conservative);
    assert_eq!(config.memory.parallelism, 2);
    assert_eq!(config.memory.thresholds.critical, 95.0);
    assert_eq!(config.memory.thresholds.low, 45.0);
    assert!(!config.features.batch);
    assert!(config.features.cache);
}

#[test]
fn partial_sections_keep_defaults() {
    let file = write_config("[cache]\nmax_entries = 3\n");
    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache.max_entries, 3);
    assert_eq!(config.batch.initial_batch_size, 32);
    assert_eq!(config.memory.thresholds.high, 75.0);
}

#[test]
fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
    assert!(err.to_string().contains("not found"));
}

#[test]
fn invalid_file_is_an_error() {
    let file = write_config("[batch]\ninitial_batch_size = \"many\"\n");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
    assert!(err.to_string().contains("Failed to parse"));
}

#[test]
fn load_from_reads_one_file() {
    let file = write_config("[memory]\nmonitoring_interval_ms = 250\n");
    let config = Config::load_from(file.path()).unwrap();
    assert_eq!(config.memory.monitoring_interval, Duration::from_millis(250));
}

#[test]
fn directory_is_not_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(dir.path())).unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
}
