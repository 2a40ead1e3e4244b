use std::time::Duration;

use huginn::{HuginnError, Result};

#[test]
fn test_error_display() {
    let err = HuginnError::EmbeddingGeneration("tensor shape".to_string());
    assert!(err.to_string().contains("tensor shape"));
}

#[test]
fn test_not_implemented() {
    let err = HuginnError::NotImplemented("initialize");
    assert!(err.to_string().contains("not implemented"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HuginnError::NoStrategies)
    }
    assert!(returns_error().is_err());
}

#[test]
fn timeout_display_names_the_limit() {
    let err = HuginnError::Timeout(Duration::from_secs(2));
    assert_eq!(err.to_string(), "engine call timed out after 2s");
}

#[test]
fn json_errors_convert() {
    let err: HuginnError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(matches!(err, HuginnError::Json(_)));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(HuginnError::EngineUnavailable("restarting".into()).is_transient());
    assert!(HuginnError::ResourceExhausted("out of memory".into()).is_transient());
    assert!(HuginnError::Timeout(Duration::from_secs(1)).is_transient());
}

#[test]
fn permanent_errors() {
    assert!(!HuginnError::EngineNotReady.is_transient());
    assert!(!HuginnError::EmbeddingGeneration("bad input".into()).is_transient());
    assert!(!HuginnError::ModelInitialization("missing file".into()).is_transient());
    assert!(!HuginnError::NoStrategies.is_transient());
    assert!(!HuginnError::Configuration("bad".into()).is_transient());
}
