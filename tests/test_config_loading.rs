use media_stream::{StreamConfig, StreamError};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_sample_config() {
    let config = StreamConfig::from_file("config/media_stream.yaml");
    assert!(config.is_ok(), "Failed to load sample config: {:?}", config.err());

    let config = config.unwrap();
    assert_eq!(config.listen_address, "0.0.0.0:8080");
    assert_eq!(config.primary_shard, 2);
    assert_eq!(config.hash_length, 6);
    assert_eq!(config.cache_clear_interval(), Duration::from_secs(1800));
    assert_eq!(config.max_auth_attempts, 6);
    assert_eq!(config.max_chunk_size, 1_048_576);
    assert!(!config.metrics_endpoint.unwrap().enabled);
}

#[test]
fn test_load_minimal_config() {
    let file = write_config("hash_length: 8\n");

    let config = StreamConfig::from_file(file.path()).unwrap();
    assert_eq!(config.hash_length, 8);
    // Everything else falls back to defaults
    assert_eq!(config.gateway_url, "http://127.0.0.1:8081");
    assert_eq!(config.max_chunk_retries, 3);
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert!(config.metrics_endpoint.is_none());
}

#[test]
fn test_load_empty_mapping() {
    let file = write_config("{}\n");
    assert_eq!(StreamConfig::from_file(file.path()).unwrap(), StreamConfig::default());
}

#[test]
fn test_load_invalid_values() {
    for yaml in [
        "hash_length: 0\n",
        "hash_length: 64\n",
        "max_chunk_size: 1024\n",
        "max_chunk_size: 300000\n",
        "max_chunk_size: 2097152\n",
        "cache_clear_interval_secs: 0\n",
        "max_auth_attempts: 0\n",
        "request_timeout_secs: 0\n",
        "listen_address: \"\"\n",
    ] {
        let file = write_config(yaml);
        let result = StreamConfig::from_file(file.path());
        assert!(
            matches!(result, Err(StreamError::ConfigError(_))),
            "should reject {}",
            yaml.trim()
        );
    }
}

#[test]
fn test_load_malformed_yaml() {
    let file = write_config("hash_length: [not, a, number\n");
    let err = StreamConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse"), "{}", err);
}

#[test]
fn test_load_nonexistent_file() {
    let err = StreamConfig::from_file("does/not/exist.yaml").unwrap_err();
    assert!(matches!(err, StreamError::ConfigError(_)));
}

#[test]
fn test_metrics_endpoint_section() {
    let file = write_config("metrics_endpoint:\n  enabled: true\n");

    let endpoint = StreamConfig::from_file(file.path())
        .unwrap()
        .metrics_endpoint
        .unwrap();
    assert!(endpoint.enabled);
    assert_eq!(endpoint.address, "127.0.0.1:9090");
}
