//! Configuration management for the media streaming service

use crate::error::{Result, StreamError};
use crate::stream_plan::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the streaming service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// Address the HTTP listener binds to (default: 0.0.0.0:8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Base URL of the remote-store gateway
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Shard holding the primary credential (default: 2)
    #[serde(default = "default_primary_shard")]
    pub primary_shard: i32,

    /// Timeout applied to every gateway call in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Number of unique-id characters URLs must carry (default: 6)
    /// Valid range: 1 to 32
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,

    /// Interval between full metadata cache clears in seconds (default: 1800)
    #[serde(default = "default_cache_clear_interval")]
    pub cache_clear_interval_secs: u64,

    /// Authorization import attempts per handshake (default: 6)
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: usize,

    /// Retries for a chunk that failed transiently (default: 3)
    #[serde(default = "default_max_chunk_retries")]
    pub max_chunk_retries: usize,

    /// Upper bound for the chunk size tiers in bytes (default: 1MB)
    /// Must be a power of 2 between 4KB and 1MB
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,

    /// Log level filter for the binary (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Configuration for the standalone metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_primary_shard() -> i32 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

fn default_hash_length() -> usize {
    6
}

fn default_cache_clear_interval() -> u64 {
    30 * 60
}

fn default_max_auth_attempts() -> usize {
    6
}

fn default_max_chunk_retries() -> usize {
    3
}

fn default_max_chunk_size() -> u64 {
    MAX_CHUNK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            listen_address: default_listen_address(),
            gateway_url: default_gateway_url(),
            primary_shard: default_primary_shard(),
            request_timeout_secs: default_request_timeout(),
            hash_length: default_hash_length(),
            cache_clear_interval_secs: default_cache_clear_interval(),
            max_auth_attempts: default_max_auth_attempts(),
            max_chunk_retries: default_max_chunk_retries(),
            max_chunk_size: default_max_chunk_size(),
            log_level: default_log_level(),
            metrics_endpoint: None,
        }
    }
}

impl StreamConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(StreamConfig)` if loading and validation succeed
    /// * `Err(StreamError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            StreamError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: StreamConfig = serde_yaml::from_str(content).map_err(|e| {
            StreamError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address and gateway_url must not be empty
    /// - hash_length must be between 1 and 32
    /// - cache_clear_interval_secs, request_timeout_secs and max_auth_attempts must be > 0
    /// - max_chunk_size must be a power of 2 between 4KB and 1MB
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.is_empty() {
            return Err(StreamError::ConfigError(
                "listen_address must not be empty".to_string(),
            ));
        }

        if self.gateway_url.is_empty() {
            return Err(StreamError::ConfigError(
                "gateway_url must not be empty".to_string(),
            ));
        }

        if self.hash_length == 0 || self.hash_length > 32 {
            return Err(StreamError::ConfigError(format!(
                "hash_length must be between 1 and 32, got {}",
                self.hash_length
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(StreamError::ConfigError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.cache_clear_interval_secs == 0 {
            return Err(StreamError::ConfigError(
                "cache_clear_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_auth_attempts == 0 {
            return Err(StreamError::ConfigError(
                "max_auth_attempts must be greater than 0".to_string(),
            ));
        }

        if self.max_chunk_size < MIN_CHUNK_SIZE || self.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(StreamError::ConfigError(format!(
                "max_chunk_size must be between {}KB and {}MB, got {} bytes",
                MIN_CHUNK_SIZE / 1024,
                MAX_CHUNK_SIZE / (1024 * 1024),
                self.max_chunk_size
            )));
        }

        if !self.max_chunk_size.is_power_of_two() {
            return Err(StreamError::ConfigError(format!(
                "max_chunk_size must be a power of 2, got {}",
                self.max_chunk_size
            )));
        }

        Ok(())
    }

    /// Timeout for gateway calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Interval between metadata cache clears
    pub fn cache_clear_interval(&self) -> Duration {
        Duration::from_secs(self.cache_clear_interval_secs)
    }
}
