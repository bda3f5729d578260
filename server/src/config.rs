//! Configuration management for the server.

use cartsync_engine::AddPolicy;
use std::env;

/// Default upper bound on mutations per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Largest batch accepted by `POST /sync`
    pub max_batch_size: usize,
    /// How repeated adds combine; must match the clients'
    pub add_policy: AddPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            add_policy: AddPolicy::Additive,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let max_batch_size = match env::var("MAX_BATCH_SIZE") {
            Ok(value) => match value.parse() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidBatchSize(value)),
            },
            Err(_) => DEFAULT_MAX_BATCH_SIZE,
        };

        let add_policy = match env::var("ADD_POLICY") {
            Ok(value) => parse_policy(&value)?,
            Err(_) => AddPolicy::Additive,
        };

        Ok(Self {
            host,
            port,
            max_batch_size,
            add_policy,
        })
    }
}

fn parse_policy(value: &str) -> Result<AddPolicy, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "additive" => Ok(AddPolicy::Additive),
        "replace" => Ok(AddPolicy::Replace),
        _ => Err(ConfigError::InvalidAddPolicy(value.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid MAX_BATCH_SIZE value: {0}")]
    InvalidBatchSize(String),

    #[error("Invalid ADD_POLICY value: {0} (expected additive or replace)")]
    InvalidAddPolicy(String),
}
