//! Configuration management for the engine.

use crate::{AddPolicy, RetryPolicy};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration, usually loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Identifies this device to the remote authority
    pub client_id: String,
    /// Base URL of the remote authority, e.g. `http://localhost:3000`
    pub remote_url: Option<String>,
    /// Endpoint probed for connectivity; derived from `remote_url` when unset
    pub probe_addr: Option<SocketAddr>,
    /// Merge policy for repeated adds
    pub add_policy: AddPolicy,
    /// Transport retry for sync batches
    pub retry: RetryPolicy,
    /// Interval between connectivity probes
    pub poll_interval: Duration,
    /// Snapshot file; in-memory storage when unset
    pub snapshot_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            remote_url: None,
            probe_addr: None,
            add_policy: AddPolicy::default(),
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(5),
            snapshot_path: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(client_id) = lookup("CARTSYNC_CLIENT_ID") {
            config.client_id = client_id;
        }

        config.remote_url = lookup("CARTSYNC_REMOTE_URL");

        if let Some(addr) = lookup("CARTSYNC_PROBE_ADDR") {
            config.probe_addr = Some(parse("CARTSYNC_PROBE_ADDR", &addr)?);
        }

        if let Some(policy) = lookup("CARTSYNC_ADD_POLICY") {
            config.add_policy = match policy.to_ascii_lowercase().as_str() {
                "additive" => AddPolicy::Additive,
                "replace" => AddPolicy::Replace,
                _ => return Err(ConfigError::InvalidAddPolicy(policy)),
            };
        }

        if let Some(attempts) = lookup("CARTSYNC_RETRY_ATTEMPTS") {
            config.retry.max_attempts = parse("CARTSYNC_RETRY_ATTEMPTS", &attempts)?;
            if config.retry.max_attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "CARTSYNC_RETRY_ATTEMPTS",
                    value: attempts,
                });
            }
        }

        if let Some(base) = lookup("CARTSYNC_RETRY_BASE_MS") {
            config.retry.base_delay =
                Duration::from_millis(parse("CARTSYNC_RETRY_BASE_MS", &base)?);
        }

        if let Some(poll) = lookup("CARTSYNC_POLL_MS") {
            config.poll_interval = Duration::from_millis(parse("CARTSYNC_POLL_MS", &poll)?);
        }

        config.snapshot_path = lookup("CARTSYNC_SNAPSHOT_PATH").map(PathBuf::from);

        Ok(config)
    }

    /// The remote base URL, required to talk to a server.
    pub fn remote_url(&self) -> Result<&str, ConfigError> {
        self.remote_url
            .as_deref()
            .ok_or(ConfigError::Missing("CARTSYNC_REMOTE_URL"))
    }

    /// Address to probe for connectivity.
    ///
    /// Falls back to the host and port of `remote_url`, resolving the host
    /// once.
    pub fn probe_addr(&self) -> Result<SocketAddr, ConfigError> {
        if let Some(addr) = self.probe_addr {
            return Ok(addr);
        }

        let raw = self.remote_url()?;
        let invalid = || ConfigError::InvalidValue {
            var: "CARTSYNC_REMOTE_URL",
            value: raw.to_string(),
        };
        let url = reqwest::Url::parse(raw).map_err(|_| invalid())?;
        url.socket_addrs(|| None)
            .ok()
            .and_then(|addrs| addrs.into_iter().next())
            .ok_or_else(invalid)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid CARTSYNC_ADD_POLICY value '{0}' (expected 'additive' or 'replace')")]
    InvalidAddPolicy(String),

    #[error("Invalid {var} value '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.add_policy, AddPolicy::Additive);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.snapshot_path.is_none());
        assert!(!config.client_id.is_empty());
        assert_eq!(
            config.probe_addr(),
            Err(ConfigError::Missing("CARTSYNC_REMOTE_URL"))
        );
    }

    #[test]
    fn reads_all_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CARTSYNC_CLIENT_ID", "device-7"),
            ("CARTSYNC_REMOTE_URL", "http://127.0.0.1:3000"),
            ("CARTSYNC_PROBE_ADDR", "10.0.0.2:443"),
            ("CARTSYNC_ADD_POLICY", "Replace"),
            ("CARTSYNC_RETRY_ATTEMPTS", "5"),
            ("CARTSYNC_RETRY_BASE_MS", "50"),
            ("CARTSYNC_POLL_MS", "1000"),
            ("CARTSYNC_SNAPSHOT_PATH", "/tmp/cart.json"),
        ]))
        .unwrap();

        assert_eq!(config.client_id, "device-7");
        assert_eq!(config.remote_url().unwrap(), "http://127.0.0.1:3000");
        assert_eq!(config.probe_addr().unwrap(), "10.0.0.2:443".parse().unwrap());
        assert_eq!(config.add_policy, AddPolicy::Replace);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(50));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/cart.json")));
    }

    #[test]
    fn connectivity_addr_follows_remote_url() {
        let config =
            EngineConfig::from_lookup(lookup(&[("CARTSYNC_REMOTE_URL", "http://127.0.0.1:8080/")]))
                .unwrap();
        assert_eq!(config.probe_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());

        let config =
            EngineConfig::from_lookup(lookup(&[("CARTSYNC_REMOTE_URL", "http://127.0.0.1")]))
                .unwrap();
        assert_eq!(config.probe_addr().unwrap(), "127.0.0.1:80".parse().unwrap());

        let config =
            EngineConfig::from_lookup(lookup(&[("CARTSYNC_REMOTE_URL", "not a url")])).unwrap();
        assert!(matches!(
            config.probe_addr(),
            Err(ConfigError::InvalidValue {
                var: "CARTSYNC_REMOTE_URL",
                ..
            })
        ));
    }

    #[test]
    fn rejects_bad_connectivity_addr() {
        let err = EngineConfig::from_lookup(lookup(&[("CARTSYNC_PROBE_ADDR", "nowhere")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "CARTSYNC_PROBE_ADDR",
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_policy() {
        let err = EngineConfig::from_lookup(lookup(&[("CARTSYNC_ADD_POLICY", "merge")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidAddPolicy("merge".into()));
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = EngineConfig::from_lookup(lookup(&[("CARTSYNC_POLL_MS", "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "CARTSYNC_POLL_MS",
                ..
            }
        ));

        let err =
            EngineConfig::from_lookup(lookup(&[("CARTSYNC_RETRY_ATTEMPTS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
