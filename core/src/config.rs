//! Engine configuration.
//!
//! Values can come from code, JSON or `CALLWAY_*` environment variables.
//! The TLS context is never serialized; set it with [`EngineConfig::with_tls`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ureq::tls::TlsConfig;

use crate::error::{Error, Result};

/// Largest outbound body kept in memory for replay.
pub const DEFAULT_BODY_BUFFER_LIMIT: usize = 4 * 1024 * 1024;

pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Above 1 it sizes the connection pool (total and per destination);
    /// otherwise a single connection is kept.
    pub max_connections: usize,
    pub body_buffer_limit: usize,
    pub timeout_ms: Option<u64>,
    pub max_redirects: u32,
    #[serde(skip)]
    pub tls: Option<TlsConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_connections: 1,
            body_buffer_limit: DEFAULT_BODY_BUFFER_LIMIT,
            timeout_ms: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            tls: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("invalid engine config: {e}")))
    }

    /// Defaults overridden by `CALLWAY_MAX_CONNECTIONS`,
    /// `CALLWAY_BODY_BUFFER_LIMIT`, `CALLWAY_TIMEOUT_MS` and
    /// `CALLWAY_MAX_REDIRECTS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<V: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<V>> {
            raw.map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| Error::configuration(format!("{key} has invalid value {value:?}")))
            })
            .transpose()
        }

        let mut config = Self::default();
        if let Some(n) = parse("CALLWAY_MAX_CONNECTIONS", lookup("CALLWAY_MAX_CONNECTIONS"))? {
            config.max_connections = n;
        }
        if let Some(n) = parse("CALLWAY_BODY_BUFFER_LIMIT", lookup("CALLWAY_BODY_BUFFER_LIMIT"))? {
            config.body_buffer_limit = n;
        }
        if let Some(ms) = parse("CALLWAY_TIMEOUT_MS", lookup("CALLWAY_TIMEOUT_MS"))? {
            config.timeout_ms = Some(ms);
        }
        if let Some(n) = parse("CALLWAY_MAX_REDIRECTS", lookup("CALLWAY_MAX_REDIRECTS"))? {
            config.max_redirects = n;
        }
        Ok(config)
    }

    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_body_buffer_limit(mut self, bytes: usize) -> Self {
        self.body_buffer_limit = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_max_redirects(mut self, n: u32) -> Self {
        self.max_redirects = n;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Connections kept per pool and per destination.
    pub fn pool_capacity(&self) -> usize {
        if self.max_connections > 1 {
            self.max_connections
        } else {
            1
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("max_connections", &self.max_connections)
            .field("body_buffer_limit", &self.body_buffer_limit)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_redirects", &self.max_redirects)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_capacity(), 1);
        assert_eq!(config.body_buffer_limit, 4 * 1024 * 1024);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.max_redirects, 10);
    }

    #[test]
    fn pool_capacity_follows_max_connections_above_one() {
        assert_eq!(EngineConfig::default().with_max_connections(0).pool_capacity(), 1);
        assert_eq!(EngineConfig::default().with_max_connections(1).pool_capacity(), 1);
        assert_eq!(EngineConfig::default().with_max_connections(8).pool_capacity(), 8);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"max_connections": 4, "timeout_ms": 2500}"#).unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.body_buffer_limit, DEFAULT_BODY_BUFFER_LIMIT);
    }

    #[test]
    fn bad_json_is_a_configuration_error() {
        assert!(EngineConfig::from_json("{max_connections:").unwrap_err().is_configuration());
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CALLWAY_MAX_CONNECTIONS", "16"),
            ("CALLWAY_TIMEOUT_MS", " 750 "),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.timeout_ms, Some(750));
        assert_eq!(config.max_redirects, DEFAULT_MAX_REDIRECTS);
    }

    #[test]
    fn invalid_environment_value() {
        let err = EngineConfig::from_lookup(|k| {
            (k == "CALLWAY_MAX_REDIRECTS").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("CALLWAY_MAX_REDIRECTS"));
    }
}
