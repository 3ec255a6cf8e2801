//! Configuration management for ax-oxide

use crate::cache::CacheConfig;
use crate::session::SessionConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Browser remote debugging endpoint (http or ws)
    pub cdp_endpoint: String,

    /// Idle window before a session is released, in milliseconds
    pub idle_timeout_ms: u64,

    /// Attach attempts before giving up
    pub attach_max_attempts: u32,

    /// Base backoff between attach attempts, in milliseconds
    pub attach_backoff_ms: u64,

    /// Errors tolerated on one session before it is reset
    pub max_error_count: u32,

    /// Document-root cache TTL in milliseconds
    pub document_cache_ttl_ms: u64,

    /// Node-id cache TTL in milliseconds
    pub node_cache_ttl_ms: u64,

    /// Node-id cache capacity
    pub node_cache_max_entries: usize,

    /// Direct-reference micro-cache TTL in milliseconds
    pub micro_cache_ttl_ms: u64,

    /// Isolated-world context cache TTL in milliseconds
    pub frame_context_ttl_ms: u64,

    /// Interval of the background expired-entry sweep, in milliseconds
    pub sweep_interval_ms: u64,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9333,
            cdp_endpoint: "http://localhost:9222".to_string(),
            idle_timeout_ms: 30_000,
            attach_max_attempts: 3,
            attach_backoff_ms: 100,
            max_error_count: 3,
            document_cache_ttl_ms: 30_000,
            node_cache_ttl_ms: 10_000,
            node_cache_max_entries: 500,
            micro_cache_ttl_ms: 150,
            frame_context_ttl_ms: 5_000,
            sweep_interval_ms: 60_000,
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, target: &mut T) -> Result<()> {
    if let Ok(raw) = env::var(name) {
        *target = raw
            .parse()
            .map_err(|_| Error::configuration(format!("Invalid {}", name)))?;
    }
    Ok(())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(host) = env::var("AX_OXIDE_HOST") {
            config.host = host;
        }
        parse_var("AX_OXIDE_PORT", &mut config.port)?;
        if let Ok(endpoint) = env::var("AX_OXIDE_CDP_ENDPOINT") {
            config.cdp_endpoint = endpoint;
        }
        parse_var("AX_OXIDE_IDLE_TIMEOUT_MS", &mut config.idle_timeout_ms)?;
        parse_var("AX_OXIDE_ATTACH_ATTEMPTS", &mut config.attach_max_attempts)?;
        parse_var("AX_OXIDE_ATTACH_BACKOFF_MS", &mut config.attach_backoff_ms)?;
        parse_var("AX_OXIDE_MAX_ERRORS", &mut config.max_error_count)?;
        parse_var("AX_OXIDE_DOCUMENT_TTL_MS", &mut config.document_cache_ttl_ms)?;
        parse_var("AX_OXIDE_NODE_TTL_MS", &mut config.node_cache_ttl_ms)?;
        parse_var("AX_OXIDE_NODE_CACHE_MAX", &mut config.node_cache_max_entries)?;
        parse_var("AX_OXIDE_MICRO_TTL_MS", &mut config.micro_cache_ttl_ms)?;
        parse_var("AX_OXIDE_FRAME_CONTEXT_TTL_MS", &mut config.frame_context_ttl_ms)?;
        parse_var("AX_OXIDE_SWEEP_INTERVAL_MS", &mut config.sweep_interval_ms)?;
        if let Ok(log_level) = env::var("AX_OXIDE_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.attach_max_attempts == 0 {
            return Err(Error::configuration("attach_max_attempts must be at least 1"));
        }
        if self.node_cache_max_entries == 0 {
            return Err(Error::configuration("node_cache_max_entries must be at least 1"));
        }
        Ok(())
    }

    /// Session manager settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            attach_max_attempts: self.attach_max_attempts,
            attach_backoff: Duration::from_millis(self.attach_backoff_ms),
            max_error_count: self.max_error_count,
            frame_context_ttl: Duration::from_millis(self.frame_context_ttl_ms),
        }
    }

    /// Resolution cache settings
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            document_ttl: Duration::from_millis(self.document_cache_ttl_ms),
            node_ttl: Duration::from_millis(self.node_cache_ttl_ms),
            node_max_entries: self.node_cache_max_entries,
            micro_ttl: Duration::from_millis(self.micro_cache_ttl_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = Config::default();
        assert_eq!(config.session_config().idle_timeout, Duration::from_secs(30));
        assert_eq!(config.cache_config().micro_ttl, Duration::from_millis(150));
        assert_eq!(config.cache_config().node_max_entries, 500);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("port = 7000\nnode_cache_ttl_ms = 2000\n").unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.node_cache_ttl_ms, 2000);
        assert_eq!(config.document_cache_ttl_ms, 30_000);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = Config {
            attach_max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("ax-oxide-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "host = \"0.0.0.0\"\nidle_timeout_ms = 5000\n").unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.session_config().idle_timeout, Duration::from_secs(5));
        assert!(matches!(
            Config::from_file("/nonexistent/ax-oxide.toml"),
            Err(Error::Configuration(_))
        ));
    }
}
