//! Configuration for the packet codec
//!
//! Settings come from defaults, a JSON file or `QUIC_*` environment
//! variables, and are checked by [`CodecConfig::validate`] before use.

use crate::quic::error::{QuicError, Result};
use crate::quic::packet::MAX_CONNECTION_ID_LEN;
use crate::quic::version::Version;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Smallest datagram every QUIC path must carry.
pub const MIN_DATAGRAM_SIZE: usize = 1200;

/// Main codec configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Negotiated version used to select wire formats
    pub version: Version,
    /// Largest datagram the codec will produce or accept
    pub max_datagram_size: usize,
    /// Longest connection ID accepted when encoding
    pub max_connection_id_len: usize,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            version: Version::V1,
            max_datagram_size: 1452,
            max_connection_id_len: MAX_CONNECTION_ID_LEN,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Include hex dumps of packet bytes at trace level
    pub dump_packets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dump_packets: false,
        }
    }
}

impl CodecConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| QuicError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| QuicError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| QuicError::Config(format!("Failed to serialize to JSON: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| QuicError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("QUIC_VERSION") {
            config.version = val.parse()?;
        }

        if let Some(val) = lookup("QUIC_MAX_DATAGRAM_SIZE") {
            config.max_datagram_size = val
                .parse()
                .map_err(|e| QuicError::Config(format!("Invalid QUIC_MAX_DATAGRAM_SIZE: {}", e)))?;
        }

        if let Some(val) = lookup("QUIC_MAX_CONNECTION_ID_LEN") {
            config.max_connection_id_len = val
                .parse()
                .map_err(|e| QuicError::Config(format!("Invalid QUIC_MAX_CONNECTION_ID_LEN: {}", e)))?;
        }

        if let Some(val) = lookup("QUIC_LOG_LEVEL") {
            config.logging.level = val;
        }

        if let Some(val) = lookup("QUIC_DUMP_PACKETS") {
            config.logging.dump_packets = matches!(val.as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_datagram_size < MIN_DATAGRAM_SIZE {
            return Err(QuicError::Config(format!(
                "max_datagram_size must be at least {}",
                MIN_DATAGRAM_SIZE
            )));
        }

        if self.max_datagram_size > u16::MAX as usize {
            return Err(QuicError::Config(
                "max_datagram_size must fit in a UDP datagram".to_string(),
            ));
        }

        if self.max_connection_id_len > MAX_CONNECTION_ID_LEN {
            return Err(QuicError::Config(format!(
                "max_connection_id_len must be at most {}",
                MAX_CONNECTION_ID_LEN
            )));
        }

        if !self.version.is_draft() && self.version != Version::V1 {
            return Err(QuicError::Config(format!("Unsupported version {}", self.version)));
        }

        if parse_level(&self.logging.level).is_none() {
            return Err(QuicError::Config(format!(
                "Unknown log level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Get tracing level
    pub fn tracing_level(&self) -> Level {
        parse_level(&self.logging.level).unwrap_or(Level::INFO)
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: CodecConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: CodecConfig::default(),
        }
    }

    /// Set the negotiated version
    pub fn version(mut self, version: Version) -> Self {
        self.config.version = version;
        self
    }

    /// Set maximum datagram size
    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.config.max_datagram_size = size;
        self
    }

    /// Set maximum connection ID length
    pub fn max_connection_id_len(mut self, len: usize) -> Self {
        self.config.max_connection_id_len = len;
        self
    }

    /// Set log level
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn dump_packets(mut self, enabled: bool) -> Self {
        self.config.logging.dump_packets = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<CodecConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CodecConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracing_level(), Level::INFO);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .version(Version::DRAFT_17)
            .max_datagram_size(1350)
            .max_connection_id_len(8)
            .log_level("debug")
            .dump_packets(true)
            .build()
            .unwrap();

        assert_eq!(config.version, Version::DRAFT_17);
        assert_eq!(config.max_datagram_size, 1350);
        assert_eq!(config.max_connection_id_len, 8);
        assert_eq!(config.tracing_level(), Level::DEBUG);
        assert!(config.logging.dump_packets);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CodecConfig::default();
        config.max_datagram_size = 500;
        assert!(config.validate().is_err());

        let mut config = CodecConfig::default();
        config.max_connection_id_len = 21;
        assert!(config.validate().is_err());

        let mut config = CodecConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = CodecConfig::default();
        config.version = Version::new(0x6b33_43cf);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_environment() {
        let vars: HashMap<&str, &str> = [
            ("QUIC_VERSION", "draft-16"),
            ("QUIC_MAX_DATAGRAM_SIZE", "1280"),
            ("QUIC_LOG_LEVEL", "trace"),
            ("QUIC_DUMP_PACKETS", "true"),
        ]
        .into_iter()
        .collect();

        let config = CodecConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.version, Version::DRAFT_16);
        assert_eq!(config.max_datagram_size, 1280);
        assert_eq!(config.tracing_level(), Level::TRACE);
        assert!(config.logging.dump_packets);
    }

    #[test]
    fn test_invalid_environment_value() {
        let result = CodecConfig::from_lookup(|key| {
            (key == "QUIC_MAX_DATAGRAM_SIZE").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(QuicError::Config(_))));
    }

    #[test]
    fn test_json_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("quic-wire-config-{}.json", std::process::id()));
        let config = ConfigBuilder::new().version(Version::DRAFT_18).build().unwrap();

        config.save_to_file(&path).unwrap();
        let loaded = CodecConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CodecConfig = serde_json::from_str(r#"{"version": "draft-17"}"#).unwrap();
        assert_eq!(config.version, Version::DRAFT_17);
        assert_eq!(config.max_datagram_size, 1452);
        assert_eq!(config.logging.level, "info");
    }
}
