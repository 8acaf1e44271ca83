//! Configuration sources
//!
//! This module defines traits and implementations for loading configuration
//! from different sources.

use std::env;
use std::path::{Path, PathBuf};
use log::{debug, warn};

use crate::config::error::{ConfigError, Result};
use crate::config::types::{parse_bool, parse_list, ConfigValues, ValueSource};

/// Configuration source trait
pub trait ConfigSource {
    /// Load the values this source sets
    fn load(&self) -> Result<ConfigValues>;

    /// Get the source type
    fn source_type(&self) -> ValueSource;
}

/// Default configuration source
///
/// Sets nothing; unset values already resolve to their defaults.
pub struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn load(&self) -> Result<ConfigValues> {
        debug!("Loading default configuration");
        Ok(ConfigValues::default())
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Default
    }
}

/// File configuration source
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    /// Create a new file source
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<ConfigValues> {
        debug!("Loading configuration from file: {}", self.path.display());

        if !self.path.exists() {
            warn!("Configuration file not found: {}", self.path.display());
            return Ok(ConfigValues::default());
        }

        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::Unreadable { path: self.path.clone(), reason: e.to_string() })?;

        serde_json::from_str::<ConfigValues>(&contents).map_err(|e| {
            let err_msg = format!("Error parsing {}: {}", self.path.display(), e);
            warn!("{}", err_msg);
            ConfigError::Malformed(err_msg)
        })
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::File
    }
}

/// Environment variable configuration source
pub struct EnvSource {
    pub prefix: String,
}

impl EnvSource {
    /// Create a new environment source reading `<prefix><NAME>` variables
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        let full_name = format!("{}{}", self.prefix, name);
        let value = env::var(&full_name).ok()?;
        debug!("Found environment variable {}={}", full_name, value);
        Some(value)
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<ConfigValues> {
        debug!("Loading configuration from environment variables with prefix {}", self.prefix);

        let mut values = ConfigValues::default();

        if let Some(value) = self.var("LOG_LEVEL") {
            values.log_level = Some(value);
        }

        if let Some(value) = self.var("BUFFER_SIZE") {
            match value.parse::<usize>() {
                Ok(size) => values.buffer_size = Some(size),
                Err(_) => warn!("Invalid buffer_size in environment: {}", value),
            }
        }

        if let Some(value) = self.var("CONNECT_TIMEOUT") {
            match value.parse::<u64>() {
                Ok(timeout) => values.connect_timeout = Some(timeout),
                Err(_) => warn!("Invalid connect_timeout in environment: {}", value),
            }
        }

        if let Some(value) = self.var("ALLOW_LOCAL_FORWARDING") {
            match parse_bool(&value) {
                Some(flag) => values.allow_local_forwarding = Some(flag),
                None => warn!("Invalid allow_local_forwarding in environment: {}", value),
            }
        }

        if let Some(value) = self.var("ALLOW_REMOTE_FORWARDING") {
            match parse_bool(&value) {
                Some(flag) => values.allow_remote_forwarding = Some(flag),
                None => warn!("Invalid allow_remote_forwarding in environment: {}", value),
            }
        }

        if let Some(value) = self.var("PERMITTED_DESTINATIONS") {
            values.permitted_destinations = Some(parse_list(&value));
        }

        if let Some(value) = self.var("PERMITTED_BINDS") {
            values.permitted_binds = Some(parse_list(&value));
        }

        Ok(values)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Environment
    }
}

/// Command line configuration source
///
/// The binary parses its arguments with clap and hands over the values it saw.
pub struct CliSource {
    pub values: ConfigValues,
}

impl CliSource {
    /// Create a new command line source
    pub fn new(values: ConfigValues) -> Self {
        Self { values }
    }
}

impl ConfigSource for CliSource {
    fn load(&self) -> Result<ConfigValues> {
        debug!("Loading configuration from command line arguments");
        Ok(self.values.clone())
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::CommandLine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_missing_file_sets_nothing() {
        let source = FileSource::new("/nonexistent/tcpip-forward.json");
        assert_eq!(source.load().unwrap(), ConfigValues::default());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileSource::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    #[serial]
    fn test_env_source() {
        let prefix = "TCPIP_FORWARD_SOURCE_TEST_";
        env::set_var(format!("{}BUFFER_SIZE", prefix), "4096");
        env::set_var(format!("{}CONNECT_TIMEOUT", prefix), "soon");
        env::set_var(format!("{}ALLOW_REMOTE_FORWARDING", prefix), "true");
        env::set_var(format!("{}PERMITTED_BINDS", prefix), "127.0.0.1:*,[::1]:*");

        let values = EnvSource::new(prefix).load().unwrap();

        env::remove_var(format!("{}BUFFER_SIZE", prefix));
        env::remove_var(format!("{}CONNECT_TIMEOUT", prefix));
        env::remove_var(format!("{}ALLOW_REMOTE_FORWARDING", prefix));
        env::remove_var(format!("{}PERMITTED_BINDS", prefix));

        assert_eq!(values.buffer_size, Some(4096));
        assert_eq!(values.connect_timeout, None);
        assert_eq!(values.allow_remote_forwarding, Some(true));
        assert_eq!(
            values.permitted_binds,
            Some(vec!["127.0.0.1:*".to_string(), "[::1]:*".to_string()])
        );
    }
}
