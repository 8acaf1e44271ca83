//! Configuration types
//!
//! This module contains the main configuration types used throughout the crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::debug;

use crate::config::defaults;
use crate::config::error::{ConfigError, Result};

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// Default value
    Default,
    /// From configuration file
    File,
    /// From environment variable
    Environment,
    /// From command line argument
    CommandLine,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Default => write!(f, "default"),
            ValueSource::File => write!(f, "file"),
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Configuration values
///
/// Every field is optional so that each source only carries what it sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigValues {
    /// Log level (error, warn, info, debug, trace) or an env_logger filter
    #[serde(default)]
    pub log_level: Option<String>,

    /// Relay buffer size in bytes
    #[serde(default)]
    pub buffer_size: Option<usize>,

    /// Local-forward dial timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<u64>,

    /// Accept `direct-tcpip` channel-opens
    #[serde(default)]
    pub allow_local_forwarding: Option<bool>,

    /// Accept `tcpip-forward` requests
    #[serde(default)]
    pub allow_remote_forwarding: Option<bool>,

    /// `host:port` rules for local-forward destinations
    #[serde(default)]
    pub permitted_destinations: Option<Vec<String>>,

    /// `host:port` rules for remote-forward bind addresses
    #[serde(default)]
    pub permitted_binds: Option<Vec<String>>,
}

impl ConfigValues {
    /// Names of the fields that are set
    pub fn set_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.log_level.is_some() {
            fields.push("log_level");
        }
        if self.buffer_size.is_some() {
            fields.push("buffer_size");
        }
        if self.connect_timeout.is_some() {
            fields.push("connect_timeout");
        }
        if self.allow_local_forwarding.is_some() {
            fields.push("allow_local_forwarding");
        }
        if self.allow_remote_forwarding.is_some() {
            fields.push("allow_remote_forwarding");
        }
        if self.permitted_destinations.is_some() {
            fields.push("permitted_destinations");
        }
        if self.permitted_binds.is_some() {
            fields.push("permitted_binds");
        }
        fields
    }

    /// Override fields of `self` with every field set in `other`
    pub fn overlay(&mut self, other: ConfigValues) {
        fn pick<T>(current: &mut Option<T>, new: Option<T>) {
            if new.is_some() {
                *current = new;
            }
        }

        pick(&mut self.log_level, other.log_level);
        pick(&mut self.buffer_size, other.buffer_size);
        pick(&mut self.connect_timeout, other.connect_timeout);
        pick(&mut self.allow_local_forwarding, other.allow_local_forwarding);
        pick(&mut self.allow_remote_forwarding, other.allow_remote_forwarding);
        pick(&mut self.permitted_destinations, other.permitted_destinations);
        pick(&mut self.permitted_binds, other.permitted_binds);
    }
}

/// Port forwarding configuration
///
/// Unset values fall back to [`defaults`]; `sources` records where each set
/// value came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardConfig {
    /// Configuration values
    pub values: ConfigValues,
    /// Configuration file the values were loaded from, if any
    pub config_file: Option<PathBuf>,
    /// Source of each set value
    pub sources: HashMap<String, ValueSource>,
}

impl ForwardConfig {
    /// Load configuration from a JSON file, without defaults from other sources
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::Missing(path.to_path_buf()),
            _ => ConfigError::Unreadable { path: path.to_path_buf(), reason: e.to_string() },
        })?;
        let values: ConfigValues = serde_json::from_str(&contents)?;

        let mut config = Self::default();
        config.apply(values, ValueSource::File);
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Overlay `values` and record `source` for every field they set
    pub fn apply(&mut self, values: ConfigValues, source: ValueSource) {
        for field in values.set_fields() {
            self.sources.insert(field.to_string(), source);
        }
        self.values.overlay(values);
    }

    /// Where `field` was set, [`ValueSource::Default`] when it was not
    pub fn source(&self, field: &str) -> ValueSource {
        self.sources.get(field).copied().unwrap_or(ValueSource::Default)
    }

    /// Log level
    pub fn log_level(&self) -> &str {
        self.values.log_level.as_deref().unwrap_or(defaults::LOG_LEVEL_STR)
    }

    /// Relay buffer size in bytes
    pub fn buffer_size(&self) -> usize {
        self.values.buffer_size.unwrap_or_else(defaults::buffer_size)
    }

    /// Local-forward dial timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.values.connect_timeout.unwrap_or_else(defaults::connect_timeout))
    }

    /// Whether `direct-tcpip` is enabled
    pub fn allow_local_forwarding(&self) -> bool {
        self.values.allow_local_forwarding.unwrap_or_else(defaults::allow_forwarding)
    }

    /// Whether `tcpip-forward` is enabled
    pub fn allow_remote_forwarding(&self) -> bool {
        self.values.allow_remote_forwarding.unwrap_or_else(defaults::allow_forwarding)
    }

    /// Local-forward destination rules
    pub fn permitted_destinations(&self) -> &[String] {
        self.values.permitted_destinations.as_deref().unwrap_or(&[])
    }

    /// Remote-forward bind rules
    pub fn permitted_binds(&self) -> &[String] {
        self.values.permitted_binds.as_deref().unwrap_or(&[])
    }
}

/// Parse a boolean the way environment variables usually spell it
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma separated list, dropping empty entries
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
