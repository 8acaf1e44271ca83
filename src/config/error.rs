//! Configuration errors

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Why a forwarding configuration could not be loaded or accepted
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file does not exist
    Missing(PathBuf),

    /// The configuration file exists but could not be read
    Unreadable {
        /// File that failed
        path: PathBuf,
        /// I/O error text
        reason: String,
    },

    /// The file is not a valid JSON forwarding configuration
    Malformed(String),

    /// A field holds an unusable value
    InvalidValue {
        /// Configuration field name, e.g. `buffer_size`
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// An allow-list entry is not a `host:port` rule
    InvalidRule {
        /// The entry as written
        rule: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "{} does not exist", path.display()),
            Self::Unreadable { path, reason } => write!(f, "cannot read {}: {}", path.display(), reason),
            Self::Malformed(msg) => write!(f, "malformed configuration: {}", msg),
            Self::InvalidValue { field, reason } => write!(f, "{}: {}", field, reason),
            Self::InvalidRule { rule, reason } => write!(f, "rule '{}': {}", rule, reason),
        }
    }
}

impl Error for ConfigError {}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<ConfigError> for crate::common::ForwardError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ForwardError;

    #[test]
    fn test_display_and_conversion() {
        let err = ConfigError::InvalidValue {
            field: "buffer_size",
            reason: "must be greater than 0".to_string(),
        };
        assert_eq!(err.to_string(), "buffer_size: must be greater than 0");

        let forward_err: ForwardError = err.into();
        assert!(matches!(forward_err, ForwardError::Config(msg) if msg.contains("buffer_size")));
    }

    #[test]
    fn test_rule_display() {
        let err = ConfigError::InvalidRule {
            rule: "db".to_string(),
            reason: "expected host:port",
        };
        assert_eq!(err.to_string(), "rule 'db': expected host:port");
    }
}
