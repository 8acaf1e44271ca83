//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::config::error::{ConfigError, Result};
use crate::config::rule::AddressRule;
use crate::config::types::ForwardConfig;

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Validate the configuration
pub fn validate_config(config: &ForwardConfig) -> Result<()> {
    validate_general_settings(config)?;
    validate_rules("permitted_destinations", config.permitted_destinations())?;
    validate_rules("permitted_binds", config.permitted_binds())?;

    if !config.allow_local_forwarding() && !config.permitted_destinations().is_empty() {
        warn!("permitted_destinations is set but local forwarding is disabled");
    }
    if !config.allow_remote_forwarding() && !config.permitted_binds().is_empty() {
        warn!("permitted_binds is set but remote forwarding is disabled");
    }

    Ok(())
}

fn positive(field: &'static str, is_zero: bool) -> Result<()> {
    if is_zero {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// Sizes, timeouts and the log filter
fn validate_general_settings(config: &ForwardConfig) -> Result<()> {
    positive("buffer_size", config.buffer_size() == 0)?;
    positive("connect_timeout", config.connect_timeout().is_zero())?;

    // env_logger filters such as "tcpip_forward=debug" are passed through as-is
    let level = config.log_level();
    if !level.contains('=') && !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        return Err(ConfigError::InvalidValue {
            field: "log_level",
            reason: format!("unknown level '{}', expected one of {}", level, LOG_LEVELS.join(", ")),
        });
    }

    Ok(())
}

fn validate_rules(field: &'static str, rules: &[String]) -> Result<()> {
    for rule in rules {
        rule.parse::<AddressRule>().map_err(|e| ConfigError::InvalidValue {
            field,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
