//! Configuration module
//!
//! This module handles forwarding configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the result.

mod builder;
mod defaults;
mod error;
mod rule;
mod source;
mod types;
mod validator;

pub use self::builder::ConfigBuilder;
pub use self::defaults::{ENV_PREFIX, LOG_LEVEL_STR};
pub use self::error::{ConfigError, Result};
pub use self::rule::AddressRule;
pub use self::source::{CliSource, ConfigSource, DefaultSource, EnvSource, FileSource};
pub use self::types::{parse_bool, parse_list, ConfigValues, ForwardConfig, ValueSource};
pub use self::validator::validate_config;
