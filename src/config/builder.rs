//! Layered configuration assembly

use log::debug;
use std::path::{Path, PathBuf};

use crate::config::defaults::ENV_PREFIX;
use crate::config::error::Result;
use crate::config::source::{CliSource, ConfigSource, DefaultSource, EnvSource, FileSource};
use crate::config::types::{ConfigValues, ForwardConfig};
use crate::config::validator::validate_config;

/// Stacks configuration sources into a [`ForwardConfig`]
///
/// Layers are applied in the order they were added and each one overrides
/// what came before, so the usual chain is defaults, file, environment,
/// command line.
pub struct ConfigBuilder {
    layers: Vec<Box<dyn ConfigSource>>,
    config_file: Option<PathBuf>,
    validate: bool,
}

impl ConfigBuilder {
    /// A builder with no layers
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            config_file: None,
            validate: true,
        }
    }

    /// Push any source as the next layer
    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }

    /// Built-in defaults
    pub fn with_defaults(self) -> Self {
        self.with_source(DefaultSource)
    }

    /// JSON file; a missing file contributes nothing
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        self.config_file = Some(path.clone());
        self.with_source(FileSource::new(path))
    }

    /// `<prefix><FIELD>` environment variables
    pub fn with_env(self, prefix: &str) -> Self {
        self.with_source(EnvSource::new(prefix))
    }

    /// Values taken from command line flags
    pub fn with_cli(self, values: ConfigValues) -> Self {
        self.with_source(CliSource::new(values))
    }

    /// Skip [`validate_config`] in [`ConfigBuilder::build`]
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Load every layer and return the merged configuration
    pub fn build(self) -> Result<ForwardConfig> {
        let mut config = ForwardConfig {
            config_file: self.config_file,
            ..Default::default()
        };

        for layer in self.layers {
            let source = layer.source_type();
            let values = layer.load()?;
            debug!("{} layer sets {:?}", source, values.set_fields());
            config.apply(values, source);
        }

        if self.validate {
            validate_config(&config)?;
        }
        Ok(config)
    }
}

impl Default for ConfigBuilder {
    /// Defaults overlaid with `TCPIP_FORWARD_*` environment variables
    fn default() -> Self {
        Self::new().with_defaults().with_env(ENV_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValueSource;

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forward.json");
        std::fs::write(&path, r#"{ "buffer_size": 1024, "allow_local_forwarding": true }"#).unwrap();

        let config = ConfigBuilder::new()
            .with_defaults()
            .with_file(&path)
            .with_cli(ConfigValues {
                buffer_size: Some(2048),
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_eq!(config.buffer_size(), 2048);
        assert_eq!(config.source("buffer_size"), ValueSource::CommandLine);
        assert!(config.allow_local_forwarding());
        assert_eq!(config.source("allow_local_forwarding"), ValueSource::File);
        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_validation_can_be_skipped() {
        let invalid = ConfigValues {
            buffer_size: Some(0),
            ..Default::default()
        };

        assert!(ConfigBuilder::new().with_cli(invalid.clone()).build().is_err());
        let config = ConfigBuilder::new()
            .with_cli(invalid)
            .without_validation()
            .build()
            .unwrap();
        assert_eq!(config.buffer_size(), 0);
    }
}
