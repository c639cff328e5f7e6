//! Config loading: YAML file plus `LOGWELL_`-prefixed environment
//! overrides, with validation at the end.
//!
//! Environment keys mirror the YAML structure with `__` as the section
//! separator, e.g. `LOGWELL_STORAGE__PATH` overrides `storage.path`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::Config;

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["logwell.yaml", "config/logwell.yaml"];

const ENV_PREFIX: &str = "LOGWELL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Builder-style loader mirroring the precedence file < env.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit config file instead of searching the default
    /// locations. An explicit path that does not exist is an error; a
    /// missing default location is not.
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut builder = config::Config::builder();

        match &self.config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path.clone()));
                }
                builder = builder.add_source(config::File::from(path.as_path()));
            }
            None => {
                if let Some(found) = DEFAULT_CONFIG_LOCATIONS
                    .iter()
                    .map(Path::new)
                    .find(|candidate| candidate.exists())
                {
                    builder = builder.add_source(config::File::from(found));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.storage.path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("storage.path must not be empty".into()));
    }
    if config.storage.chunk_size_bytes == 0 {
        return Err(ConfigError::Invalid(
            "storage.chunk_size_bytes must be positive".into(),
        ));
    }
    if config.ingest.buffer_size == 0 {
        return Err(ConfigError::Invalid(
            "ingest.buffer_size must be positive".into(),
        ));
    }
    if config.ingest.max_batch_size == 0 {
        return Err(ConfigError::Invalid(
            "ingest.max_batch_size must be positive".into(),
        ));
    }
    if config.ingest.flush_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "ingest.flush_interval_ms must be positive".into(),
        ));
    }
    if config.ingest.workers == 0 {
        return Err(ConfigError::Invalid("ingest.workers must be positive".into()));
    }
    if config.auth.enabled
        && config
            .auth
            .api_key
            .as_deref()
            .is_none_or(|key| key.trim().is_empty())
    {
        return Err(ConfigError::Invalid(
            "auth.api_key is required when auth.enabled is true".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_a_file() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.ingest.buffer_size, 10_000);
        assert_eq!(config.storage.retention_days, 7);
        assert!(!config.auth.enabled);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logwell.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "server:\n  port: 4000\nstorage:\n  retention_days: 30\n"
        )
        .unwrap();

        let config = ConfigLoader::new().with_config_path(&path).load().unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.storage.retention_days, 30);
        // Untouched sections keep their defaults.
        assert_eq!(config.ingest.max_batch_size, 1_000);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .with_config_path("/nonexistent/logwell.yaml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
    }

    #[test]
    fn auth_enabled_requires_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logwell.yaml");
        std::fs::write(&path, "auth:\n  enabled: true\n").unwrap();

        let err = ConfigLoader::new()
            .with_config_path(&path)
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn retention_horizon_converts_days() {
        let config = Config::default();
        assert_eq!(
            config.storage.retention_horizon(),
            std::time::Duration::from_secs(7 * 24 * 60 * 60)
        );
    }
}
