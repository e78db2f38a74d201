//! Configuration
//!
//! Layered, lowest precedence first: built-in defaults, an optional config
//! file, `DSLFLOW_*` environment variables (after `.env` is loaded), then
//! explicit builder overrides.
//!
//! The config file is the builder's `config_path`, else `DSLFLOW_CONFIG_PATH`,
//! else `dslflow.{toml,yaml,yml,json}` in the working directory if present.
//! Environment keys use `__` between section and field, for example
//! `DSLFLOW_SUBSTRATE__MAX_ATTEMPTS=5`.

use ::config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::substrate::RetryPolicy;
use crate::types::DEFAULT_WORKFLOW_TYPE;

pub const ENV_PREFIX: &str = "DSLFLOW";
pub const CONFIG_PATH_ENV: &str = "DSLFLOW_CONFIG_PATH";
const DEFAULT_CONFIG_NAME: &str = "dslflow";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub substrate: SubstrateConfig,
    pub definitions: DefinitionsConfig,
    pub runs: RunsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstrateConfig {
    /// Per-attempt activity timeout
    pub default_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_retry_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub max_retry_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionsConfig {
    /// Directories searched, in order, for definitions named by a bare locator
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunsConfig {
    /// Run-type tag written into every run's variable store
    pub workflow_type: String,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300,
            max_attempts: 3,
            initial_retry_interval_ms: 1000,
            backoff_coefficient: 2.0,
            max_retry_interval_ms: 100_000,
        }
    }
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("workflows")],
        }
    }
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            workflow_type: DEFAULT_WORKFLOW_TYPE.to_string(),
        }
    }
}

impl SubstrateConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_interval: Duration::from_millis(self.initial_retry_interval_ms),
            backoff_coefficient: self.backoff_coefficient,
            max_interval: Duration::from_millis(self.max_retry_interval_ms),
        }
    }
}

impl Config {
    /// Load configuration from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.substrate.max_attempts < 1 {
            return Err(ConfigError::Invalid {
                field: "substrate.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.substrate.default_timeout_secs < 1 {
            return Err(ConfigError::Invalid {
                field: "substrate.default_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if !(self.substrate.backoff_coefficient >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "substrate.backoff_coefficient",
                message: format!("must be >= 1.0, got {}", self.substrate.backoff_coefficient),
            });
        }
        if self.runs.workflow_type.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "runs.workflow_type",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`Config`]; `None` leaves a value to the lower layers
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    definition_paths: Option<Vec<PathBuf>>,
    default_timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    workflow_type: Option<String>,
}

impl ConfigBuilder {
    /// Set the config file path (overrides default search)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn definition_paths(mut self, paths: Option<Vec<PathBuf>>) -> Self {
        self.definition_paths = paths;
        self
    }

    pub fn default_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    pub fn max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn workflow_type(mut self, workflow_type: Option<String>) -> Self {
        self.workflow_type = workflow_type;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let mut builder = ::config::Config::builder()
            .set_default(
                "substrate.default_timeout_secs",
                defaults.substrate.default_timeout_secs,
            )?
            .set_default("substrate.max_attempts", defaults.substrate.max_attempts)?
            .set_default(
                "substrate.initial_retry_interval_ms",
                defaults.substrate.initial_retry_interval_ms,
            )?
            .set_default(
                "substrate.backoff_coefficient",
                defaults.substrate.backoff_coefficient,
            )?
            .set_default(
                "substrate.max_retry_interval_ms",
                defaults.substrate.max_retry_interval_ms,
            )?
            .set_default("definitions.paths", path_strings(&defaults.definitions.paths))?
            .set_default("runs.workflow_type", defaults.runs.workflow_type)?;

        let explicit_path = self
            .config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
        builder = match explicit_path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("definitions.paths"),
        );

        if let Some(paths) = &self.definition_paths {
            builder = builder.set_override("definitions.paths", path_strings(paths))?;
        }
        if let Some(secs) = self.default_timeout_secs {
            builder = builder.set_override("substrate.default_timeout_secs", secs)?;
        }
        if let Some(attempts) = self.max_attempts {
            builder = builder.set_override("substrate.max_attempts", attempts)?;
        }
        if let Some(workflow_type) = self.workflow_type {
            builder = builder.set_override("runs.workflow_type", workflow_type)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

fn path_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}
