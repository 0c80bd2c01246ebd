//! Configuration Loader
//!
//! Environment-aware loading: detects the environment, layers the base and
//! environment-specific TOML files under the config directory, applies
//! `FAIRQ__` environment overrides and validates the result.

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::ConfigResult;
use super::FairqConfig;

const ENV_PREFIX: &str = "FAIRQ";

pub struct ConfigManager {
    config: FairqConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for tests that should not touch process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            scheduler_tick_ms = config.scheduler.tick_interval_ms,
            dispatch_batch_size = config.scheduler.dispatch_batch_size,
            consumer_concurrency = config.consumer.concurrency,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build(config_directory: &Path, environment: &str) -> ConfigResult<FairqConfig> {
        let base = config_directory.join("fairq.toml");
        let overlay = config_directory.join(format!("fairq.{environment}.toml"));

        let config = Config::builder()
            .add_source(File::from(base.as_path()).required(false))
            .add_source(File::from(overlay.as_path()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<FairqConfig>()?)
    }

    pub fn config(&self) -> &FairqConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the current environment
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        std::env::var("FAIRQ_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}
