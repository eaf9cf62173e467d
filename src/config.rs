//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety

use crate::scheduler::SchedulePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Batching and concurrency configuration
    pub processing: ProcessingConfig,

    /// Remote aggregation endpoint configuration
    pub remote: RemoteConfig,

    /// Aggregation server configuration
    pub server: ServerConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Paths configuration
    pub paths: PathsConfig,

    /// File the configuration was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub policy: SchedulePolicy,
    /// Per-call timeout; 0 disables it
    pub request_timeout_secs: u64,
    pub top_n: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Aggregation endpoint URL; batches are analyzed in-process when unset
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub json_pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 2000,
            max_concurrency: 4,
            policy: SchedulePolicy::SlidingWindow,
            request_timeout_secs: 60,
            top_n: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { json_pretty: true }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file if it exists
        let config_paths = [
            PathBuf::from("listen-stats.toml"),
            PathBuf::from(".listen-stats.toml"),
            dirs::config_dir()
                .map(|d| d.join("listen-stats").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                config = Self::load_from_file(path)?;
                break;
            }
        }

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.source = Some(path.to_path_buf());

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Processing overrides
        if let Ok(val) = env::var("LISTEN_STATS_BATCH_SIZE") {
            self.processing.batch_size = val.parse().context("Invalid LISTEN_STATS_BATCH_SIZE")?;
        }
        if let Ok(val) = env::var("LISTEN_STATS_MAX_CONCURRENCY") {
            self.processing.max_concurrency = val
                .parse()
                .context("Invalid LISTEN_STATS_MAX_CONCURRENCY")?;
        }
        if let Ok(val) = env::var("LISTEN_STATS_POLICY") {
            self.processing.policy = val
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid LISTEN_STATS_POLICY")?;
        }
        if let Ok(val) = env::var("LISTEN_STATS_TIMEOUT_SECS") {
            self.processing.request_timeout_secs =
                val.parse().context("Invalid LISTEN_STATS_TIMEOUT_SECS")?;
        }
        if let Ok(val) = env::var("LISTEN_STATS_TOP_N") {
            self.processing.top_n = val.parse().context("Invalid LISTEN_STATS_TOP_N")?;
        }

        // Remote and server overrides
        if let Ok(val) = env::var("LISTEN_STATS_ENDPOINT") {
            self.remote.endpoint = Some(val).filter(|v| !v.is_empty());
        }
        if let Ok(val) = env::var("LISTEN_STATS_BIND") {
            self.server.bind_address = val;
        }

        // Path overrides
        if let Ok(val) = env::var("LISTEN_STATS_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate processing settings
        if self.processing.batch_size == 0 {
            return Err(anyhow::anyhow!("Batch size must be greater than 0"));
        }

        if self.processing.max_concurrency == 0 {
            return Err(anyhow::anyhow!("Max concurrency must be greater than 0"));
        }

        if self.processing.top_n == 0 {
            return Err(anyhow::anyhow!("Top-N length must be greater than 0"));
        }

        // Validate logging settings
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(anyhow::anyhow!(
                "Log format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            ));
        }

        if !matches!(self.logging.output.as_str(), "console" | "file" | "both") {
            return Err(anyhow::anyhow!(
                "Log output must be 'console', 'file' or 'both', got '{}'",
                self.logging.output
            ));
        }

        // Create the log directory only when something will be written there
        if self.logging.output != "console" && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Log where the configuration came from and any risky settings.
    ///
    /// Loading happens before the subscriber exists, so this runs once logging is up.
    pub fn report_loaded(&self) {
        match &self.source {
            Some(path) => info!(config_file = %path.display(), "Loaded configuration from file"),
            None => debug!("No configuration file found, using defaults"),
        }
        if self.processing.request_timeout_secs == 0 {
            warn!("Request timeout disabled, a stalled batch will block the run");
        }
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load and install the global configuration, reporting load errors
pub fn init_config() -> Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::load()?;
    Ok(CONFIG.get_or_init(|| config))
}
