use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::achievement::category::{CategoryInfo, CategoryTable};
use crate::global::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub api: ApiConfig,
    #[serde(default)]
    pub achievements: AchievementsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppSettings {
    pub log_level: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
    #[serde(default = "default_log_file_prefix")]
    pub log_file_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub log_rotation: LogRotation,
    #[serde(default = "default_log_to_console")]
    pub log_to_console: bool,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

fn default_log_to_file() -> bool {
    false
}

fn default_log_directory() -> String {
    "./logs".to_string()
}

fn default_log_file_prefix() -> String {
    "movieo-sync".to_string()
}

fn default_log_rotation() -> LogRotation {
    LogRotation::Daily
}

fn default_log_to_console() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_to_file: default_log_to_file(),
            log_directory: default_log_directory(),
            log_file_prefix: default_log_file_prefix(),
            log_rotation: default_log_rotation(),
            log_to_console: default_log_to_console(),
            json: false,
        }
    }
}

/// Connection settings for the Movieo REST backend
#[derive(Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token; may also be set at runtime on the client
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("user_agent", &self.user_agent)
            .field("rate_limit", &self.rate_limit)
            .field("retry", &self.retry)
            .finish()
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("movieo-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_rate_limit() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AchievementsConfig {
    /// How often the binary re-checks progress on its own
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Minimum spacing between two achievement checks
    #[serde(default = "default_min_check_interval_ms")]
    pub min_check_interval_ms: u64,
    /// Ask the server to recompute before fetching the snapshot
    #[serde(default)]
    pub trigger_server_check: bool,
    /// Display order of categories; empty means the built-in table
    #[serde(default)]
    pub categories: Vec<CategoryInfo>,
}

fn default_poll_interval_seconds() -> u64 {
    300
}

fn default_min_check_interval_ms() -> u64 {
    2000
}

impl Default for AchievementsConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            min_check_interval_ms: default_min_check_interval_ms(),
            trigger_server_check: false,
            categories: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config.toml, with `MOVIEO__SECTION__KEY`
    /// environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config"))
            .add_source(config::Environment::with_prefix("MOVIEO").separator("__"))
            .build()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }

        if self.api.rate_limit <= 0.0 {
            return Err(ConfigError::Invalid("api.rate_limit must be positive".to_string()));
        }

        if self.achievements.min_check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "achievements.min_check_interval_ms must be positive".to_string(),
            ));
        }

        if self.api.token.as_deref().is_some_and(str::is_empty) {
            warn!("api.token is set but empty, requests will fail with an auth error");
        }

        Ok(())
    }

    /// Category table from configuration, or the built-in one when none is listed
    pub fn category_table(&self) -> Result<CategoryTable, ConfigError> {
        if self.achievements.categories.is_empty() {
            return Ok(CategoryTable::default());
        }

        CategoryTable::new(self.achievements.categories.clone())
    }
}
