use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{JubenError, JubenResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct JubenConfig {
    pub api: ApiConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Where the backend lives and how hard to try reaching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Total attempts for streaming requests, the first one included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    #[serde(default)]
    pub retry_jitter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// In characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// In bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_namespace() -> String {
    "juben".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1_000
}

fn default_retry_max_delay() -> u64 {
    30_000
}

fn default_max_message_length() -> usize {
    10_000
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_metrics_capacity() -> usize {
    1_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            namespace: default_namespace(),
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            retry_jitter: false,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `{base_url}/{namespace}` without a doubled slash.
    pub fn api_root(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let namespace = self.namespace.trim_matches('/');
        if namespace.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, namespace)
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            capacity: default_metrics_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl StorageConfig {
    /// The configured path, or `identity.json` under the data directory.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| get_data_dir().map(|dir| dir.join("identity.json")))
    }
}

impl JubenConfig {
    pub fn load() -> JubenResult<Self> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> JubenResult<Self> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("JUBEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut juben_config: JubenConfig = config.try_deserialize()?;

        if let Ok(url) = std::env::var("JUBEN_API_BASE_URL") {
            juben_config.api.base_url = url;
        } else if let Ok(url) = std::env::var("VITE_API_BASE_URL") {
            juben_config.api.base_url = url;
        }

        if let Ok(level) = std::env::var("JUBEN_LOG_LEVEL") {
            juben_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            juben_config.logging.level = level;
        }

        juben_config.validate()?;

        Ok(juben_config)
    }

    pub fn validate(&self) -> JubenResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(invalid("api.base_url", "Must not be empty"));
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(invalid(
                "api.base_url",
                "Must be a URL starting with http:// or https://",
            ));
        }

        if self.api.request_timeout_ms == 0 {
            return Err(invalid("api.request_timeout_ms", "Must be greater than 0"));
        }

        if self.api.max_retries == 0 {
            return Err(invalid("api.max_retries", "Must be at least 1"));
        }

        if self.limits.max_message_length == 0 {
            return Err(invalid("limits.max_message_length", "Must be greater than 0"));
        }

        if self.limits.max_file_size == 0 {
            return Err(invalid("limits.max_file_size", "Must be greater than 0"));
        }

        if self.metrics.capacity == 0 {
            return Err(invalid("metrics.capacity", "Must be greater than 0"));
        }

        if !is_valid_log_filter(&self.logging.level) {
            return Err(invalid(
                "logging.level",
                &format!(
                    "Invalid log filter '{}'. Use a level ({}), 'off', a target, or target=level, comma separated",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.api.base_url
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn is_log_level(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "off" || LOG_LEVELS.contains(&value.as_str())
}

fn is_log_target(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
}

/// Accepts the directive syntax of `RUST_LOG`: comma separated levels,
/// targets, or `target=level` pairs. Span filters (`target[span]=level`)
/// are passed through for the subscriber to judge.
fn is_valid_log_filter(filter: &str) -> bool {
    let directives: Vec<&str> = filter
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();

    if directives.is_empty() {
        return false;
    }

    directives.iter().all(|directive| {
        if directive.contains('[') {
            return true;
        }
        match directive.split_once('=') {
            Some((target, level)) => is_log_target(target.trim()) && is_log_level(level.trim()),
            None => is_log_level(directive) || is_log_target(directive),
        }
    })
}

fn invalid(key: &str, message: &str) -> JubenError {
    JubenError::InvalidConfigValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("juben.toml"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    for path in get_dotenv_paths() {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

fn get_dotenv_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join(".env"));
    }

    paths
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("juben"))
}

pub fn get_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("juben"))
}

pub fn ensure_data_dir() -> Result<PathBuf, std::io::Error> {
    let data_dir = get_data_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine data directory",
        )
    })?;

    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
    }

    Ok(data_dir)
}
