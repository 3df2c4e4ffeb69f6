use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the streamer service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Profile store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Server-side file layout
    #[serde(default)]
    pub files: FilesConfig,
    /// Digital human preprocessing service
    #[serde(default)]
    pub digital_human: DigitalHumanConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Where the streamer profiles are persisted
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// YAML document holding every streamer profile
    #[serde(default = "default_streamer_config_path")]
    pub streamer_config_path: PathBuf,
}

/// Server-side directories for uploaded streamer assets
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_server_file_root")]
    pub server_file_root: PathBuf,
    #[serde(default = "default_streamer_file_dir")]
    pub streamer_file_dir: String,
    #[serde(default = "default_streamer_info_files_dir")]
    pub streamer_info_files_dir: String,
}

/// Digital human preprocessing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DigitalHumanConfig {
    /// Endpoint receiving preprocessing requests
    #[serde(default = "default_preprocess_url")]
    pub preprocess_url: String,
    /// User identifier sent with every request
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "streamer-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_streamer_config_path() -> PathBuf {
    PathBuf::from("./configs/streamer_info.yaml")
}

fn default_server_file_root() -> PathBuf {
    PathBuf::from("./static")
}

fn default_streamer_file_dir() -> String {
    "streamer".to_string()
}

fn default_streamer_info_files_dir() -> String {
    "streamer_info".to_string()
}

fn default_preprocess_url() -> String {
    "http://127.0.0.1:8002/digital_human/preprocess".to_string()
}

fn default_user_id() -> String {
    "123".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/streamer").required(false))
            .add_source(config::File::with_name("/etc/streamer/streamer").required(false))
            // Override with environment variables
            // STREAMER__DIGITAL_HUMAN__PREPROCESS_URL -> digital_human.preprocess_url
            .add_source(environment())
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.streamer_config_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired(
                "store.streamer_config_path".to_string(),
            ));
        }

        let url = self.digital_human.preprocess_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingRequired(
                "digital_human.preprocess_url".to_string(),
            ));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "digital_human.preprocess_url".to_string(),
                message: format!("expected an http(s) URL, got {url}"),
            });
        }

        if self.digital_human.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "digital_human.request_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Directory on this host that holds uploaded streamer videos
    pub fn streamer_video_dir(&self) -> PathBuf {
        self.files.streamer_video_dir()
    }
}

/// `STREAMER__*` variables; `STREAMER__API__CORS_ORIGINS` is comma separated
fn environment() -> config::Environment {
    config::Environment::with_prefix("STREAMER")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("api.cors_origins")
}

impl FilesConfig {
    pub fn streamer_video_dir(&self) -> PathBuf {
        self.server_file_root
            .join(&self.streamer_file_dir)
            .join(&self.streamer_info_files_dir)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            streamer_config_path: default_streamer_config_path(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            server_file_root: default_server_file_root(),
            streamer_file_dir: default_streamer_file_dir(),
            streamer_info_files_dir: default_streamer_info_files_dir(),
        }
    }
}

impl Default for DigitalHumanConfig {
    fn default() -> Self {
        Self {
            preprocess_url: default_preprocess_url(),
            user_id: default_user_id(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
