use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_HTTP_CLIENT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVIDENCE_MAX_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_EVIDENCE_MIME_PREFIX: &str = "image/";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
// Bangladeshi mobile numbers: 01 + operator digit + 8 digits, optional +88 prefix.
const DEFAULT_PHONE_PATTERN: &str = r"^(\+88)?01[3-9]\d{8}$";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Base URL of the store policy configuration service
    pub policy_service_url: String,

    /// Base URL of the coupon catalog service
    pub coupon_service_url: String,

    /// Base URL of the evidence object store
    pub evidence_store_url: String,

    /// Base URL of the order creation API
    pub order_api_url: String,

    /// Base URL of the cart state store
    pub cart_service_url: String,

    /// Per-request timeout for outbound HTTP calls (seconds)
    #[serde(default = "default_http_client_timeout_secs")]
    pub http_client_timeout_secs: u64,

    /// Ceiling for one order-creation attempt, upload included (seconds).
    /// A breach surfaces as a submission error and the session may retry.
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,

    /// Evidence upload size ceiling in bytes
    #[serde(default = "default_evidence_max_bytes")]
    pub evidence_max_bytes: usize,

    /// Allowed MIME prefix for evidence uploads
    #[serde(default = "default_evidence_mime_prefix")]
    pub evidence_allowed_mime_prefix: String,

    /// Regex the customer phone number must match
    #[serde(default = "default_phone_pattern")]
    #[validate(custom = "validate_phone_pattern")]
    pub phone_pattern: String,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_http_client_timeout_secs() -> u64 {
    DEFAULT_HTTP_CLIENT_TIMEOUT_SECS
}

fn default_submit_timeout_secs() -> u64 {
    DEFAULT_SUBMIT_TIMEOUT_SECS
}

fn default_evidence_max_bytes() -> usize {
    DEFAULT_EVIDENCE_MAX_BYTES
}

fn default_evidence_mime_prefix() -> String {
    DEFAULT_EVIDENCE_MIME_PREFIX.to_string()
}

fn default_phone_pattern() -> String {
    DEFAULT_PHONE_PATTERN.to_string()
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn validate_phone_pattern(pattern: &str) -> Result<(), ValidationError> {
    if regex::Regex::new(pattern).is_err() {
        let mut err = ValidationError::new("phone_pattern");
        err.message = Some("phone_pattern must be a valid regular expression".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(filter_directive);

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("policy_service_url", "http://localhost:9001")?
        .set_default("coupon_service_url", "http://localhost:9002")?
        .set_default("evidence_store_url", "http://localhost:9003")?
        .set_default("order_api_url", "http://localhost:9004")?
        .set_default("cart_service_url", "http://localhost:9005")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
