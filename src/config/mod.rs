use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Include the underlying error text in 500 responses (never enable in production)
    #[serde(default)]
    pub expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            expose_error_details: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of an issued bearer token in days
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: default_token_ttl_days(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_token_ttl_days() -> i64 {
    7
}

fn default_min_password_length() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory listing images are written to
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    /// URL prefix the images directory is served under
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            public_url: default_public_url(),
            max_image_bytes: default_max_image_bytes(),
            max_images: default_max_images(),
        }
    }
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("./data/images")
}

fn default_public_url() -> String {
    "/storage".to_string()
}

fn default_max_image_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_images() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_per_page() -> u32 {
    10
}

fn default_max_per_page() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests allowed per window on general API routes
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Requests allowed per window on /api/auth routes
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    /// Login attempts allowed per window for one email from one address
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_window: u32,
    /// Booking requests allowed per window for one client account
    #[serde(default = "default_booking_requests")]
    pub booking_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between sweeps of stale limiter entries
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            login_attempts_per_window: default_login_attempts(),
            booking_requests_per_window: default_booking_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests() -> u32 {
    300
}

fn default_auth_requests() -> u32 {
    20
}

fn default_login_attempts() -> u32 {
    5
}

fn default_booking_requests() -> u32 {
    30
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            catalog: CatalogConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.token_ttl_days, 7);
        assert_eq!(config.storage.max_images, 3);
        assert_eq!(config.storage.max_image_bytes, 5 * 1024 * 1024);
        assert_eq!(config.catalog.per_page, 10);
        assert!(!config.server.expose_error_details);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 9000

            [catalog]
            per_page = 25

            [rate_limit]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.catalog.per_page, 25);
        assert_eq!(config.catalog.max_per_page, 50);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.auth_requests_per_window, 20);
        assert_eq!(config.rate_limit.login_attempts_per_window, 5);
        assert_eq!(config.rate_limit.booking_requests_per_window, 30);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/definitely/not/here/autoloc.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(Config::parse("server = [").is_err());
    }
}
