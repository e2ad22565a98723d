use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub signup: SignupConfig,
    #[serde(default)]
    pub email: EmailConfig,
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
    /// Directory for uploaded banner images (default: `<data_dir>/uploads`)
    #[serde(default)]
    pub uploads_dir: Option<PathBuf>,
    /// Browser origin allowed to call the API with credentials
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Maximum accepted banner size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn uploads_dir(&self) -> PathBuf {
        self.uploads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            uploads_dir: None,
            cors_origin: default_cors_origin(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Key used to hash session tokens before they are stored
    #[serde(default = "default_session_secret")]
    pub session_secret: String,
    /// Sessions expire after this many minutes without a request
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the session cookie `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
    /// Seeded administrator account, created at startup when both are set
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: default_session_secret(),
            session_idle_minutes: default_session_idle_minutes(),
            cookie_name: default_cookie_name(),
            cookie_secure: false,
            admin_email: None,
            admin_password: None,
            admin_username: default_admin_username(),
        }
    }
}

fn default_session_secret() -> String {
    // Sessions do not survive a restart without a configured secret
    uuid::Uuid::new_v4().to_string()
}

fn default_session_idle_minutes() -> i64 {
    60 * 24 * 7
}

fn default_cookie_name() -> String {
    "craveit_session".to_string()
}

fn default_admin_username() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupConfig {
    /// Lifetime of an emailed one-time code
    #[serde(default = "default_otp_ttl_seconds")]
    pub otp_ttl_seconds: u64,
    /// Wrong codes accepted before the challenge is discarded
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_challenge_cookie")]
    pub challenge_cookie: String,
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            otp_ttl_seconds: default_otp_ttl_seconds(),
            max_attempts: default_max_attempts(),
            challenge_cookie: default_challenge_cookie(),
        }
    }
}

fn default_otp_ttl_seconds() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_challenge_cookie() -> String {
    "craveit_signup".to_string()
}

/// SMTP settings for outbound mail
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_tls: default_smtp_tls(),
            smtp_username: None,
            smtp_password: None,
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "CraveIt".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            window_seconds: default_window_seconds(),
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_window_seconds() -> u64 {
    60
}

fn default_api_requests() -> u32 {
    100
}

fn default_auth_requests() -> u32 {
    20
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
