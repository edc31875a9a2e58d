//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Outbound email configuration.
    #[serde(default)]
    pub email: EmailConfig,
    /// Job dispatcher configuration.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Cache invalidation configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Export artifact storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Scheduled trigger configuration.
    #[serde(default)]
    pub cron: CronConfig,
    /// Quotas for public write endpoints.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Outbound email configuration.
///
/// The API key is the credential the email processor requires. Without it,
/// every email job fails and is retried by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// API key for the transactional email provider.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint that accepts a JSON message.
    #[serde(default = "default_email_api_url")]
    pub api_url: String,
    /// Sender address.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_email_api_url(),
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

/// Job dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Whether the server runs its own periodic trigger.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum jobs claimed per dispatch call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Seconds between dispatch calls.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds between cleanup calls.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Terminal jobs older than this many days are deleted by cleanup.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Base delay for exponential retry backoff. Unset means failed jobs
    /// become eligible again immediately.
    #[serde(default)]
    pub retry_base_delay_secs: Option<u64>,
    /// Upper bound for the retry backoff delay.
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: default_batch_size(),
            interval_secs: default_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            retention_days: default_retention_days(),
            retry_base_delay_secs: None,
            retry_max_delay_secs: default_retry_max_delay_secs(),
        }
    }
}

/// Cache invalidation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Endpoint of the rendering layer that accepts revalidation requests.
    #[serde(default)]
    pub revalidate_url: Option<String>,
    /// Shared secret sent with revalidation requests.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Export artifact storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory export artifacts are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    /// Public URL prefix for export artifacts.
    #[serde(default = "default_export_base_url")]
    pub base_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            base_url: default_export_base_url(),
        }
    }
}

/// Scheduled trigger configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CronConfig {
    /// Bearer token required by the trigger endpoints.
    #[serde(default)]
    pub secret: Option<String>,
}

/// A single quota: `limit` requests per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QuotaConfig {
    /// Maximum requests per window.
    pub limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// Quotas for public write endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Newsletter signup.
    #[serde(default = "default_subscribe_quota")]
    pub subscribe: QuotaConfig,
    /// Contact form.
    #[serde(default = "default_contact_quota")]
    pub contact: QuotaConfig,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            subscribe: default_subscribe_quota(),
            contact: default_contact_quota(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_email_api_url() -> String {
    "https://api.resend.com/emails".to_string()
}

fn default_from_address() -> String {
    "hello@example.com".to_string()
}

fn default_from_name() -> String {
    "Courier".to_string()
}

const fn default_batch_size() -> u64 {
    10
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_cleanup_interval_secs() -> u64 {
    86400
}

const fn default_retention_days() -> u32 {
    30
}

const fn default_retry_max_delay_secs() -> u64 {
    3600
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_export_base_url() -> String {
    "/exports".to_string()
}

const fn default_subscribe_quota() -> QuotaConfig {
    QuotaConfig {
        limit: 5,
        window_ms: 60_000,
    }
}

const fn default_contact_quota() -> QuotaConfig {
    QuotaConfig {
        limit: 3,
        window_ms: 3_600_000,
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, merged into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `COURIER_ENV`)
    /// 4. Environment variables with `COURIER_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("COURIER_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(source: &str) -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        for (name, quota) in [
            ("subscribe", self.rate_limit.subscribe),
            ("contact", self.rate_limit.contact),
        ] {
            if quota.window_ms == 0 || i64::try_from(quota.window_ms).is_err() {
                return Err(config::ConfigError::Message(format!(
                    "rate_limit.{name}.window_ms must be between 1 and {}",
                    i64::MAX
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [database]
            url = "postgres://localhost/courier"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.max_connections, 20);
        assert!(config.email.api_key.is_none());
        assert!(!config.dispatcher.enabled);
        assert_eq!(config.dispatcher.batch_size, 10);
        assert_eq!(config.dispatcher.retention_days, 30);
        assert!(config.dispatcher.retry_base_delay_secs.is_none());
        assert_eq!(config.rate_limit.subscribe.limit, 5);
        assert_eq!(config.rate_limit.subscribe.window_ms, 60_000);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [database]
            url = "postgres://localhost/courier"

            [email]
            api_key = "re_test"
            from_address = "news@example.org"

            [dispatcher]
            enabled = true
            batch_size = 25
            retry_base_delay_secs = 30

            [rate_limit.contact]
            limit = 10
            window_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.email.api_key.as_deref(), Some("re_test"));
        assert_eq!(config.email.from_address, "news@example.org");
        assert!(config.dispatcher.enabled);
        assert_eq!(config.dispatcher.batch_size, 25);
        assert_eq!(config.dispatcher.retry_base_delay_secs, Some(30));
        assert_eq!(
            config.rate_limit.contact,
            QuotaConfig {
                limit: 10,
                window_ms: 1000
            }
        );
    }

    #[test]
    fn test_zero_rate_limit_window_is_rejected() {
        let err = Config::from_toml_str(
            r#"
            [database]
            url = "postgres://localhost/courier"

            [rate_limit.subscribe]
            limit = 5
            window_ms = 0
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("rate_limit.subscribe.window_ms"));
    }

    #[test]
    fn test_missing_database_is_an_error() {
        assert!(Config::from_toml_str("[server]\nport = 8080\n").is_err());
    }
}
