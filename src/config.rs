use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::core::eligibility::DiscoveryPolicy;
use crate::core::gate::{FirstMoverPolicy, GatePolicy};
use crate::core::safety::SafetyPolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub billing: BillingSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub messaging: MessagingSettings,
    #[serde(default)]
    pub safety: SafetySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local store; state is lost on restart
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: String,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingSettings {
    /// Billing service base URL; without one, every user gets the static
    /// allowance below
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: String,
    pub timeout_secs: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_size: Option<u64>,
    #[serde(default = "default_free_super_likes")]
    pub free_super_likes: u32,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: String::new(),
            timeout_secs: None,
            cache_ttl_secs: None,
            cache_size: None,
            free_super_likes: default_free_super_likes(),
        }
    }
}

fn default_free_super_likes() -> u32 { 1 }

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default)]
    pub reciprocal: bool,
    #[serde(default = "default_prefetch_factor")]
    pub prefetch_factor: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            reciprocal: false,
            prefetch_factor: default_prefetch_factor(),
        }
    }
}

fn default_limit() -> usize { 10 }
fn default_max_limit() -> usize { 50 }
fn default_prefetch_factor() -> usize { 5 }

impl DiscoverySettings {
    pub fn policy(&self) -> DiscoveryPolicy {
        DiscoveryPolicy {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            reciprocal: self.reciprocal,
            prefetch_factor: self.prefetch_factor,
        }
        .clamped()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingSettings {
    /// A gender (`female`, `male`, ...) or `anyone`
    #[serde(default = "default_first_mover")]
    pub first_mover: String,
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            first_mover: default_first_mover(),
            window_hours: default_window_hours(),
            max_message_len: default_max_message_len(),
            page_size: default_page_size(),
        }
    }
}

fn default_first_mover() -> String { "female".to_string() }
fn default_window_hours() -> i64 { 24 }
fn default_max_message_len() -> usize { 2000 }
fn default_page_size() -> usize { 50 }

impl MessagingSettings {
    pub fn policy(&self) -> Result<GatePolicy, ConfigError> {
        let first_mover = self
            .first_mover
            .parse::<FirstMoverPolicy>()
            .map_err(|e| ConfigError::Message(format!("messaging.first_mover: {}", e)))?;

        if self.window_hours <= 0 {
            return Err(ConfigError::Message(
                "messaging.window_hours must be positive".to_string(),
            ));
        }

        Ok(GatePolicy {
            first_mover,
            window: chrono::Duration::hours(self.window_hours),
            max_message_len: self.max_message_len,
            page_size: self.page_size,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetySettings {
    #[serde(default = "default_auto_flag_reports")]
    pub auto_flag_reports: u64,
    #[serde(default = "default_report_window_hours")]
    pub report_window_hours: i64,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            auto_flag_reports: default_auto_flag_reports(),
            report_window_hours: default_report_window_hours(),
        }
    }
}

fn default_auto_flag_reports() -> u64 { 3 }
fn default_report_window_hours() -> i64 { 24 }

impl SafetySettings {
    pub fn policy(&self) -> SafetyPolicy {
        SafetyPolicy {
            auto_flag_reports: self.auto_flag_reports,
            report_window: chrono::Duration::hours(self.report_window_hours),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with TANDEM_)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            // Development overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., TANDEM__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("TANDEM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("TANDEM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Apply the well-known unprefixed variables on top of the layered config
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }
    if let Ok(secret) = env::var("JWT_SECRET") {
        builder = builder.set_override("auth.jwt_secret", secret)?;
    }
    if let Ok(level) = env::var("LOG_LEVEL") {
        builder = builder.set_override("logging.level", level)?;
    }
    if let Ok(format) = env::var("LOG_FORMAT") {
        builder = builder.set_override("logging.format", format)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;
    use std::io::Write;

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }

    #[test]
    fn test_messaging_policy() {
        let policy = MessagingSettings::default().policy().unwrap();
        assert_eq!(policy.first_mover, FirstMoverPolicy::Gender(Gender::Female));
        assert_eq!(policy.window, chrono::Duration::hours(24));

        let bad = MessagingSettings {
            first_mover: "whoever".into(),
            ..Default::default()
        };
        assert!(bad.policy().is_err());
    }

    #[test]
    fn test_discovery_limits_clamped() {
        let zero = DiscoverySettings { default_limit: 0, max_limit: 0, ..Default::default() }.policy();
        assert_eq!((zero.default_limit, zero.max_limit), (1, 1));

        let huge = DiscoverySettings { default_limit: 80, max_limit: 10_000, ..Default::default() }.policy();
        assert_eq!(huge.max_limit, crate::core::eligibility::MAX_LIMIT);
        assert_eq!(huge.default_limit, huge.max_limit);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("tandem-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
backend = "memory"
url = "postgres://unused"

[auth]
jwt_secret = "secret"

[discovery]
reciprocal = true
"#
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.database.backend, StorageBackend::Memory);
        assert!(settings.discovery.reciprocal);
        assert_eq!(settings.discovery.max_limit, 50);
        assert_eq!(settings.messaging.window_hours, 24);
        assert!(settings.billing.endpoint.is_none());
    }
}
