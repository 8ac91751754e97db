//! Application configuration management.
//!
//! Values are layered: `config/default.toml`, then `config/{RUN_MODE}.toml`,
//! then `SALDO__*` environment variables (e.g. `SALDO__LEDGER__LOCK_TIMEOUT_MS`).

use chrono_tz::Tz;
use serde::Deserialize;

use crate::types::Currency;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger engine configuration.
    #[serde(default)]
    pub ledger: LedgerSettings,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    8
}

/// Ledger engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// How long a posting waits for its account locks before giving up.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Equity account that receives net income on period close.
    #[serde(default = "default_retained_earnings_code")]
    pub retained_earnings_code: String,
    /// Functional currency of the books.
    #[serde(default)]
    pub currency: Currency,
    /// IANA time zone used to decide "today" for default entry dates.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    /// Run a full balance reconciliation when a process starts.
    #[serde(default = "default_verify_on_startup")]
    pub verify_on_startup: bool,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_retained_earnings_code() -> String {
    "3201".to_string()
}

fn default_timezone() -> Tz {
    Tz::Asia__Jakarta
}

fn default_verify_on_startup() -> bool {
    true
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            retained_earnings_code: default_retained_earnings_code(),
            currency: Currency::default(),
            timezone: default_timezone(),
            verify_on_startup: default_verify_on_startup(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "saldo=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from `.env`, config files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("SALDO").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_defaults() {
        let settings = LedgerSettings::default();
        assert_eq!(settings.lock_timeout_ms, 5_000);
        assert_eq!(settings.retained_earnings_code, "3201");
        assert_eq!(settings.currency, Currency::Idr);
        assert_eq!(settings.timezone, Tz::Asia__Jakarta);
        assert!(settings.verify_on_startup);
    }

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("SALDO__DATABASE__URL", Some("postgres://localhost/saldo_test")),
                ("SALDO__LEDGER__LOCK_TIMEOUT_MS", Some("250")),
                ("SALDO__LEDGER__CURRENCY", Some("USD")),
                ("SALDO__LOGGING__JSON", Some("true")),
                ("RUN_MODE", Some("does-not-exist")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/saldo_test");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.ledger.lock_timeout_ms, 250);
                assert_eq!(config.ledger.currency, Currency::Usd);
                assert_eq!(config.ledger.retained_earnings_code, "3201");
                assert!(config.logging.json);
            },
        );
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_vars(
            [
                ("SALDO__DATABASE__URL", None::<&str>),
                ("DATABASE_URL", None),
                ("RUN_MODE", Some("does-not-exist")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }
}
