//! Configuration management for the Furniture Order System
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with FOS__ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Outgoing email configuration
    pub email: EmailConfig,

    /// Supplier notification configuration
    pub notification: NotificationConfig,

    /// Signed links handed to suppliers
    pub supplier_portal: SupplierPortalConfig,

    /// Log output configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key used to verify staff session tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    /// SMTP relay host; emails are only logged when unset
    pub smtp_host: Option<String>,

    pub smtp_port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    pub from_email: String,

    pub from_name: String,

    /// Use STARTTLS instead of implicit TLS
    pub use_starttls: bool,

    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Minimum paid/total ratio before suppliers are contacted
    pub min_paid_ratio: Decimal,

    /// Delivery attempts before an email is dead-lettered
    pub max_attempts: i32,

    /// Seconds between retry sweeps of the outbox
    pub retry_interval_secs: u64,

    /// Outbox rows picked up per sweep
    pub retry_batch_size: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupplierPortalConfig {
    /// Public base URL the confirmation link points at
    pub base_url: String,

    /// Key for signing supplier confirmation links
    pub link_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("FOS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("email.smtp_port", 587)?
            .set_default("email.from_name", "Furniture Order System")?
            .set_default("email.use_starttls", true)?
            .set_default("email.timeout_secs", 30)?
            .set_default("notification.min_paid_ratio", "0.5")?
            .set_default("notification.max_attempts", 5)?
            .set_default("notification.retry_interval_secs", 60)?
            .set_default("notification.retry_batch_size", 50)?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (FOS__ prefix)
            .add_source(
                Environment::with_prefix("FOS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            min_paid_ratio: Decimal::new(5, 1),
            max_attempts: 5,
            retry_interval_secs: 60,
            retry_batch_size: 50,
        }
    }
}
