use crate::core::{AppError, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
}

/// Ledger-specific knobs
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Bounded retries for receipt-number collisions before the random
    /// suffix fallback kicks in
    pub receipt_number_max_attempts: u32,

    /// What happens to active receipts when their collection is cancelled
    pub cancel_cascade_policy: CancelCascadePolicy,
}

/// Named policy for the collection-cancellation / receipt asymmetry.
///
/// The default keeps receipts untouched when a collection is cancelled;
/// reversing them stays a separate, explicit action. `Cascade` marks the
/// collection's active receipts cancelled along with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelCascadePolicy {
    RetainReceipts,
    Cascade,
}

impl FromStr for CancelCascadePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "retain-receipts" => Ok(CancelCascadePolicy::RetainReceipts),
            "cascade" => Ok(CancelCascadePolicy::Cascade),
            _ => Err(format!("Invalid cancel cascade policy: {}", s)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            ledger: LedgerConfig {
                receipt_number_max_attempts: env::var("RECEIPT_NUMBER_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid RECEIPT_NUMBER_MAX_ATTEMPTS".to_string())
                    })?,
                cancel_cascade_policy: env::var("CANCEL_CASCADE_POLICY")
                    .unwrap_or_else(|_| "retain-receipts".to_string())
                    .parse()
                    .map_err(AppError::Configuration)?,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ledger.receipt_number_max_attempts == 0 {
            return Err(AppError::Configuration(
                "Receipt number retry attempts must be greater than 0".to_string(),
            ));
        }

        if self.server.workers == 0 {
            return Err(AppError::Configuration(
                "Server workers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
