//! Environment-driven configuration.

use crate::app_config::{AppConfig, Environment};
use crate::catalog::PriceTypeCode;
use crate::ConfigError;

/// Reads `.env` (if present) and then the process environment.
///
/// # Errors
///
/// Returns `ConfigError` if a required variable is missing or a value does
/// not parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Like [`load_app_config`] but without touching `.env`.
///
/// # Errors
///
/// Returns `ConfigError` if a required variable is missing or a value does
/// not parse.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("CATSYNC_ENV", "development"));
    let log_level = or_default("CATSYNC_LOG_LEVEL", "info");
    let feeds_path = PathBuf::from(or_default("CATSYNC_FEEDS_PATH", "./config/feeds.yaml"));

    let db_max_connections = parse_u32("CATSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CATSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CATSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    if db_max_connections == 0 {
        return Err(invalid(
            "CATSYNC_DB_MAX_CONNECTIONS",
            "must be at least 1".to_string(),
        ));
    }

    let feed_request_timeout_secs = parse_u64("CATSYNC_FEED_REQUEST_TIMEOUT_SECS", "60")?;
    let feed_user_agent = or_default("CATSYNC_FEED_USER_AGENT", "catsync/0.1 (catalog-sync)");
    let feed_max_retries = parse_u32("CATSYNC_FEED_MAX_RETRIES", "3")?;
    let feed_retry_backoff_base_secs = parse_u64("CATSYNC_FEED_RETRY_BACKOFF_BASE_SECS", "5")?;

    let default_currency = or_default("CATSYNC_DEFAULT_CURRENCY", "UAH");
    if default_currency.len() != 3 || !default_currency.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(invalid(
            "CATSYNC_DEFAULT_CURRENCY",
            format!("{default_currency:?} is not a 3-letter currency code"),
        ));
    }
    let default_currency = default_currency.to_ascii_uppercase();

    let price_types = parse_price_types(&or_default("CATSYNC_PRICE_TYPES", "1,2,3"))
        .map_err(|reason| invalid("CATSYNC_PRICE_TYPES", reason))?;

    let sync_cron = or_default("CATSYNC_SYNC_CRON", "0 0 * * * *");
    let notify_webhook_url = lookup("CATSYNC_NOTIFY_WEBHOOK_URL")
        .ok()
        .filter(|url| !url.trim().is_empty());

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        feeds_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        feed_request_timeout_secs,
        feed_user_agent,
        feed_max_retries,
        feed_retry_backoff_base_secs,
        default_currency,
        price_types,
        sync_cron,
        notify_webhook_url,
    })
}

/// Unrecognized values fall back to development.
fn parse_environment(s: &str) -> Environment {
    match s.trim().to_ascii_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::default(),
    }
}

/// Parse a comma-separated list of price-type codes, e.g. `"1,2,3"`.
fn parse_price_types(raw: &str) -> Result<Vec<PriceTypeCode>, String> {
    let mut codes = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let code = part.parse::<PriceTypeCode>().map_err(|e| e.to_string())?;
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    if codes.is_empty() {
        return Err("at least one price type code is required".to_string());
    }
    codes.sort_unstable();
    Ok(codes)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
