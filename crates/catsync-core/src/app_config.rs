use std::path::PathBuf;

use crate::catalog::PriceTypeCode;

/// Deployment environment, from `CATSYNC_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }

    /// Production logs go to collectors that do not render ANSI colour.
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub feeds_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub feed_request_timeout_secs: u64,
    pub feed_user_agent: String,
    pub feed_max_retries: u32,
    pub feed_retry_backoff_base_secs: u64,
    /// Currency applied to feed prices that do not state one.
    pub default_currency: String,
    /// Price-type codes the catalog accepts; anything else in a feed is dropped.
    pub price_types: Vec<PriceTypeCode>,
    /// Six-field cron expression for scheduled synchronisation.
    pub sync_cron: String,
    pub notify_webhook_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("feeds_path", &self.feeds_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("feed_request_timeout_secs", &self.feed_request_timeout_secs)
            .field("feed_user_agent", &self.feed_user_agent)
            .field("feed_max_retries", &self.feed_max_retries)
            .field(
                "feed_retry_backoff_base_secs",
                &self.feed_retry_backoff_base_secs,
            )
            .field("default_currency", &self.default_currency)
            .field("price_types", &self.price_types)
            .field("sync_cron", &self.sync_cron)
            .field(
                "notify_webhook_url",
                &self.notify_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
