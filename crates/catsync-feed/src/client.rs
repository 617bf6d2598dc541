use std::time::Duration;

use catsync_core::AppConfig;
use reqwest::{Client, StatusCode};

use crate::error::FetchError;
use crate::retry::retry_with_backoff;

/// HTTP client for ERP export endpoints.
///
/// Returns the raw payload; format detection and parsing happen in
/// [`crate::parse`]. Transient failures (network errors, 429, 5xx) are retried
/// with exponential backoff up to `max_retries` additional attempts.
pub struct FeedClient {
    client: Client,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl FeedClient {
    /// Creates a `FeedClient` with configured timeout, `User-Agent`, and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_secs,
        })
    }

    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the client cannot be constructed.
    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        Self::new(
            config.feed_request_timeout_secs,
            &config.feed_user_agent,
            config.feed_max_retries,
            config.feed_retry_backoff_base_secs,
        )
    }

    /// Downloads one feed payload.
    ///
    /// # Errors
    ///
    /// - [`FetchError::RateLimited`] or [`FetchError::ServerError`] after all
    ///   retries are exhausted.
    /// - [`FetchError::NotFound`] on 404 (not retried).
    /// - [`FetchError::UnexpectedStatus`] on any other non-2xx status (not retried).
    /// - [`FetchError::Http`] on network or TLS failure after all retries.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        retry_with_backoff(self.max_retries, self.backoff_base_secs, || async move {
            let response = self.client.get(url).send().await?;
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            check_status(response.status(), retry_after, url)?;

            let body = response.bytes().await?;
            tracing::debug!(url, bytes = body.len(), "feed downloaded");
            Ok(body.to_vec())
        })
        .await
    }
}

/// Maps a non-2xx status to the error the retry loop classifies.
fn check_status(status: StatusCode, retry_after: Option<u64>, url: &str) -> Result<(), FetchError> {
    let url = url.to_owned();
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited {
            url,
            retry_after_secs: retry_after.unwrap_or(0),
        }),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound { url }),
        s if s.is_server_error() => Err(FetchError::ServerError {
            status: s.as_u16(),
            url,
        }),
        s => Err(FetchError::UnexpectedStatus {
            status: s.as_u16(),
            url,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://erp.example/export.xml";

    #[test]
    fn success_passes() {
        assert!(check_status(StatusCode::OK, None, URL).is_ok());
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = check_status(StatusCode::TOO_MANY_REQUESTS, Some(12), URL).unwrap_err();
        assert!(matches!(
            err,
            FetchError::RateLimited {
                retry_after_secs: 12,
                ..
            }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let not_found = check_status(StatusCode::NOT_FOUND, None, URL).unwrap_err();
        let forbidden = check_status(StatusCode::FORBIDDEN, None, URL).unwrap_err();
        assert!(!not_found.is_transient());
        assert!(matches!(
            forbidden,
            FetchError::UnexpectedStatus { status: 403, .. }
        ));
    }

    #[test]
    fn bad_gateway_is_transient() {
        let err = check_status(StatusCode::BAD_GATEWAY, None, URL).unwrap_err();
        assert!(err.is_transient());
    }
}
