//! Exponential backoff for transient feed fetch failures.
//!
//! Network errors, HTTP 429 and 5xx responses are retried. A 404 or any other
//! non-2xx status is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Upper bound for a single backoff sleep.
const MAX_DELAY_MS: u64 = 5 * 60 * 1000;

/// Executes `operation`, retrying up to `max_retries` additional times on
/// [`FetchError::is_transient`] errors.
///
/// The wait before the n-th retry is `backoff_base_secs * 2^(n-1)` seconds
/// with ±25% jitter, or the server's `Retry-After` when that is longer.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay_ms = backoff_delay_ms(backoff_base_secs, attempt, &err);
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient feed fetch error, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

fn backoff_delay_ms(backoff_base_secs: u64, attempt: u32, err: &FetchError) -> u64 {
    let computed = backoff_base_secs
        .saturating_mul(1000)
        .saturating_mul(1u64 << (attempt - 1).min(20));
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (computed as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;

    let floor = match err {
        FetchError::RateLimited {
            retry_after_secs, ..
        } => retry_after_secs.saturating_mul(1000),
        _ => 0,
    };
    jittered.max(floor).min(MAX_DELAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn rate_limited(retry_after_secs: u64) -> FetchError {
        FetchError::RateLimited {
            url: "https://erp.example/export".to_owned(),
            retry_after_secs,
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, FetchError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FetchError::ServerError {
                        status: 503,
                        url: "https://erp.example/export".to_owned(),
                    })
                } else {
                    Ok::<u32, FetchError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_last_error_after_exhausting_retries() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(2, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, FetchError>(rate_limited(0))
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(FetchError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_not_found() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, FetchError>(FetchError::NotFound {
                    url: "https://erp.example/missing".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::NotFound { .. })));
    }

    #[test]
    fn delay_honours_retry_after_and_cap() {
        assert_eq!(backoff_delay_ms(0, 1, &rate_limited(7)), 7_000);
        assert_eq!(backoff_delay_ms(0, 1, &rate_limited(100_000)), MAX_DELAY_MS);
        let d = backoff_delay_ms(2, 2, &rate_limited(0));
        assert!((3_000..=5_000).contains(&d), "got {d}");
    }
}
