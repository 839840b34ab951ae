//! Backoff for transient API failures: rate limits, 5xx answers, dropped
//! connections and timeouts.

use crate::config::Config;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How often and how patiently a batch request is repeated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total tries, the first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// `RETRY_MAX_ATTEMPTS` tries starting at `RETRY_DELAY_SECS`, doubling
    /// after each failure and capped at eight times the base delay.
    pub fn batch_request(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            initial_delay: config.retry_delay,
            max_delay: config.retry_delay.saturating_mul(8),
        }
    }

    /// Wait before the given try (0-based); the first try goes out at once.
    fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or the attempts run out. The last error is returned.
pub async fn with_retry_if<T, E, F, Fut, P>(
    policy: &RetryConfig,
    label: &str,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{}: succeeded on try {}", label, attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if attempt + 1 < policy.max_attempts && is_transient(&e) => {
                attempt += 1;
                let delay = policy.delay_before(attempt);
                warn!(
                    "{}: {} (retry {}/{} in {:?})",
                    label,
                    e,
                    attempt,
                    policy.max_attempts - 1,
                    delay
                );
                sleep(delay).await;
            }
            Err(e) => {
                if attempt > 0 {
                    warn!("{}: giving up after {} tries", label, attempt + 1);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config_with(max_attempts: &str, delay_secs: &str) -> Config {
        let (max_attempts, delay_secs) = (max_attempts.to_string(), delay_secs.to_string());
        Config::from_lookup(move |name| match name {
            "TRANSLATOR_API_URL" => Some("http://localhost/v1/chat/completions".to_string()),
            "TRANSLATOR_API_KEY" => Some("test-api-key".to_string()),
            "RETRY_MAX_ATTEMPTS" => Some(max_attempts.clone()),
            "RETRY_DELAY_SECS" => Some(delay_secs.clone()),
            _ => None,
        })
        .unwrap()
    }

    fn quick_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(40),
        }
    }

    // ==================== Policy Tests ====================

    #[test]
    fn test_batch_request_from_config() {
        let policy = RetryConfig::batch_request(&config_with("4", "5"));

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_delay, Duration::from_secs(5));
        assert_eq!(policy.max_delay, Duration::from_secs(40));
    }

    #[test]
    fn test_batch_request_backoff_doubles_up_to_cap() {
        let policy = RetryConfig::batch_request(&config_with("10", "5"));

        let delays: Vec<u64> = (0..7).map(|a| policy.delay_before(a).as_secs()).collect();

        assert_eq!(delays, vec![0, 5, 10, 20, 40, 40, 40]);
    }

    #[test]
    fn test_backoff_survives_huge_attempt_numbers() {
        let policy = RetryConfig::batch_request(&config_with("3", "5"));
        assert_eq!(policy.delay_before(200), Duration::from_secs(40));
    }

    // ==================== Retry Loop Tests ====================

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let calls = AtomicU32::new(0);

        let result: Result<&str, String> = with_retry_if(
            &quick_policy(3),
            "batch 1",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("503".to_string())
                    } else {
                        Ok("translated")
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), "translated");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = with_retry_if(
            &quick_policy(5),
            "batch 1",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("401".to_string()) }
            },
            |e: &String| e != "401",
        )
        .await;

        assert_eq!(result.unwrap_err(), "401");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_error_returned_when_attempts_run_out() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = with_retry_if(
            &quick_policy(3),
            "batch 1",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("503 on try {}", n + 1)) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap_err(), "503 on try 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
