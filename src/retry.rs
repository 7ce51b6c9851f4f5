use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff policy for calls to peer services.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied per retry
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// URL lookups sit on the read path, so they give up quickly.
    /// Delays: 200ms, 400ms
    pub fn gateway_lookup() -> Self {
        Self::new(3, Duration::from_millis(200)).with_max_delay(Duration::from_secs(1))
    }

    /// Orphan deletes run after the record is persisted.
    /// Delays: 500ms, 1s, 2s
    pub fn blob_delete() -> Self {
        Self::new(4, Duration::from_millis(500)).with_max_delay(Duration::from_secs(2))
    }

    /// Delay before the given attempt (0-indexed); the first attempt never waits.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::gateway_lookup()
    }
}

/// Run `operation` until it succeeds, attempts run out, or `should_retry`
/// rejects an error. Returns the last error on failure.
///
/// # Panics
/// Panics if `config.max_attempts` is 0
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    assert!(
        config.max_attempts >= 1,
        "RetryConfig.max_attempts must be >= 1, got {}",
        config.max_attempts
    );

    let mut attempt = 0;
    loop {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts = config.max_attempts,
                "Retrying after {:?}",
                delay
            );
            sleep(delay).await;
        }

        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !should_retry(&error) {
            debug!(operation = operation_name, "Not retryable: {}", error);
            return Err(error);
        }

        attempt += 1;
        if attempt >= config.max_attempts {
            warn!(
                operation = operation_name,
                "All {} attempts failed. Last error: {}", config.max_attempts, error
            );
            return Err(error);
        }
        warn!(
            operation = operation_name,
            "Attempt {}/{} failed ({})", attempt, config.max_attempts, error
        );
    }
}
