use std::future::Future;
use std::time::Duration;

/// Ceiling for the backoff between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    /// Upper bound for a single attempt; `None` waits indefinitely.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            attempt_timeout: None,
        }
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    Failed(E),
    TimedOut,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e}"),
            Self::TimedOut => write!(f, "attempt timed out"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let max_attempts = config.max_attempts.max(1);
    let mut last_err = RetryError::TimedOut;

    for attempt in 1..=max_attempts {
        let outcome = match config.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, f()).await {
                Ok(r) => r.map_err(RetryError::Failed),
                Err(_) => Err(RetryError::TimedOut),
            },
            None => f().await.map_err(RetryError::Failed),
        };

        match outcome {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(attempt, max_attempts, error = %e, "attempt failed");
                last_err = e;
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, config.backoff_factor);
                }
            }
        }
    }

    Err(last_err)
}

fn next_delay(delay: Duration, backoff_factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * backoff_factor)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}
