//! Exponential backoff for requests to the generation server.
//!
//! A local server that is still loading a model answers 503 or refuses the
//! connection for a while, so those are retried. Client errors are not.

use anyhow::Result;
use reqwest::{Response, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt, for probes that should answer quickly.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_factor).min(self.max_delay.as_secs_f64()),
        )
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Run `operation` until it yields a success response, a non-retryable
/// status, or the attempts run out.
pub async fn with_retry<F, Fut>(config: &RetryConfig, service: &str, operation: F) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Response>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(response) if response.status().is_success() => {
                if attempt > 1 {
                    tracing::info!("{} answered on attempt {}", service, attempt);
                }
                return Ok(response);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !is_retryable_status(status) {
                    anyhow::bail!("{} error ({}): {}", service, status, body);
                }
                tracing::warn!(
                    "{} returned {} (attempt {}/{}): {}",
                    service,
                    status,
                    attempt,
                    config.max_attempts,
                    body.chars().take(200).collect::<String>()
                );
                last_error = format!("{} ({}): {}", service, status, body);
            }
            Err(e) => {
                tracing::warn!(
                    "{} unreachable (attempt {}/{}): {:#}",
                    service,
                    attempt,
                    config.max_attempts,
                    e
                );
                last_error = format!("{}: {:#}", service, e);
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(delay).await;
            delay = config.next_delay(delay);
        }
    }

    anyhow::bail!(
        "Gave up after {} attempt(s). Last error: {}",
        config.max_attempts,
        last_error
    )
}
