use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::metrics::{PerformanceSample, PerformanceSink};

use super::{HttpClient, HttpRequest, HttpResponse, NetworkError};

/// Backoff between attempts. How many attempts to make is decided per
/// call, see [`Transport::send`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
    /// Whether to stretch delays by up to 25%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn from_api_config(api: &ApiConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(api.retry_delay_ms),
            max_delay: Duration::from_millis(api.retry_max_delay_ms),
            backoff_multiplier: 2.0,
            jitter: api.retry_jitter,
        }
    }

    /// Delay for the given retry (0-indexed): `base * multiplier^retry`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let mut delay =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(retry as i32);

        if self.jitter {
            delay *= 1.0 + rand_jitter() * 0.25;
        }

        let capped = delay.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay to wait before attempt `attempt` (1-indexed). The first attempt
    /// goes out immediately; attempt n waits `2^(n-2)` base delays.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        self.delay_for_retry(attempt - 2)
    }
}

/// Simple deterministic jitter based on current timestamp.
/// Returns a value between 0.0 and 1.0.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// How the transport waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Server errors and rate limiting are worth another attempt; every other
/// status goes straight back to the caller.
pub fn is_retriable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Issues requests through an [`HttpClient`], retrying transient failures
/// and timing every attempt into a [`PerformanceSink`].
#[derive(Clone)]
pub struct Transport {
    client: Arc<dyn HttpClient>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn PerformanceSink>,
}

impl Transport {
    pub fn new(
        client: Arc<dyn HttpClient>,
        retry: RetryConfig,
        sink: Arc<dyn PerformanceSink>,
    ) -> Self {
        Self {
            client,
            retry,
            sleeper: Arc::new(TokioSleeper),
            sink,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send with up to `max_retries` total attempts.
    ///
    /// Retries 5xx, 429 and transient network failures. Any other response is
    /// returned as-is for the caller to classify. When attempts run out the
    /// last response or error is returned unchanged.
    pub async fn send(
        &self,
        request: HttpRequest,
        max_retries: u32,
    ) -> Result<HttpResponse, NetworkError> {
        let max_attempts = max_retries.max(1);
        let mut attempt = 1;

        loop {
            let outcome = self.attempt(&request).await;

            let retriable = match &outcome {
                Ok(response) => is_retriable_status(response.status),
                Err(err) => err.is_transient(),
            };

            if !retriable {
                if attempt > 1 {
                    if let Ok(response) = &outcome {
                        info!(
                            url = %request.url,
                            attempt,
                            status = response.status,
                            "Request settled after {} retries",
                            attempt - 1
                        );
                    }
                }
                return outcome;
            }

            if attempt >= max_attempts {
                warn!(
                    url = %request.url,
                    attempts = attempt,
                    "Retries exhausted, surfacing last outcome"
                );
                return outcome;
            }

            attempt += 1;
            let delay = self.retry.delay_before_attempt(attempt);
            match &outcome {
                Ok(response) => warn!(
                    url = %request.url,
                    status = response.status,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retriable status, backing off"
                ),
                Err(err) => warn!(
                    url = %request.url,
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient network failure, backing off"
                ),
            }

            drop(outcome);
            self.sleeper.sleep(delay).await;
        }
    }

    /// Single attempt, no retry. Still timed and recorded.
    pub async fn execute_once(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        self.attempt(&request).await
    }

    async fn attempt(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        let start_time = Utc::now();
        let started = Instant::now();

        let outcome = self.client.execute(request.clone()).await;

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (success, error) = match &outcome {
            Ok(response) if response.is_success() => (true, None),
            Ok(response) => (false, Some(format!("HTTP {}", response.status))),
            Err(err) => (false, Some(err.to_string())),
        };

        debug!(
            url = %request.url,
            method = %request.method,
            success,
            duration_ms,
            "Request attempt finished"
        );

        let end_time = Utc::now();
        self.sink.record(PerformanceSample {
            url: request.url.clone(),
            method: request.method.to_string(),
            start_time,
            end_time,
            duration_ms,
            success,
            error,
            recorded_at: Utc::now(),
        });

        outcome
    }
}
