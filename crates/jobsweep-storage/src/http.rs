//! Shared HTTP fetch behavior for every source adapter.
//!
//! Rate limiting is adapter-driven: each call carries the source's minimum
//! inter-request gap (the adapter's `pace()`), and the fetcher owns the
//! per-source pacing gates that keep that gap honest when tasks fetch
//! concurrently. Transient failures (throttles, upstream outages, connect
//! timeouts) retry a bounded number of times with doubling backoff; client
//! errors surface immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jobsweep_core::DataSource;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Bounded retry for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt: doubles per completed attempt, capped.
    fn backoff_after(&self, completed_attempts: u32) -> Duration {
        let mut wait = self.initial_backoff;
        let mut step = 1;
        while step < completed_attempts && wait < self.backoff_cap {
            wait += wait;
            step += 1;
        }
        wait.min(self.backoff_cap)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Requests in flight across all sources.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            max_in_flight: 8,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::HttpStatus { status: 404, .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::HttpStatus { status: 429, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Request(err) if err.is_timeout())
    }
}

enum Attempt {
    Delivered(FetchedResponse),
    Transient(FetchError),
    Fatal(FetchError),
}

/// One reqwest client behind a global in-flight cap and per-source pacing
/// gates.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Semaphore,
    retry: RetryPolicy,
    /// Earliest allowed instant for the next request, per source.
    slots: Mutex<HashMap<DataSource, Arc<Mutex<Instant>>>>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build().context("building reqwest client")?,
            in_flight: Semaphore::new(config.max_in_flight.max(1)),
            retry: config.retry,
            slots: Mutex::new(HashMap::new()),
        })
    }

    async fn source_slot(&self, source: DataSource) -> Arc<Mutex<Instant>> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(source)
            .or_insert_with(|| Arc::new(Mutex::new(Instant::now())))
            .clone()
    }

    /// Sleep until the source's slot opens, then reserve the next one. The
    /// slot lock is held across the sleep so concurrent tasks queue behind
    /// it and the inter-request gap stays honest.
    async fn pace_source(&self, source: DataSource, gap: Duration) {
        let slot = self.source_slot(source).await;
        let mut next_at = slot.lock().await;
        let now = Instant::now();
        if *next_at > now {
            tokio::time::sleep_until(*next_at).await;
        }
        *next_at = Instant::now() + gap;
    }

    /// GET one URL, pacing requests to `source` at least `pace` apart.
    pub async fn get(
        &self,
        source: DataSource,
        url: &str,
        pace: Duration,
    ) -> Result<FetchedResponse, FetchError> {
        let _permit = self.in_flight.acquire().await.expect("semaphore not closed");

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.pace_source(source, pace).await;

            match self.attempt(url).await {
                Attempt::Delivered(response) => return Ok(response),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Transient(err) => {
                    if attempt >= self.retry.max_attempts.max(1) {
                        return Err(err);
                    }
                    let wait = self.retry.backoff_after(attempt);
                    debug!(
                        source = source.as_str(),
                        url,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        %err,
                        "transient fetch failure, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() || err.is_connect() => {
                return Attempt::Transient(FetchError::Request(err))
            }
            Err(err) => return Attempt::Fatal(FetchError::Request(err)),
        };

        let status = response.status();
        let final_url = response.url().to_string();

        if status.is_success() {
            return match response.bytes().await {
                Ok(body) => Attempt::Delivered(FetchedResponse {
                    status,
                    final_url,
                    body: body.to_vec(),
                }),
                Err(err) => Attempt::Transient(FetchError::Request(err)),
            };
        }

        let err = FetchError::HttpStatus {
            status: status.as_u16(),
            url: final_url,
        };
        // Throttles and upstream outages are worth another attempt; client
        // errors are not.
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Attempt::Transient(err)
        } else {
            Attempt::Fatal(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            backoff_cap: Duration::from_millis(350),
        };

        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_after(10), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_gate_enforces_the_gap_per_source() {
        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("fetcher");
        let started = Instant::now();

        // First request goes straight through and reserves the next slot.
        fetcher
            .pace_source(DataSource::Adzuna, Duration::from_millis(2500))
            .await;
        assert!(started.elapsed() < Duration::from_millis(10));

        // The second waits out the 2.5s gap.
        fetcher
            .pace_source(DataSource::Adzuna, Duration::from_millis(2500))
            .await;
        assert!(started.elapsed() >= Duration::from_millis(2500));

        // Other sources are not held back by adzuna's gate.
        let before_other = started.elapsed();
        fetcher
            .pace_source(DataSource::Greenhouse, Duration::from_millis(500))
            .await;
        assert!(started.elapsed() - before_other < Duration::from_millis(10));
    }

    #[test]
    fn fetch_error_status_helpers() {
        let not_found = FetchError::HttpStatus {
            status: 404,
            url: "https://boards-api.greenhouse.io/v1/boards/nope/jobs".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_rate_limited());

        let throttled = FetchError::HttpStatus {
            status: 429,
            url: "https://api.adzuna.com/v1/api/jobs/gb/search/1".into(),
        };
        assert!(throttled.is_rate_limited());
    }
}
