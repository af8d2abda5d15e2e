use rand::Rng;
use reqwest::header::{ETAG, RETRY_AFTER};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use trailblaze_core::common::error::{FetchError, FetchErrorKind};

use crate::observability::MetricsSink;
use crate::pipeline::ingestion::cache::{ContentCache, Validator};
use crate::pipeline::ingestion::rate_limiter::RateLimiter;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Network,
    Cache,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub etag: Option<String>,
    pub source: FetchSource,
}

pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub deadline: Instant,
    pub allow_cached: bool,
    pub validator: Option<Validator<'a>>,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
}

/// HTTP GET front-end for the pipeline: cache short-circuit, limiter
/// token per attempt, bounded retries with jittered backoff, and a
/// write-through store on success.
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    cache: Arc<ContentCache>,
    config: FetcherConfig,
    metrics: Arc<MetricsSink>,
}

pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .expect("reqwest client construction cannot fail with static options")
}

impl HttpFetcher {
    pub fn new(
        client: reqwest::Client,
        limiter: RateLimiter,
        cache: Arc<ContentCache>,
        config: FetcherConfig,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            client,
            limiter,
            cache,
            config,
            metrics,
        }
    }

    pub async fn get(&self, request: FetchRequest<'_>) -> Result<FetchResponse, FetchError> {
        if request.allow_cached {
            if let Some((record, bytes)) = self.cache.get(request.url, request.validator) {
                debug!(url = request.url, "serving payload from cache");
                self.metrics.incr("fetch_cache_hits", 1);
                return Ok(FetchResponse {
                    status: 200,
                    bytes,
                    etag: record.etag,
                    source: FetchSource::Cache,
                });
            }
        }

        let host = Url::parse(request.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| request.url.to_string());

        let mut attempt: u32 = 0;
        loop {
            if Instant::now() >= request.deadline {
                self.metrics.incr("fetch_timeouts", 1);
                return Err(FetchError::new(request.url, FetchErrorKind::Timeout));
            }

            self.limiter
                .acquire(&host, request.deadline)
                .await
                .map_err(|_| FetchError::new(request.url, FetchErrorKind::Timeout))?;

            self.metrics.incr("fetch_requests", 1);
            match self.attempt(request.url, request.deadline).await {
                Ok(response) => {
                    self.metrics.incr("fetch_success", 1);
                    if let Err(e) = self.cache.put(
                        request.url,
                        &response.bytes,
                        response.etag.clone(),
                        self.config.cache_ttl,
                    ) {
                        warn!(url = request.url, "cache write failed: {e}");
                    }
                    return Ok(response);
                }
                Err(AttemptOutcome::Fatal(error)) => {
                    self.metrics.incr("fetch_errors", 1);
                    return Err(error);
                }
                Err(AttemptOutcome::Retriable { error, retry_after }) => {
                    if attempt >= self.config.max_retries {
                        warn!(
                            url = request.url,
                            attempts = attempt + 1,
                            "retry budget exhausted: {error}"
                        );
                        self.metrics.incr("fetch_errors", 1);
                        return Err(FetchError::new(
                            request.url,
                            FetchErrorKind::ExceededRetries,
                        ));
                    }
                    let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
                    if Instant::now() + delay > request.deadline {
                        self.metrics.incr("fetch_timeouts", 1);
                        return Err(FetchError::new(request.url, FetchErrorKind::Timeout));
                    }
                    info!(
                        url = request.url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after {error}"
                    );
                    self.metrics.incr("fetch_retries", 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Exponential backoff from `base_delay`, jittered ±25%.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((base * jitter) as u64)
    }

    async fn attempt(
        &self,
        url: &str,
        deadline: Instant,
    ) -> Result<FetchResponse, AttemptOutcome> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AttemptOutcome::Fatal(FetchError::new(
                url,
                FetchErrorKind::Timeout,
            )));
        }
        let timeout = remaining.min(self.config.request_timeout);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptOutcome::Retriable {
                        error: FetchError::new(url, FetchErrorKind::Timeout),
                        retry_after: None,
                    }
                } else {
                    AttemptOutcome::Retriable {
                        error: FetchError::new(url, FetchErrorKind::Network(e.to_string())),
                        retry_after: None,
                    }
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 || status >= 500 {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AttemptOutcome::Retriable {
                error: FetchError::new(url, FetchErrorKind::HttpStatus(status)),
                retry_after,
            });
        }
        if !(200..300).contains(&status) {
            return Err(AttemptOutcome::Fatal(FetchError::new(
                url,
                FetchErrorKind::HttpStatus(status),
            )));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptOutcome::Retriable {
                error: FetchError::new(url, FetchErrorKind::Network(e.to_string())),
                retry_after: None,
            })?
            .to_vec();

        Ok(FetchResponse {
            status,
            bytes,
            etag,
            source: FetchSource::Network,
        })
    }
}

enum AttemptOutcome {
    Retriable {
        error: FetchError,
        retry_after: Option<Duration>,
    },
    Fatal(FetchError),
}
