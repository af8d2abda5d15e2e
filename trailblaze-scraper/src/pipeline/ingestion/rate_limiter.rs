use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use trailblaze_core::common::error::{FetchError, FetchErrorKind, Result, ScraperError};

/// Process-wide token-bucket governor, one bucket per remote host.
/// Acquisition blocks until a token is available or the caller's
/// deadline would be blown.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    requests_per_second: f64,
    burst: f64,
    // host -> (tokens, last refill)
    buckets: Mutex<HashMap<String, (f64, Instant)>>,
    waits: AtomicU64,
    wait_time_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                requests_per_second,
                burst: f64::from(burst),
                buckets: Mutex::new(HashMap::new()),
                waits: AtomicU64::new(0),
                wait_time_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Take one token for `host`, sleeping as needed. Errs with a
    /// timeout once the required wait would pass `deadline`.
    pub async fn acquire(&self, host: &str, deadline: Instant) -> Result<()> {
        loop {
            let wait = {
                let mut buckets = self.inner.buckets.lock().await;
                let now = Instant::now();
                let (tokens, last) = buckets
                    .entry(host.to_string())
                    .or_insert((self.inner.burst, now));
                let elapsed = now.duration_since(*last).as_secs_f64();
                *tokens = (*tokens + elapsed * self.inner.requests_per_second)
                    .min(self.inner.burst);
                *last = now;
                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    return Ok(());
                }
                let need = 1.0 - *tokens;
                Duration::from_secs_f64(need / self.inner.requests_per_second)
            };

            if Instant::now() + wait > deadline {
                return Err(ScraperError::Fetch(FetchError::new(
                    host,
                    FetchErrorKind::Timeout,
                )));
            }
            self.inner.waits.fetch_add(1, Ordering::Relaxed);
            self.inner
                .wait_time_ms
                .fetch_add(wait.as_millis() as u64, Ordering::Relaxed);
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    pub fn waits(&self) -> u64 {
        self.inner.waits.load(Ordering::Relaxed)
    }

    pub fn wait_time_ms(&self) -> u64 {
        self.inner.wait_time_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_free_then_waits() {
        let limiter = RateLimiter::new(1000.0, 2);
        let deadline = Instant::now() + Duration::from_secs(1);

        limiter.acquire("aerc.org", deadline).await.unwrap();
        limiter.acquire("aerc.org", deadline).await.unwrap();
        assert_eq!(limiter.waits(), 0);

        limiter.acquire("aerc.org", deadline).await.unwrap();
        assert!(limiter.waits() >= 1);
    }

    #[tokio::test]
    async fn hosts_have_independent_buckets() {
        let limiter = RateLimiter::new(1000.0, 1);
        let deadline = Instant::now() + Duration::from_secs(1);

        limiter.acquire("a.example.com", deadline).await.unwrap();
        limiter.acquire("b.example.com", deadline).await.unwrap();
        assert_eq!(limiter.waits(), 0);
    }

    #[tokio::test]
    async fn acquire_respects_deadline() {
        // One token per hour: the second acquire cannot succeed in time.
        let limiter = RateLimiter::new(1.0 / 3600.0, 1);
        let deadline = Instant::now() + Duration::from_millis(20);

        limiter.acquire("slow.example.com", deadline).await.unwrap();
        let err = limiter.acquire("slow.example.com", deadline).await;
        match err {
            Err(ScraperError::Fetch(e)) => assert_eq!(e.kind, FetchErrorKind::Timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
