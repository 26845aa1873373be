use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::domain::error::AppError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-endpoint leaky-bucket limiter keyed by client identity (§4.10).
/// One instance per endpoint class (register/login/chat/index); `state.rs`
/// wires up one per `RateLimitConfig` field. Striped via `DashMap`, same
/// shape as `services/prompt_cache.rs`'s per-key map.
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
    capacity: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    /// `limit_per_window` requests refill over `window`; the bucket starts
    /// full so the first burst up to `limit_per_window` always succeeds.
    pub fn new(limit_per_window: u32, window: Duration) -> Self {
        let capacity = limit_per_window.max(1) as f64;
        let refill_per_sec = capacity / window.as_secs_f64().max(0.001);

        Self { buckets: DashMap::new(), capacity, refill_per_sec }
    }

    pub fn check(&self, client_id: &str) -> Result<(), AppError> {
        let entry = self
            .buckets
            .entry(client_id.to_string())
            .or_insert_with(|| Mutex::new(Bucket { tokens: self.capacity, last_refill: Instant::now() }));

        let mut bucket = entry.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_secs = (deficit / self.refill_per_sec).ceil() as u64;
            Err(AppError::RateLimited { retry_after_secs: retry_after_secs.max(1) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_up_to_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("client-a").is_ok());
        assert!(limiter.check("client-a").is_ok());
        assert!(limiter.check("client-a").is_ok());
        assert!(limiter.check("client-a").is_err());
    }

    #[test]
    fn distinct_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("client-a").is_ok());
        assert!(limiter.check("client-b").is_ok());
    }

    #[test]
    fn exhausted_bucket_reports_retry_after() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.check("client-a").unwrap();
        match limiter.check("client-a") {
            Err(AppError::RateLimited { retry_after_secs }) => assert!(retry_after_secs > 0),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
