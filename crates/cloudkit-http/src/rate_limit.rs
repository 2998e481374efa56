//! Proactive rate limiting and adaptive throttling.
//!
//! Generic across providers: each adapter acquires against a logical
//! endpoint category ("delta", "upload", "download", "metadata", …) before
//! sending, and reports throttle/success back so the bucket adapts.
//!
//! - [`TokenBucket`]: classic token bucket for one endpoint category.
//! - [`AdaptiveRateLimiter`]: owns one bucket per category, with adaptive
//!   capacity adjustment based on server responses (429 throttle / success).

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

/// Internal mutable state for the token bucket, protected by a Mutex.
#[derive(Debug)]
struct TokenBucketInner {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter for a single endpoint category.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    effective_capacity: Mutex<u32>,
    refill_rate: f64,
    inner: Mutex<TokenBucketInner>,
    success_count: Mutex<u64>,
    original_capacity: u32,
}

impl TokenBucket {
    /// Creates a new bucket, starting full (`tokens == capacity`).
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            effective_capacity: Mutex::new(capacity),
            refill_rate,
            inner: Mutex::new(TokenBucketInner {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
            success_count: Mutex::new(0),
            original_capacity: capacity,
        }
    }

    fn refill(inner: &mut TokenBucketInner, refill_rate: f64, effective_capacity: u32) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(inner.last_refill).as_secs_f64();
        if elapsed_secs > 0.0 {
            let new_tokens = elapsed_secs * refill_rate;
            inner.tokens = (inner.tokens + new_tokens).min(effective_capacity as f64);
            inner.last_refill = now;
        }
    }

    /// Attempts to acquire a single token without blocking.
    pub fn try_acquire(&self) -> bool {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);

        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait in seconds until a token becomes available.
    pub fn time_until_available(&self) -> f64 {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);

        if inner.tokens >= 1.0 {
            0.0
        } else {
            let deficit = 1.0 - inner.tokens;
            if self.refill_rate > 0.0 {
                deficit / self.refill_rate
            } else {
                f64::MAX
            }
        }
    }

    pub fn available_tokens(&self) -> f64 {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);
        inner.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        *self.effective_capacity.lock().unwrap()
    }

    /// Records a success; every 100 consecutive successes the effective
    /// capacity recovers by 5%, capped at the original capacity.
    pub fn on_success(&self) {
        let mut count = self.success_count.lock().unwrap();
        *count += 1;

        if *count % 100 == 0 {
            let mut eff_cap = self.effective_capacity.lock().unwrap();
            if *eff_cap < self.original_capacity {
                let increase = (*eff_cap as f64 * 0.05).max(1.0) as u32;
                let new_cap = (*eff_cap + increase).min(self.original_capacity);
                debug!(old_capacity = *eff_cap, new_capacity = new_cap, "rate limit recovery");
                *eff_cap = new_cap;
            }
        }
    }

    /// Records a 429 and halves the effective capacity (minimum 1).
    pub fn on_throttle(&self) {
        let mut eff_cap = self.effective_capacity.lock().unwrap();
        let old = *eff_cap;
        *eff_cap = (*eff_cap / 2).max(1);
        warn!(old_capacity = old, new_capacity = *eff_cap, "throttled, halving capacity");

        let mut count = self.success_count.lock().unwrap();
        *count = 0;
    }
}

/// Marker returned after acquiring a token. The bucket already subtracted
/// the token on acquisition; this exists as a seam for future per-request
/// tracking.
#[derive(Debug)]
pub struct RateLimitGuard {
    _endpoint: String,
}

impl RateLimitGuard {
    fn new(endpoint: String) -> Self {
        Self { _endpoint: endpoint }
    }
}

/// Configuration for the adaptive rate limiter: default bucket parameters
/// plus per-endpoint-category overrides.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_capacity: u32,
    pub default_refill_rate: f64,
    pub endpoint_overrides: HashMap<String, (u32, f64)>,
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert("delta".to_string(), (10, 10.0 / 60.0));
        overrides.insert("upload".to_string(), (60, 1.0));
        overrides.insert("download".to_string(), (120, 2.0));
        overrides.insert("metadata".to_string(), (100, 100.0 / 60.0));

        Self {
            default_capacity: 600,
            default_refill_rate: 10.0,
            endpoint_overrides: overrides,
            max_retries: 5,
        }
    }
}

/// Adaptive rate limiter managing one token bucket per endpoint category.
/// Thread-safe; shared via `Arc<AdaptiveRateLimiter>` across an engine and
/// every provider built on it.
pub struct AdaptiveRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter").field("config", &self.config).finish()
    }
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    fn get_or_create_bucket<F, R>(&self, endpoint: &str, f: F) -> R
    where
        F: FnOnce(&TokenBucket) -> R,
    {
        let mut buckets = self.buckets.lock().unwrap();
        if !buckets.contains_key(endpoint) {
            let (capacity, refill_rate) = self
                .config
                .endpoint_overrides
                .get(endpoint)
                .copied()
                .unwrap_or((self.config.default_capacity, self.config.default_refill_rate));
            buckets.insert(endpoint.to_string(), TokenBucket::new(capacity, refill_rate));
        }
        f(buckets.get(endpoint).unwrap())
    }

    /// Acquires a token, sleeping (yielding to tokio) until one is available.
    pub async fn acquire(&self, endpoint: &str) -> RateLimitGuard {
        loop {
            let acquired = self.get_or_create_bucket(endpoint, |bucket| bucket.try_acquire());
            if acquired {
                return RateLimitGuard::new(endpoint.to_string());
            }
            let wait_secs = self.get_or_create_bucket(endpoint, |bucket| bucket.time_until_available());
            tokio::time::sleep(Duration::from_secs_f64(wait_secs.max(0.01))).await;
        }
    }

    pub fn on_success(&self, endpoint: &str) {
        self.get_or_create_bucket(endpoint, |bucket| bucket.on_success());
    }

    pub fn on_throttle(&self, endpoint: &str) {
        info!(endpoint, "recording throttle event");
        self.get_or_create_bucket(endpoint, |bucket| bucket.on_throttle());
    }

    pub fn available_tokens(&self, endpoint: &str) -> Option<f64> {
        self.buckets.lock().unwrap().get(endpoint).map(|b| b.available_tokens())
    }

    pub fn effective_capacity(&self, endpoint: &str) -> Option<u32> {
        self.buckets.lock().unwrap().get(endpoint).map(|b| b.effective_capacity())
    }
}

/// Parses a `Retry-After` header: either an integer number of seconds or
/// an HTTP-date. Falls back to `default` when unparsable.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let diff = target - now;
            if let Some(secs) = diff.num_seconds().try_into().ok().filter(|&s: &u64| s <= 3600) {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "could not parse Retry-After, using default");
    default
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn try_acquire_succeeds_until_empty() {
        let bucket = TokenBucket::new(2, 0.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn refill_adds_tokens_over_time() {
        let bucket = TokenBucket::new(10, 100.0);
        for _ in 0..10 {
            bucket.try_acquire();
        }
        assert!(!bucket.try_acquire());
        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn throttle_halves_and_success_recovers() {
        let bucket = TokenBucket::new(100, 1.0);
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 50);
        for _ in 0..100 {
            bucket.on_success();
        }
        assert!(bucket.effective_capacity() > 50);
    }

    #[test]
    fn throttle_never_drops_below_one() {
        let bucket = TokenBucket::new(1, 1.0);
        bucket.on_throttle();
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 1);
    }

    #[tokio::test]
    async fn acquire_creates_bucket_lazily() {
        let limiter = AdaptiveRateLimiter::with_defaults();
        assert!(limiter.available_tokens("custom").is_none());
        let _guard = limiter.acquire("custom").await;
        assert!(limiter.available_tokens("custom").is_some());
    }

    #[tokio::test]
    async fn endpoints_throttle_independently() {
        let limiter = AdaptiveRateLimiter::with_defaults();
        let _g1 = limiter.acquire("delta").await;
        let _g2 = limiter.acquire("upload").await;
        limiter.on_throttle("delta");
        assert!(limiter.effective_capacity("upload").unwrap() > limiter.effective_capacity("delta").unwrap());
    }

    #[tokio::test]
    async fn concurrent_acquire_is_safe() {
        let limiter = Arc::new(AdaptiveRateLimiter::new(RateLimitConfig {
            default_capacity: 50,
            default_refill_rate: 100.0,
            endpoint_overrides: HashMap::new(),
            max_retries: 3,
        }));
        let mut handles = Vec::new();
        for i in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let _guard = limiter.acquire("concurrent").await;
                i
            }));
        }
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results.len(), 20);
    }

    #[test]
    fn parse_retry_after_prefers_integer_seconds() {
        assert_eq!(parse_retry_after("30", Duration::from_secs(60)), Duration::from_secs(30));
    }

    #[test]
    fn parse_retry_after_falls_back_on_garbage() {
        let default = Duration::from_secs(60);
        assert_eq!(parse_retry_after("not-a-number", default), default);
    }
}
