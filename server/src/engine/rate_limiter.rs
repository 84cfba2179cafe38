use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Token-bucket limiter keyed by user identity. Guards message appends so a
/// single client cannot flood a room's ledger and every member's outbound
/// queue.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    burst: u32,
    /// Seconds to refill one token.
    refill_seconds: f64,
}

struct Bucket {
    tokens: f64,
    updated: Instant,
}

impl RateLimiter {
    /// `burst` tokens available immediately, one token refilled every
    /// `refill_seconds`.
    pub fn new(burst: u32, refill_seconds: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            burst,
            refill_seconds,
        }
    }

    /// Take one token for `key`. Returns false when the bucket is empty.
    pub fn allow(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst as f64,
            updated: now,
        });

        let refilled = now.duration_since(bucket.updated).as_secs_f64() / self.refill_seconds;
        bucket.tokens = (bucket.tokens + refilled).min(self.burst as f64);
        bucket.updated = now;

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    /// Drop the bucket for `key`. Called when an identity's last session
    /// disconnects so the map does not grow with departed users.
    pub fn forget(&self, key: &str) {
        self.buckets.lock().unwrap().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_deny() {
        let limiter = RateLimiter::new(3, 1.0);
        assert!(limiter.allow("u1"));
        assert!(limiter.allow("u1"));
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, 1.0);
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));
        assert!(limiter.allow("u2"));
    }

    #[test]
    fn test_refill_restores_tokens() {
        let limiter = RateLimiter::new(1, 1.0);
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));

        // Backdate the bucket instead of sleeping.
        {
            let mut buckets = limiter.buckets.lock().unwrap();
            buckets.get_mut("u1").unwrap().updated = Instant::now() - Duration::from_secs(2);
        }
        assert!(limiter.allow("u1"));
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let limiter = RateLimiter::new(2, 1.0);
        assert!(limiter.allow("u1"));
        {
            let mut buckets = limiter.buckets.lock().unwrap();
            buckets.get_mut("u1").unwrap().updated = Instant::now() - Duration::from_secs(60);
        }
        assert!(limiter.allow("u1"));
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));
    }

    #[test]
    fn test_forget_resets_key() {
        let limiter = RateLimiter::new(1, 1.0);
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));
        limiter.forget("u1");
        assert!(limiter.allow("u1"));
    }
}
