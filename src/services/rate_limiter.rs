//! Login throttling
//!
//! - at most 5 failed attempts per email within 15 minutes
//! - at most 10 login requests per client IP within 1 minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, pruned to a fixed window
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let events = self.events.read().await;
        events
            .get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.limit)
            .unwrap_or(false)
    }

    async fn record(&self, key: K) {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.push(now);
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self) {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

pub struct LoginRateLimiter {
    failures_by_email: SlidingWindow<String>,
    requests_by_ip: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            failures_by_email: SlidingWindow::new(5, Duration::minutes(15)),
            requests_by_ip: SlidingWindow::new(10, Duration::minutes(1)),
        }
    }

    /// Emails are compared case-insensitively
    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.failures_by_email
            .is_limited(&email.trim().to_lowercase())
            .await
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        self.failures_by_email
            .record(email.trim().to_lowercase())
            .await;
    }

    /// Forget failures after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        self.failures_by_email
            .clear(&email.trim().to_lowercase())
            .await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.requests_by_ip.is_limited(&ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.requests_by_ip.record(ip).await;
    }

    /// Drop expired entries; run periodically from a background task
    pub async fn cleanup(&self) {
        self.failures_by_email.prune().await;
        self.requests_by_ip.prune().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_email_limited_after_five_failures() {
        let limiter = LoginRateLimiter::new();

        for _ in 0..4 {
            limiter.record_failed_attempt("player@example.com").await;
            assert!(!limiter.is_email_limited("player@example.com").await);
        }
        limiter.record_failed_attempt("player@example.com").await;
        assert!(limiter.is_email_limited("player@example.com").await);

        limiter.clear_email_attempts("player@example.com").await;
        assert!(!limiter.is_email_limited("player@example.com").await);
    }

    #[tokio::test]
    async fn test_email_is_case_insensitive() {
        let limiter = LoginRateLimiter::new();
        for email in ["A@x.com", "a@x.com", " A@X.COM ", "a@X.com", "a@x.COM"] {
            limiter.record_failed_attempt(email).await;
        }
        assert!(limiter.is_email_limited("a@x.com").await);
        assert!(!limiter.is_email_limited("b@x.com").await);
    }

    #[tokio::test]
    async fn test_ip_limited_after_ten_requests() {
        let limiter = LoginRateLimiter::new();
        let ip = IpAddr::from_str("10.0.0.7").unwrap();
        let other = IpAddr::from_str("10.0.0.8").unwrap();

        for _ in 0..9 {
            limiter.record_ip_request(ip).await;
        }
        assert!(!limiter.is_ip_limited(ip).await);
        limiter.record_ip_request(ip).await;
        assert!(limiter.is_ip_limited(ip).await);
        assert!(!limiter.is_ip_limited(other).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failed_attempt("keep@example.com").await;
        }
        limiter.cleanup().await;
        assert!(limiter.is_email_limited("keep@example.com").await);
    }
}
