//! Worker-facing authentication and rate limiting.
//!
//! Job surfaces require the shared `X-App-Key` header. Requests are counted
//! in a sliding window keyed by app-key + client IP; breaching the window
//! blocks the key for a fixed duration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::WorkerAuthConfig;
use crate::error::{AppError, Result};

const CRAWLER_ID_HEADER: &str = "x-crawler-id";
const APP_KEY_HEADER: &str = "x-app-key";

/// Sliding-window limiter with temporary blocking.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    block: Duration,
    requests: DashMap<String, Vec<Instant>>,
    blocked: DashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, block: Duration) -> Self {
        Self {
            limit,
            window,
            block,
            requests: DashMap::new(),
            blocked: DashMap::new(),
        }
    }

    /// Record one request for `key`; false means over the limit or blocked.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();

        if let Some(until) = self.blocked.get(key) {
            if *until > now {
                return false;
            }
        }
        self.blocked.remove(key);

        let mut entry = self.requests.entry(key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);

        if entry.len() as u32 >= self.limit {
            self.blocked.insert(key.to_string(), now + self.block);
            return false;
        }

        entry.push(now);
        true
    }

    /// Drop stale request records and expired blocks.
    pub fn clean(&self) {
        let now = Instant::now();
        self.blocked.retain(|_, until| *until > now);
        self.requests.retain(|_, times| {
            times.retain(|t| now.duration_since(*t) < self.window);
            !times.is_empty()
        });
    }
}

/// Authenticated worker identity attached to the request extensions.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub app_key: String,
    pub crawler_id: String,
}

impl WorkerIdentity {
    pub fn from_parts(parts: &Parts) -> Option<Self> {
        parts.extensions.get::<WorkerIdentity>().cloned()
    }
}

/// Middleware guarding every `/api/jobs` route.
pub async fn app_key_middleware(
    State((config, limiter)): State<(Arc<WorkerAuthConfig>, Arc<RateLimiter>)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let app_key = request
        .headers()
        .get(APP_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(AppError::AppKeyRequired)?;

    let rate_key = format!("{}:{}", app_key, addr.ip());
    if !limiter.check(&rate_key) {
        tracing::warn!(ip = %addr.ip(), "Worker rate limit exceeded");
        return Err(AppError::RateLimitExceeded {
            retry_after: Some(config.rate_limit_block.as_secs()),
        });
    }

    if !config.app_keys.iter().any(|k| k == &app_key) {
        tracing::warn!(ip = %addr.ip(), "Invalid worker app key");
        return Err(AppError::AppKeyInvalid);
    }

    let crawler_id = request
        .headers()
        .get(CRAWLER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string());

    request.extensions_mut().insert(WorkerIdentity { app_key, crawler_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), Duration::from_secs(60));
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        // Fourth request inside the window trips the limiter and blocks.
        assert!(!limiter.check("k"));
        assert!(!limiter.check("k"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
        assert!(!limiter.check("a"));
        assert!(!limiter.check("b"));
    }

    #[test]
    fn window_expiry_frees_the_key() {
        let limiter = RateLimiter::new(2, Duration::from_millis(10), Duration::from_millis(10));
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check("k"));
    }

    #[test]
    fn clean_drops_empty_entries() {
        let limiter = RateLimiter::new(5, Duration::from_millis(5), Duration::from_millis(5));
        limiter.check("k");
        std::thread::sleep(Duration::from_millis(10));
        limiter.clean();
        assert!(limiter.requests.is_empty());
    }
}
