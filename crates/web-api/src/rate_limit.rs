//! 基于 IP+路径的令牌桶限速
//!
//! 每个键一个桶，按流逝时间补充令牌；后台任务周期清理长期未访问的桶。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

const GC_INTERVAL: Duration = Duration::from_secs(30);

struct Bucket {
    tokens: f64,
    refreshed: Instant,
    seen: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    rate: f64,
    burst: f64,
    ttl: Duration,
}

impl RateLimiter {
    /// `rate` 为每秒补充的令牌数，`burst` 为桶容量。
    pub fn new(rate: f64, burst: f64, ttl: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate,
            burst,
            ttl,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            refreshed: now,
            seen: now,
        });

        let elapsed = now.saturating_duration_since(bucket.refreshed).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.refreshed = now;
        bucket.seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn sweep(&self, now: Instant) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.seen) <= self.ttl);
    }
}

/// 启动后台清理任务。
pub fn start_gc(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(GC_INTERVAL);
        loop {
            ticker.tick().await;
            limiter.sweep(Instant::now());
        }
    });
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    if !limiter.allow(&format!("{ip}|{path}")) {
        return ApiError::new(StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_consumed_then_denied() {
        let limiter = RateLimiter::new(1.0, 2.0, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.allow_at("k", now));
        assert!(limiter.allow_at("k", now));
        assert!(!limiter.allow_at("k", now));

        // 1 秒补充一个令牌
        assert!(limiter.allow_at("k", now + Duration::from_secs(1)));
        assert!(!limiter.allow_at("k", now + Duration::from_secs(1)));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1.0, 1.0, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.allow_at("a|/x", now));
        assert!(!limiter.allow_at("a|/x", now));
        assert!(limiter.allow_at("b|/x", now));
    }

    #[test]
    fn sweep_discards_idle_buckets() {
        let limiter = RateLimiter::new(1.0, 1.0, Duration::from_secs(10));
        let now = Instant::now();

        assert!(limiter.allow_at("idle", now));
        limiter.sweep(now + Duration::from_secs(11));

        // 桶被回收后重新获得完整 burst
        assert!(limiter.allow_at("idle", now + Duration::from_secs(11)));
    }
}
