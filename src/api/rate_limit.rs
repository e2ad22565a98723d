//! Per-client request budgets.
//!
//! Each (client IP, tier) pair holds a bucket of tokens that refills
//! continuously over the configured window. Login and signup share the
//! stricter `Auth` tier; everything else under the API uses `Api`.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    Api,
    Auth,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Remaining budget after an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<(IpAddr, RateLimitTier), Bucket>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Take one token for `(ip, tier)`.
    /// Returns the seconds to wait when the bucket is empty.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<Allowance, u64> {
        let limit = self.limit_for(tier);
        if !self.config.enabled {
            return Ok(Allowance {
                limit,
                remaining: limit,
            });
        }

        let capacity = f64::from(limit);
        let per_second = capacity / self.window.as_secs_f64();
        let now = Instant::now();

        let mut bucket = self.buckets.entry((ip, tier)).or_insert_with(|| Bucket {
            tokens: capacity,
            refilled_at: now,
        });

        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * per_second).min(capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(Allowance {
                limit,
                remaining: bucket.tokens.floor() as u32,
            })
        } else if per_second > 0.0 {
            let wait = ((1.0 - bucket.tokens) / per_second).ceil() as u64;
            Err(wait.max(1))
        } else {
            Err(self.window.as_secs())
        }
    }

    /// Forget buckets that have been idle long enough to be full again
    pub fn cleanup_expired(&self) -> usize {
        let before = self.buckets.len();
        let window = self.window;
        self.buckets
            .retain(|_, bucket| bucket.refilled_at.elapsed() < window);
        before - self.buckets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Client address. Forwarding headers are only believed when the socket
/// peer is a trusted proxy; the nearest untrusted hop in `X-Forwarded-For`
/// is the client.
fn client_ip(request: &Request<Body>, trusted_proxies: &[IpAddr]) -> IpAddr {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.rsplit(',')
                .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
                .find(|hop| !trusted_proxies.contains(hop))
        });
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    forwarded.or_else(real_ip).unwrap_or(peer)
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(&state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(&state, request, next, RateLimitTier::Auth).await
}

async fn limit_tier(
    state: &AppState,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let ip = client_ip(&request, &state.config.rate_limit.trusted_proxies);

    match state.rate_limiter.check(ip, tier) {
        Ok(allowance) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(allowance.limit));
            headers.insert(
                "x-ratelimit-remaining",
                HeaderValue::from(allowance.remaining),
            );
            response
        }
        Err(retry_after) => {
            tracing::warn!(client = %ip, ?tier, retry_after, "Rate limit exceeded");
            let mut response = ApiError::rate_limited(format!(
                "Too many requests. Try again in {} seconds.",
                retry_after
            ))
            .into_response();
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(retry_after));
            response
        }
    }
}
