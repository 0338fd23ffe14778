//! Sliding-window rate limiting.
//!
//! Every (tier, subject) pair keeps the request count of the current fixed
//! window and of the one before it. A request is admitted while
//! `previous * overlap + current` stays under the tier's limit, where
//! `overlap` is the share of the previous window still inside the sliding
//! window. Subjects are client addresses for the route-level tiers, an
//! email plus address for login attempts and the account id for booking
//! requests.

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Extensions, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::db::User;
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Every `/api` route, per client address
    Api,
    /// `/api/auth` routes, per client address
    Auth,
    /// Login attempts, per email and client address
    Login,
    /// Booking requests, per client account
    Booking,
}

impl RateLimitTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Auth => "auth",
            Self::Login => "login",
            Self::Booking => "booking",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: Instant,
    current: u32,
    previous: u32,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            current: 0,
            previous: 0,
        }
    }

    /// Roll forward so that `now` falls inside the current window
    fn advance(&mut self, now: Instant, window: Duration) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < window {
            return;
        }

        let skipped = (elapsed.as_nanos() / window.as_nanos()) as u32;
        self.previous = if skipped == 1 { self.current } else { 0 };
        self.current = 0;
        self.window_start += window * skipped;
    }

    /// Requests counted against the sliding window ending at `now`
    fn weighted(&self, now: Instant, window: Duration) -> f64 {
        let into = now.saturating_duration_since(self.window_start).as_secs_f64()
            / window.as_secs_f64();
        self.previous as f64 * (1.0 - into).max(0.0) + self.current as f64
    }

    fn seconds_left(&self, now: Instant, window: Duration) -> u64 {
        let end = self.window_start + window;
        end.saturating_duration_since(now).as_secs_f64().ceil().max(1.0) as u64
    }
}

/// Outcome of an admitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window rolls over
    pub reset_after: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    counters: DashMap<(RateLimitTier, String), WindowCounter>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            counters: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    pub fn limit(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
            RateLimitTier::Login => self.config.login_attempts_per_window,
            RateLimitTier::Booking => self.config.booking_requests_per_window,
        }
    }

    /// Count a request from `subject`. `Err` carries the seconds to wait.
    pub fn check(&self, tier: RateLimitTier, subject: &str) -> Result<RateLimitInfo, u64> {
        self.check_at(tier, subject, Instant::now())
    }

    fn check_at(&self, tier: RateLimitTier, subject: &str, now: Instant) -> Result<RateLimitInfo, u64> {
        let limit = self.limit(tier);
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                limit,
                remaining: limit,
                reset_after: 0,
            });
        }

        let mut counter = self
            .counters
            .entry((tier, subject.to_string()))
            .or_insert_with(|| WindowCounter::new(now));
        counter.advance(now, self.window);

        let used = counter.weighted(now, self.window);
        let reset_after = counter.seconds_left(now, self.window);
        if used + 1.0 > limit as f64 {
            return Err(reset_after);
        }

        counter.current += 1;
        Ok(RateLimitInfo {
            limit,
            remaining: (limit as f64 - used - 1.0).floor().max(0.0) as u32,
            reset_after,
        })
    }

    /// Drop counters that no longer influence any decision
    pub fn cleanup_expired(&self) {
        self.cleanup_at(Instant::now());
    }

    fn cleanup_at(&self, now: Instant) {
        let horizon = self.window * 2;
        self.counters
            .retain(|_, counter| now.saturating_duration_since(counter.window_start) < horizon);
    }

    pub fn entry_count(&self) -> usize {
        self.counters.len()
    }
}

/// Address of the caller: proxy headers first, then the socket peer
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
    };
    let peer = || {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };

    forwarded
        .or_else(real_ip)
        .or_else(peer)
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// Extracts the caller's address for handler-level limits
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(&parts.headers, &parts.extensions)))
    }
}

fn admit(limiter: &RateLimiter, tier: RateLimitTier, subject: &str) -> Result<RateLimitInfo, ApiError> {
    limiter.check(tier, subject).map_err(|retry_after| {
        warn!(tier = tier.as_str(), subject = %subject, retry_after, "Rate limit exceeded");
        ApiError::rate_limited(retry_after)
    })
}

/// Throttle password guessing against one account from one address
pub fn guard_login(limiter: &RateLimiter, ip: IpAddr, email: &str) -> Result<(), ApiError> {
    admit(limiter, RateLimitTier::Login, &format!("{}|{}", email, ip)).map(|_| ())
}

/// Throttle booking requests from one client account
pub fn guard_booking(limiter: &RateLimiter, client: &User) -> Result<(), ApiError> {
    admit(limiter, RateLimitTier::Booking, &client.id).map(|_| ())
}

/// Middleware limiting every `/api` route per client address
pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_by_address(&state, request, next, RateLimitTier::Api).await
}

/// Middleware limiting `/api/auth` routes per client address
pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_by_address(&state, request, next, RateLimitTier::Auth).await
}

async fn limit_by_address(
    state: &AppState,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let ip = client_ip(request.headers(), request.extensions());
    let info = match admit(&state.rate_limiter, tier, &ip.to_string()) {
        Ok(info) => info,
        Err(err) => return err.into_response(),
    };

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(info.reset_after));
    response
}

/// Periodically drop stale counters
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cleanup_interval_secs.max(1)));
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            rate_limiter.cleanup_expired();
            debug!(entries = rate_limiter.entry_count(), "Rate limiter cleanup complete");
        }
    });
}
