use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::AppState;

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Paths that stay public even with authentication enabled. Load balancers
/// and monitoring probe these without credentials.
const PUBLIC_PATHS: [&str; 2] = ["/", "/health"];

/// Middleware enforcing the `X-API-Key` check when auth is enabled.
///
/// The key is a static shared secret (`SERVICE_API_KEY`); there is no
/// per-client identity. Disabled auth passes everything through.
pub async fn auth_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    if !state.config.auth.enabled || PUBLIC_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let expected = match state.config.auth.api_key.as_deref() {
        Some(key) if !key.is_empty() => key,
        // Auth enabled but no key configured: refuse everything rather than
        // silently running open.
        _ => {
            tracing::error!("auth enabled but no api key configured; rejecting request");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == expected => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// In-memory rate limiter state.
///
/// Uses a simple fixed window counter keyed by client IP.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if the request is allowed.
    ///
    /// Returns `true` if allowed, `false` if limit exceeded.
    pub fn check(&self, key: IpAddr, limit: u32) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Lock poisoned by a panicked thread. Recover with the stale
                // state; refusing all requests over a poisoned counter would
                // be a self-inflicted denial of service.
                tracing::error!("rate limiter lock poisoned, recovering with stale state");
                poisoned.into_inner()
            }
        };
        let now = Instant::now();

        // Periodic cleanup to prevent memory growth. Evict only entries whose
        // window has expired so active limits survive.
        if state.len() > 10000 {
            state.retain(|_, (_, start)| now.duration_since(*start) <= Duration::from_secs(60));
        }

        let (count, start) = state.entry(key).or_insert((0, now));

        if now.duration_since(*start) > Duration::from_secs(60) {
            // Reset window
            *count = 1;
            *start = now;
            true
        } else {
            *count += 1;
            *count <= limit
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limiting middleware. Pipeline and broadcast endpoints get their own
/// (tighter) budgets; everything else shares the default.
pub async fn rate_limit_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    let ip = if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip()
    } else {
        // ConnectInfo missing means the server was built without
        // into_make_service_with_connect_info. Misconfiguration should be
        // fixed, not worked around.
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };

    let limits = &state.config.limits;
    let limit = match req.uri().path() {
        "/process-audio" | "/process-text" => limits.pipeline_per_minute,
        "/tts/broadcast" => limits.broadcast_per_minute,
        _ => limits.default_per_minute,
    };

    if !state.rate_limiter.check(ip, limit) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderValue::from_static("60"),
        );
        return Ok(response);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new();
        let key: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(key, 5));
        }
        // 6th request should be denied
        assert!(!limiter.check(key, 5));
    }

    #[test]
    fn rate_limiter_different_ips_independent() {
        let limiter = RateLimiter::new();
        let key_a: IpAddr = "10.0.0.1".parse().unwrap();
        let key_b: IpAddr = "10.0.0.2".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check(key_a, 3));
        }
        assert!(!limiter.check(key_a, 3));

        // key_b should still be allowed
        assert!(limiter.check(key_b, 3));
    }

    #[test]
    fn rate_limiter_eviction_preserves_active_limits() {
        let limiter = RateLimiter::new();

        // Fill with 10001 distinct IPs to trigger eviction
        for i in 0..10001u32 {
            let ip: IpAddr = std::net::Ipv4Addr::from(i.to_be_bytes()).into();
            limiter.check(ip, 100);
        }

        // Entries within their window survive eviction; the most recent IP
        // should still be tracked and eventually denied.
        let recent_ip: IpAddr = std::net::Ipv4Addr::from(10000u32.to_be_bytes()).into();
        for _ in 0..99 {
            assert!(limiter.check(recent_ip, 100));
        }
        assert!(!limiter.check(recent_ip, 100));
    }
}
