//! Per-client-IP request budget for the client-facing router.
//!
//! The client address is taken from the socket, or from `X-Forwarded-For`
//! when the master sits behind `trust_proxy_hops` reverse proxies.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::debug;

use skirmish_metrics::FleetMetrics;

/// Keyed token bucket: `max_requests` per `window`, per client IP.
#[derive(Clone)]
pub struct ClientRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    trust_proxy_hops: usize,
    metrics: FleetMetrics,
}

impl ClientRateLimiter {
    /// Returns `None` when the budget is degenerate (zero requests or a
    /// zero window).
    pub fn new(
        max_requests: u32,
        window: Duration,
        trust_proxy_hops: usize,
        metrics: FleetMetrics,
    ) -> Option<Self> {
        let burst = NonZeroU32::new(max_requests)?;
        let quota = Quota::with_period(window / max_requests)?.allow_burst(burst);
        Some(Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            trust_proxy_hops,
            metrics,
        })
    }

    /// Spend one token for `ip`. `false` once the budget is exhausted.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forget clients whose buckets are full again.
    pub fn housekeep(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Resolve the client address the way a proxy-aware server does: walk
/// `trust_proxy_hops` entries back from the socket peer along
/// `X-Forwarded-For`.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy_hops: usize) -> IpAddr {
    let peer = peer.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if trust_proxy_hops == 0 {
        return peer;
    }

    // Chain in arrival order: the leftmost entry is the original client.
    let mut chain: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    chain.push(peer);

    let idx = chain.len().saturating_sub(1 + trust_proxy_hops);
    chain[idx]
}

/// Middleware rejecting clients over budget with `429 Too Many Requests`.
pub async fn rate_limit(
    State(limiter): State<ClientRateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let peer = ConnectInfo::<SocketAddr>::from_request_parts(&mut parts, &())
        .await
        .ok()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip = client_ip(&parts.headers, peer, limiter.trust_proxy_hops);
    let req = Request::from_parts(parts, body);

    if !limiter.check(ip) {
        limiter.metrics.record_rate_limited();
        debug!(%ip, path = %req.uri().path(), "rate limited");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }
    next.run(req).await
}
