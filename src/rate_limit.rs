//! Per-client sliding-window rate limiting.
//!
//! Each client address keeps the timestamps of its accepted requests from the
//! last `window`. A request is rejected once `limit` timestamps are live; the
//! rejection itself is not recorded, so a throttled client regains capacity as
//! soon as its oldest request ages out.
//!
//! Attach per route with `route_layer`:
//!
//! ```ignore
//! Router::new()
//!     .route("/", get(root))
//!     .route_layer(middleware::from_fn_with_state(limiter, rate_limit));
//! ```

use std::{
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub limit: u32,
    /// Time until the oldest live request leaves the window.
    pub retry_after: Duration,
}

struct Inner {
    limit: u32,
    window: Duration,
    /// Each entry is checked and updated under its shard lock.
    hits: DashMap<IpAddr, VecDeque<Instant>>,
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.inner.limit)
            .field("window", &self.inner.window)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit: limit.max(1),
                window,
                hits: DashMap::new(),
            }),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    pub fn check(&self, client: IpAddr) -> Result<RateLimitStatus, RateLimitExceeded> {
        self.inner.check_at(client, Instant::now())
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.inner.hits.len()
    }

    /// Sweeps once per window until the limiter is dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.window.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let dropped = inner.sweep_at(Instant::now());
                if dropped > 0 {
                    debug!(dropped, "rate limiter swept idle clients");
                }
            }
        })
    }
}

fn prune(hits: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&oldest) = hits.front() {
        if now.duration_since(oldest) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

impl Inner {
    fn check_at(&self, client: IpAddr, now: Instant) -> Result<RateLimitStatus, RateLimitExceeded> {
        let mut hits = self.hits.entry(client).or_default();
        prune(&mut hits, self.window, now);

        if hits.len() >= self.limit as usize {
            let oldest = hits.front().copied().unwrap_or(now);
            return Err(RateLimitExceeded {
                limit: self.limit,
                retry_after: self.window.saturating_sub(now.duration_since(oldest)),
            });
        }

        hits.push_back(now);
        Ok(RateLimitStatus {
            limit: self.limit,
            remaining: self.limit - hits.len() as u32,
        })
    }

    /// Drops clients with no live requests. Returns how many were dropped.
    fn sweep_at(&self, now: Instant) -> usize {
        let before = self.hits.len();
        self.hits.retain(|_, hits| {
            prune(hits, self.window, now);
            !hits.is_empty()
        });
        before.saturating_sub(self.hits.len())
    }
}

/// Peers without connection info share a single bucket.
fn client_ip(connect: Option<ConnectInfo<SocketAddr>>) -> IpAddr {
    connect
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn retry_after_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    connect: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_ip(connect);
    match limiter.check(client) {
        Ok(status) => {
            let mut res = next.run(req).await;
            let headers = res.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(status.limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(status.remaining));
            res
        }
        Err(exceeded) => {
            warn!(%client, path = %req.uri().path(), "rate limit exceeded");
            ApiError::RateLimited {
                limit: exceeded.limit,
                window_secs: limiter.window().as_secs(),
                retry_after_secs: retry_after_secs(exceeded.retry_after),
            }
            .into_response()
        }
    }
}
