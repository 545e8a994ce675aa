//! Two-tier rate limiting middleware.
//!
//! # Algorithm
//!
//! Both tiers use Governor's GCRA token bucket. Each bucket refills at its
//! configured rate and holds `rate + rate / 10` tokens.
//!
//! 1. **Global**: one bucket shared by every request. When it is empty the
//!    request is refused before the client is even looked up.
//! 2. **Per client**: one bucket per client host, created on first sight and
//!    kept in a [`ClientRegistry`].
//!
//! # Client lifecycle
//!
//! Every entry has an idle deadline (`CLIENT_IDLE_TIMEOUT_SECS`). Each request
//! from the client pushes the deadline out. One expiry task per entry sleeps
//! until the deadline, re-reads it under the write lock and removes the entry
//! only if it is still idle; otherwise it sleeps again. Lookup, insertion,
//! renewal and removal all happen under the same write lock, so two first
//! requests from a new address cannot create two buckets.
//!
//! # IP Spoofing Mitigation
//!
//! The client key is the TCP peer's host unless the peer is inside
//! `TRUSTED_PROXIES`, in which case forwarding headers are honoured (see
//! [`super::ip`]).

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::client_host;
use crate::config::Config;
use crate::error::AppError;
use crate::metrics;
use crate::state::AppState;

/// Error type for rate limit layer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// RPS value cannot be zero.
    ZeroRps,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroRps => {
                write!(
                    f,
                    "RPS must be greater than 0; set RATE_LIMIT_ENABLED=false for no limiting"
                )
            }
        }
    }
}

impl std::error::Error for RateLimitError {}

/// Bucket for `rate` per second holding `rate + rate / 10` tokens.
pub fn quota_for(rate: u32) -> Result<Quota, RateLimitError> {
    let rate_nonzero = NonZeroU32::new(rate).ok_or(RateLimitError::ZeroRps)?;
    let burst = NonZeroU32::new(Config::burst_for(rate)).unwrap_or(rate_nonzero);
    Ok(Quota::per_second(rate_nonzero).allow_burst(burst))
}

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    /// Network address
    network: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is an implicit /32 or /128. Returns `None` if the
    /// format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let Some((addr, prefix)) = cidr.split_once('/') else {
            let ip: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                network: ip,
                prefix_len: max_prefix(&ip),
            });
        };

        let ip: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&ip) {
            return None;
        }

        Some(Self {
            network: ip,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len)
                };
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            // IPv4 and IPv6 don't match
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Peers allowed to tell us the real client address.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Invalid CIDR strings are logged as warnings and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy ranges configured");
        }

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// With no ranges configured nobody is trusted.
    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(&ip))
    }
}

// =============================================================================
// Per-client registry
// =============================================================================

struct ClientEntry {
    limiter: Arc<DefaultDirectRateLimiter>,
    expires_at: Instant,
}

/// Per-client buckets with idle expiry.
pub struct ClientRegistry {
    clients: RwLock<HashMap<IpAddr, ClientEntry>>,
    quota: Quota,
    idle_timeout: Duration,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl ClientRegistry {
    pub fn new(
        quota: Quota,
        idle_timeout: Duration,
        tasks: TaskTracker,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            quota,
            idle_timeout,
            tasks,
            cancel,
        })
    }

    /// Bucket for `host`, creating it or renewing its idle lease.
    pub async fn touch(self: &Arc<Self>, host: IpAddr) -> Arc<DefaultDirectRateLimiter> {
        let expires_at = Instant::now() + self.idle_timeout;
        let mut clients = self.clients.write().await;

        if let Some(entry) = clients.get_mut(&host) {
            entry.expires_at = expires_at;
            return entry.limiter.clone();
        }

        let limiter = Arc::new(RateLimiter::direct(self.quota));
        clients.insert(
            host,
            ClientEntry {
                limiter: limiter.clone(),
                expires_at,
            },
        );
        metrics::set_rate_limit_clients(clients.len());
        drop(clients);

        debug!(client = %host, "Tracking new client");
        self.spawn_expiry(host, expires_at);
        limiter
    }

    pub async fn contains(&self, host: IpAddr) -> bool {
        self.clients.read().await.contains_key(&host)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    fn spawn_expiry(self: &Arc<Self>, host: IpAddr, first_deadline: Instant) {
        let registry = Arc::clone(self);
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            let mut deadline = first_deadline;
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(deadline) => {}
                }

                let mut clients = registry.clients.write().await;
                match clients.get(&host) {
                    Some(entry) if entry.expires_at > Instant::now() => {
                        deadline = entry.expires_at;
                    }
                    Some(_) => {
                        clients.remove(&host);
                        metrics::set_rate_limit_clients(clients.len());
                        debug!(client = %host, "Evicted idle client");
                        break;
                    }
                    None => break,
                }
            }
        });
    }
}

// =============================================================================
// Layer
// =============================================================================

/// Which bucket refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Global,
    Client,
}

impl Tier {
    fn as_str(&self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::Client => "client",
        }
    }
}

/// The two buckets plus client extraction settings.
pub struct TwoTierLimiter {
    global: DefaultDirectRateLimiter,
    clients: Arc<ClientRegistry>,
    trusted_proxies: TrustedProxyConfig,
}

impl TwoTierLimiter {
    pub fn new(
        global_rate: u32,
        client_rate: u32,
        clients_idle_timeout: Duration,
        trusted_proxies: TrustedProxyConfig,
        tasks: TaskTracker,
        cancel: CancellationToken,
    ) -> Result<Self, RateLimitError> {
        Ok(Self {
            global: RateLimiter::direct(quota_for(global_rate)?),
            clients: ClientRegistry::new(
                quota_for(client_rate)?,
                clients_idle_timeout,
                tasks,
                cancel,
            ),
            trusted_proxies,
        })
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Admit one request from `host`, global bucket first.
    pub async fn check(&self, host: IpAddr) -> Result<(), (Tier, u64)> {
        self.global
            .check()
            .map_err(|not_until| (Tier::Global, retry_after_secs(&not_until)))?;

        let limiter = self.clients.touch(host).await;
        limiter
            .check()
            .map_err(|not_until| (Tier::Client, retry_after_secs(&not_until)))
    }
}

fn retry_after_secs(not_until: &governor::NotUntil<<DefaultClock as Clock>::Instant>) -> u64 {
    not_until
        .wait_time_from(DefaultClock::default().now())
        .as_secs()
        .max(1)
}

/// Rate limiting layer for Tower middleware stack.
///
/// `None` inside means limiting is disabled and the layer passes everything
/// through.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Option<Arc<TwoTierLimiter>>,
}

impl RateLimitLayer {
    /// Build the limiter from configuration. Expiry tasks run on the state's
    /// tracker and stop with its cancellation token.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::ZeroRps` if limiting is enabled with a zero rate.
    pub fn from_state(state: &AppState) -> Result<Self, RateLimitError> {
        let config = &state.config;
        if !config.rate_limit_enabled {
            return Ok(Self::disabled());
        }

        let limiter = TwoTierLimiter::new(
            config.global_rate_limit,
            config.per_client_rate_limit,
            config.client_idle_timeout,
            TrustedProxyConfig::new(&config.trusted_proxies),
            state.task_tracker().clone(),
            state.cancellation_token().clone(),
        )?;
        Ok(Self::new(Arc::new(limiter)))
    }

    pub fn new(limiter: Arc<TwoTierLimiter>) -> Self {
        Self {
            limiter: Some(limiter),
        }
    }

    /// A layer that allows all requests.
    pub fn disabled() -> Self {
        Self { limiter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Option<Arc<TwoTierLimiter>>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let Some(limiter) = self.limiter.clone() else {
            return Box::pin(async move { inner.call(req).await });
        };

        Box::pin(async move {
            let host = match client_host(&req, &limiter.trusted_proxies) {
                Ok(host) => host,
                Err(e) => return Ok(e.into_response()),
            };

            match limiter.check(host).await {
                Ok(()) => inner.call(req).await,
                Err((tier, retry_after)) => {
                    metrics::record_rate_limit_rejection(tier.as_str());
                    warn!(
                        client_ip = %host,
                        tier = tier.as_str(),
                        path = %req.uri().path(),
                        retry_after_secs = retry_after,
                        "Rate limit exceeded"
                    );
                    Ok(AppError::RateLimited { retry_after }.into_response())
                }
            }
        })
    }
}
