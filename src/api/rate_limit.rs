//! Per-client request admission.
//!
//! Flow Overview:
//! 1) Derive a client key from proxy headers or the peer address.
//! 2) Refill that client's bucket lazily from the time elapsed since its last
//!    refill, capped at the burst size, then try to take one token.
//! 3) A separately owned sweeper task evicts clients idle for more than three
//!    sweep periods so the map stays bounded under a changing population.
//!
//! The client map sits behind a single mutex that is only held for the lookup
//! and bucket arithmetic, never across I/O. Time comes from a [`Clock`] so
//! tests advance a [`ManualClock`] instead of sleeping.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info};

use super::{AppState, error::ApiError};

const DEFAULT_RPS: f64 = 2.0;
const DEFAULT_BURST: u32 = 4;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const EVICTION_FACTOR: u32 = 3;
const UNKNOWN_CLIENT: &str = "unknown";
// Absorbs nanosecond truncation when 1/rps is not a whole number of nanoseconds.
const REFILL_TOLERANCE: f64 = 1e-9;

/// Source of monotonic time for the limiter.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimiterConfig {
    rps: f64,
    burst: u32,
    enabled: bool,
    sweep_interval: Duration,
}

impl LimiterConfig {
    /// Defaults: 2 requests per second, bursts of 4, sweep every minute.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rps: DEFAULT_RPS,
            burst: DEFAULT_BURST,
            enabled: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_rps(mut self, rps: f64) -> Self {
        self.rps = rps;
        self
    }

    #[must_use]
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn rps(&self) -> f64 {
        self.rps
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Idle time after which a client is forgotten.
    #[must_use]
    pub fn eviction_threshold(&self) -> Duration {
        self.sweep_interval * EVICTION_FACTOR
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Token bucket owned by a single client key.
#[derive(Clone, Copy, Debug)]
struct ClientBudget {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBudget {
    fn fresh(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_take(&mut self, rps: f64, burst: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if rps > 0.0 {
            self.tokens = (self.tokens + elapsed * rps).min(burst);
        }
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 - REFILL_TOLERANCE {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    // `None` when disabled: no map is kept at all.
    clients: Option<Mutex<HashMap<String, ClientBudget>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let clients = config.enabled().then(|| Mutex::new(HashMap::new()));
        Self {
            config,
            clock,
            clients,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Admit or reject one request from `client_key`.
    pub fn admit(&self, client_key: &str) -> bool {
        let Some(clients) = &self.clients else {
            return true;
        };

        let now = self.clock.now();
        let burst = f64::from(self.config.burst());
        let mut clients = lock(clients);
        let budget = clients
            .entry(client_key.to_string())
            .or_insert_with(|| ClientBudget::fresh(burst, now));
        budget.try_take(self.config.rps(), burst, now)
    }

    /// Drop clients idle for longer than the eviction threshold.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let Some(clients) = &self.clients else {
            return 0;
        };

        let now = self.clock.now();
        let threshold = self.config.eviction_threshold();
        let mut clients = lock(clients);
        let before = clients.len();
        clients.retain(|_, budget| now.saturating_duration_since(budget.last_seen) <= threshold);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.as_ref().map_or(0, |clients| lock(clients).len())
    }

    /// Spawn the periodic sweeper. Returns `None` when limiting is disabled.
    ///
    /// The task owns a handle to the limiter and runs until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.enabled() {
            return None;
        }

        let limiter = Arc::clone(self);
        let period = self.config.sweep_interval();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiter.sweep();
                if evicted > 0 {
                    debug!(evicted, "rate limiter sweep");
                }
            }
        }))
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Extract a client key from common proxy headers, falling back to the peer.
pub(crate) fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

/// Middleware rejecting requests over the client's budget with 429.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    if !state.limiter().admit(&key) {
        info!(client = %key, "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }

    next.run(request).await
}
