//! Per-client token-bucket admission control.
//!
//! Buckets live in a sharded map keyed by the client's IP. `allow` holds the
//! shard write guard for the whole refill-and-consume step, so calls for the
//! same key are linearised while keys in other shards proceed untouched. The
//! eviction sweep goes through the same guards via `retain`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::AdmissionConfig;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Reasons a request is refused before it reaches a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The peer address was not available, so no bucket can be chosen.
    /// This is an infrastructure failure, not a policy decision.
    #[error("client identity could not be determined from the request")]
    KeyExtraction,

    #[error("client {client} exceeded its request rate")]
    RateLimited { client: String },

    #[error("server is shutting down")]
    ShuttingDown,
}

/// Token state for one client.
#[derive(Debug, Clone)]
pub struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    /// Refill for the time elapsed since the last refill, then try to take
    /// one token. A denied attempt consumes nothing.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.last_seen = now;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Token-bucket limiter with an explicit lifecycle for its eviction sweep.
pub struct RateLimiter {
    buckets: DashMap<String, ClientBucket>,
    settings: ArcSwap<AdmissionConfig>,
}

impl RateLimiter {
    pub fn new(settings: AdmissionConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            settings: ArcSwap::from_pointee(settings),
        }
    }

    pub fn settings(&self) -> Arc<AdmissionConfig> {
        self.settings.load_full()
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.load().enabled
    }

    /// Swap in new settings. Existing buckets keep their tokens and are
    /// clamped to the new capacity on their next refill.
    pub fn update_settings(&self, settings: AdmissionConfig) {
        if *self.settings.load_full() == settings {
            return;
        }
        tracing::info!(
            enabled = settings.enabled,
            requests_per_second = settings.requests_per_second,
            burst = settings.burst,
            "admission settings updated"
        );
        self.settings.store(Arc::new(settings));
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let settings = self.settings.load();
        if !settings.enabled {
            return true;
        }
        let capacity = f64::from(settings.burst);
        let rate = settings.requests_per_second;

        // Fast path avoids allocating the key for clients we already track.
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(capacity, rate, now);
        }

        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| ClientBucket::full(capacity, now));
        bucket.try_acquire(capacity, rate, now)
    }

    /// Remove every bucket idle for longer than the eviction window.
    /// Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = Duration::from_secs(self.settings.load().eviction_window_secs);
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            let keep = now.saturating_duration_since(bucket.last_seen) <= window;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket(&self, key: &str) -> Option<ClientBucket> {
        self.buckets.get(key).map(|bucket| bucket.clone())
    }

    /// Start the recurring eviction sweep. The interval is re-read from the
    /// current settings before every sleep.
    pub fn start_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                let interval = Duration::from_secs(limiter.settings.load().sweep_interval_secs);
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        let evicted = limiter.sweep();
                        let remaining = limiter.len();
                        metrics::record_limiter_buckets(remaining);
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining, "evicted idle client buckets");
                        }
                    }
                }
            }
            tracing::debug!("limiter sweeper stopped");
        });

        SweeperHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Owns the sweeper task. Dropping the handle stops the sweep.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweep and wait for the task to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Derive the client key from the connection's peer address.
pub fn client_key(request: &Request) -> Result<String, AdmissionError> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or(AdmissionError::KeyExtraction)
}

fn admit(state: &AppState, request: &Request) -> Result<(), AdmissionError> {
    if !state.coordinator.is_accepting() {
        return Err(AdmissionError::ShuttingDown);
    }
    if !state.limiter.is_enabled() {
        return Ok(());
    }

    let client = client_key(request)?;
    if state.limiter.allow(&client) {
        Ok(())
    } else {
        Err(AdmissionError::RateLimited { client })
    }
}

/// Admission middleware: shutdown gate, then the per-client bucket.
pub async fn admission_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match admit(&state, &request) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            match &err {
                AdmissionError::KeyExtraction => {
                    tracing::error!(uri = %request.uri(), "{err}");
                }
                AdmissionError::RateLimited { client } => {
                    tracing::warn!(client = %client, "rate limit exceeded");
                    metrics::record_rate_limited();
                }
                AdmissionError::ShuttingDown => {
                    tracing::debug!(uri = %request.uri(), "request refused while draining");
                }
            }
            ApiError::from(err).into_response()
        }
    }
}
