//! Shutdown coordination.
//!
//! The coordinator owns the accept loop for the whole life of the service:
//!
//! ```text
//! Running ──trigger──▶ Draining ──drained or grace elapsed──▶ WaitingBackground ──▶ Stopped
//! ```
//!
//! In-flight connections get a bounded grace period and are force-closed
//! after it. Spawned background work gets no deadline: shutdown always waits
//! for it to finish.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use axum::{extract::ConnectInfo, Router};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::ServiceExt;

use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::tasks::BackgroundTasks;

/// Pause after a transient accept error before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Process-wide lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    Draining = 1,
    WaitingBackground = 2,
    Stopped = 3,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::Draining,
            2 => ShutdownState::WaitingBackground,
            _ => ShutdownState::Stopped,
        }
    }
}

/// Recorded when connections were still open at the end of the drain.
/// Shutdown still completes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("drain did not finish within {grace:?}, {forced_connections} connection(s) forced closed")]
pub struct DrainTimeout {
    pub grace: Duration,
    pub forced_connections: usize,
    /// The grace period was cut short by a repeated trigger.
    pub forced_by_trigger: bool,
}

/// What happened during shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    pub drain_timeout: Option<DrainTimeout>,
    /// Background tasks outstanding when the background wait began.
    pub background_tasks_awaited: usize,
}

impl ShutdownReport {
    pub fn drain_timed_out(&self) -> bool {
        self.drain_timeout.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),
}

/// Drives the service from first accept to final exit.
pub struct ShutdownCoordinator {
    state: AtomicU8,
    /// Number of triggers received so far.
    triggers: watch::Sender<u32>,
    grace: Duration,
    tasks: BackgroundTasks,
    connections: ConnectionTracker,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration, tasks: BackgroundTasks) -> Self {
        let (triggers, _) = watch::channel(0);
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            triggers,
            grace,
            tasks,
            connections: ConnectionTracker::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True while new requests may be admitted.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Receiver that observes the running trigger count.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.triggers.subscribe()
    }

    /// Request shutdown.
    ///
    /// The first call starts the drain. A second call while still draining
    /// ends the grace period early and force-closes remaining connections.
    /// Later calls do nothing.
    pub fn trigger(&self) {
        let mut count = 0;
        self.triggers.send_modify(|triggers| {
            *triggers = triggers.saturating_add(1);
            count = *triggers;
        });

        match count {
            1 => {
                self.advance(ShutdownState::Draining);
                tracing::info!("shutdown triggered, no longer admitting requests");
            }
            2 if self.state() == ShutdownState::Draining => {
                tracing::warn!("shutdown triggered again, forcing open connections closed");
            }
            _ => {}
        }
    }

    /// Move to `next` if it is ahead of the current state.
    fn advance(&self, next: ShutdownState) -> bool {
        let advanced = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (next as u8 > current).then_some(next as u8)
            })
            .is_ok();
        if advanced {
            tracing::debug!(state = ?next, "lifecycle state advanced");
        }
        advanced
    }

    /// Accept and serve connections until triggered, then drain, then wait
    /// for background work.
    ///
    /// A fatal accept error also starts shutdown. It is returned only after
    /// the drain and the background wait have run.
    pub async fn serve(&self, listener: Listener, router: Router) -> Result<ShutdownReport, ShutdownError> {
        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();
        let mut fatal = None;

        let shutdown = triggered(self.subscribe(), 1);
        tokio::pin!(shutdown);

        if let Ok(address) = listener.local_addr() {
            tracing::info!(%address, "accepting connections");
        }

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.connections.track();
                        let connection_id = guard.id();
                        let router = router.clone();
                        // Admission keys buckets on the peer address.
                        let service = service_fn(move |mut request: hyper::Request<Incoming>| {
                            request.extensions_mut().insert(ConnectInfo(peer));
                            router.clone().oneshot(request)
                        });
                        let conn = builder
                            .serve_connection_with_upgrades(TokioIo::new(stream), service)
                            .into_owned();
                        let conn = graceful.watch(conn);

                        connections.spawn(async move {
                            let _permit = permit;
                            let _guard = guard;
                            if let Err(err) = conn.await {
                                tracing::debug!(%connection_id, peer_addr = %peer, error = %err, "connection closed with error");
                            }
                        });
                    }
                    Err(err) if err.is_transient() => {
                        tracing::warn!(error = %err, "transient accept error");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "listener failed, shutting down");
                        fatal = Some(err);
                        self.trigger();
                        break;
                    }
                },
            }
        }

        drop(listener);
        self.advance(ShutdownState::Draining);
        tracing::info!(
            in_flight = self.connections.active_count(),
            grace_secs = self.grace.as_secs_f64(),
            "listener closed, draining connections"
        );

        let cut_short = tokio::select! {
            _ = graceful.shutdown() => None,
            _ = tokio::time::sleep(self.grace) => Some(false),
            _ = triggered(self.subscribe(), 2) => Some(true),
        };

        let drain_timeout = match cut_short {
            None => {
                while connections.join_next().await.is_some() {}
                tracing::info!("all connections drained");
                None
            }
            Some(forced_by_trigger) => {
                let timeout = DrainTimeout {
                    grace: self.grace,
                    forced_connections: self.connections.active_count(),
                    forced_by_trigger,
                };
                connections.shutdown().await;
                metrics::record_drain_timeout();
                tracing::warn!(
                    forced_connections = timeout.forced_connections,
                    forced_by_trigger,
                    "{timeout}"
                );
                Some(timeout)
            }
        };

        self.advance(ShutdownState::WaitingBackground);
        let background_tasks_awaited = self.tasks.outstanding();
        if background_tasks_awaited > 0 {
            tracing::info!(outstanding = background_tasks_awaited, "waiting for background tasks");
        }
        self.tasks.wait_all().await;

        self.advance(ShutdownState::Stopped);
        tracing::info!("shutdown complete");

        match fatal {
            Some(err) => Err(ShutdownError::Listener(err)),
            None => Ok(ShutdownReport {
                drain_timeout,
                background_tasks_awaited,
            }),
        }
    }
}

/// Resolve once at least `count` triggers have been observed.
async fn triggered(mut rx: watch::Receiver<u32>, count: u32) {
    if rx.wait_for(|triggers| *triggers >= count).await.is_err() {
        std::future::pending::<()>().await;
    }
}
