//! Fire-and-forget background work that shutdown can wait on.
//!
//! Every spawned unit holds a [`TaskGuard`] for its whole life, so the
//! outstanding count drops exactly once whether the work returns `Ok`,
//! returns `Err`, or panics.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Notify;

use crate::observability::metrics;

/// How a background task ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFailure {
    #[error("background task `{task}` failed: {message}")]
    Failed { task: &'static str, message: String },

    #[error("background task `{task}` panicked: {message}")]
    Panicked { task: &'static str, message: String },
}

#[derive(Default)]
struct Inner {
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Tracker for spawned background work. Cheap to clone; clones share the
/// same counter.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on the runtime without waiting for it.
    ///
    /// The counter is incremented before this returns. Failures and panics
    /// are logged here and never reach the caller.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        let guard = self.track();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(failure) = run_guarded(name, task).await {
                tracing::error!(task = name, error = %failure, "background task did not complete");
                metrics::record_background_failure(name);
            }
        });
    }

    /// Wait until no task is outstanding. There is no deadline.
    pub async fn wait_all(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before reading the counter so a wake between the
            // load and the await is not lost.
            notified.as_mut().enable();

            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    fn track(&self) -> TaskGuard {
        let outstanding = self.inner.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_background_tasks(outstanding);
        TaskGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct TaskGuard {
    inner: Arc<Inner>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let remaining = self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::record_background_tasks(remaining);
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Drive `task` to completion, converting an `Err` or a panic into a
/// [`TaskFailure`].
pub async fn run_guarded<F, E>(name: &'static str, task: F) -> Result<(), TaskFailure>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match AssertUnwindSafe(task).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TaskFailure::Failed {
            task: name,
            message: err.to_string(),
        }),
        Err(payload) => Err(TaskFailure::Panicked {
            task: name,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
