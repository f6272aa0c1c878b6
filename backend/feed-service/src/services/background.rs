//! Detached work that must not hold up the caller.
//!
//! Cache write-backs and post-fan-out invalidations run here. Each task
//! gets its own deadline, independent of the request that spawned it, and
//! all tasks are cancelled when the service shuts down.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
    shutdown: watch::Sender<bool>,
    task_timeout: Duration,
}

/// Decrements the in-flight count when the task ends, however it ends.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new(task_timeout: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                shutdown,
                task_timeout,
            }),
        }
    }

    /// Run `task` on the runtime with the configured deadline.
    /// Dropped without running if shutdown has already begun.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.inner));
        let mut shutdown = self.inner.shutdown.subscribe();
        let deadline = self.inner.task_timeout;

        tokio::spawn(async move {
            let _guard = guard;
            if *shutdown.borrow_and_update() {
                debug!(task = name, "Skipping background task during shutdown");
                return;
            }

            tokio::select! {
                outcome = tokio::time::timeout(deadline, task) => {
                    if outcome.is_err() {
                        warn!(task = name, timeout_ms = deadline.as_millis() as u64, "Background task timed out");
                    }
                }
                _ = shutdown.changed() => {
                    debug!(task = name, "Background task cancelled by shutdown");
                }
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Cancel running tasks and refuse new ones.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }
}
