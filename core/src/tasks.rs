use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{timeout, Instant};

/// Tracks detached background work so shutdown can wait for it, bounded.
///
/// Clones share one counter; any clone may spawn or drain.
#[derive(Clone, Default)]
pub struct TaskGroup {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    active: AtomicUsize,
    idle: Notify,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a detached unit of work; must run inside a tokio runtime.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        let completion = Completion(self.inner.clone());
        tokio::spawn(async move {
            let _completion = completion;
            future.await;
        });
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Waits until every tracked unit finishes or the deadline elapses.
    ///
    /// Returns false when units were abandoned; abandoned units keep
    /// running, nothing cancels them.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let end = Instant::now() + deadline;
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            // Register before the count check so a completion landing in
            // between still wakes us.
            idle.as_mut().enable();
            if self.active() == 0 {
                return true;
            }
            let remaining = end.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let _ = timeout(remaining, idle).await;
        }
    }
}

/// Decrements the active count when a unit ends, panic included.
struct Completion(Arc<Inner>);

impl Drop for Completion {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
