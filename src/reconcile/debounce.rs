//! Cancellable delayed task
//!
//! Rescheduling or cancelling only affects a task still waiting out its
//! delay; once the delay elapses the work runs detached and is never aborted.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::lock;

#[derive(Debug)]
pub struct Debouncer { delay: Duration, pending: Mutex<Option<JoinHandle<()>>> }

impl Debouncer {
    pub fn new(delay: Duration) -> Self { Self { delay, pending: Mutex::new(None) } }

    pub fn delay(&self) -> Duration { self.delay }

    /// Replaces any pending task with `task`, run after the settle delay.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(task);
        });
        if let Some(previous) = lock(&self.pending).replace(handle) { previous.abort(); }
    }

    pub fn cancel(&self) {
        if let Some(pending) = lock(&self.pending).take() { pending.abort(); }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) { self.cancel(); }
}
