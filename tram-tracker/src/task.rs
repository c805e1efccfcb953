//! Owned background tasks.

use std::future::Future;

use tokio::task::AbortHandle;
use tracing::debug;

/// Handle to a spawned background task.
///
/// The task is aborted when the handle is dropped or stopped, so whoever owns
/// the handle owns the task's lifetime.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    abort: AbortHandle,
}

impl TaskHandle {
    /// Spawn `future` on the current runtime.
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        Self {
            name,
            abort: handle.abort_handle(),
        }
    }

    /// Abort the task. Idempotent.
    pub fn stop(&self) {
        if !self.abort.is_finished() {
            debug!(task = self.name, "Stopping background task");
        }
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}
