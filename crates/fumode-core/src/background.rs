//! Fire-and-forget work with drain-on-shutdown
//!
//! Handlers hand side effects they do not want to wait for (welcome
//! notifications, cleanup of orphaned uploads) to the runner. Each unit is
//! counted before `submit` returns and uncounted when it finishes, fails or
//! panics, so `drain` can wait for the count to reach zero during shutdown.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};

/// Launches and tracks background work
#[derive(Clone)]
pub struct BackgroundTaskRunner {
    outstanding: Arc<watch::Sender<usize>>,
}

impl Default for BackgroundTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTaskRunner {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(outstanding),
        }
    }

    /// Run `task` in the background.
    ///
    /// The task is counted as outstanding before this returns. Errors and
    /// panics are logged under `name` and never reach the caller.
    pub fn submit<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let guard = OutstandingGuard::register(Arc::clone(&self.outstanding));

        tokio::spawn(async move {
            let _guard = guard;

            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!(task = name, "background task completed"),
                Ok(Err(err)) => error!(task = name, error = %format!("{err:#}"), "background task failed"),
                Err(panic) => error!(
                    task = name,
                    panic = %panic_message(panic.as_ref()),
                    "background task panicked"
                ),
            }
        });
    }

    /// Number of submitted tasks that have not finished yet
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until no task is outstanding. Safe to call any number of times.
    pub async fn drain(&self) {
        let mut idle = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = idle.wait_for(|count| *count == 0).await;
    }
}

/// Keeps one unit counted until dropped, including when the task is cancelled
struct OutstandingGuard {
    outstanding: Arc<watch::Sender<usize>>,
}

impl OutstandingGuard {
    fn register(outstanding: Arc<watch::Sender<usize>>) -> Self {
        outstanding.send_modify(|count| *count += 1);
        Self { outstanding }
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.outstanding.send_modify(|count| *count -= 1);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
