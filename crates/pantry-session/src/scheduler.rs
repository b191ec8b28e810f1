//! Background expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::SessionManager;

/// Runs [`SessionManager::sweep`] on a fixed interval until stopped.
///
/// Dropping the scheduler cancels the loop; [`stop`](Self::stop) also
/// waits for it to finish.
#[derive(Debug)]
pub struct CleanupScheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs one `interval` after start.
    pub fn start(manager: Arc<SessionManager>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(interval_ms = interval.as_millis() as u64, "Session cleanup started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match manager.sweep().await {
                            Ok(removed) => debug!(removed, "Session sweep finished"),
                            Err(e) => warn!(error = %e, "Session sweep failed, will retry next interval"),
                        }
                    }
                }
            }
            info!("Session cleanup stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Whether the loop is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Session cleanup task ended abnormally");
        }
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
