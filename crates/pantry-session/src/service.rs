//! Process-level lifecycle for the session core.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::manager::SessionManager;
use crate::scheduler::CleanupScheduler;
use crate::store::SessionStore;
use crate::token::TokenCodec;

/// Owns the manager and its cleanup loop for the lifetime of the process.
///
/// Construct one at startup and hand [`manager`](Self::manager) to the
/// request layer; call [`shutdown`](Self::shutdown) on the way out.
#[derive(Debug)]
pub struct SessionService {
    manager: Arc<SessionManager>,
    scheduler: CleanupScheduler,
}

impl SessionService {
    /// Build the manager and start the cleanup loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(
        config: SessionConfig,
        store: Arc<dyn SessionStore>,
        codec: Arc<dyn TokenCodec>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let interval = config.cleanup_interval;
        let manager = Arc::new(SessionManager::new(config, store, codec, clock)?);
        let scheduler = CleanupScheduler::start(Arc::clone(&manager), interval);

        info!(
            max_concurrent_sessions = manager.config().max_concurrent_sessions,
            "Session service initialized"
        );
        Ok(Self { manager, scheduler })
    }

    /// The shared manager.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Stop the cleanup loop and flush the store.
    pub async fn shutdown(self) -> Result<()> {
        self.scheduler.stop().await;
        self.manager.store().flush().await?;
        info!("Session service shut down");
        Ok(())
    }
}
