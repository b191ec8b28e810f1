//! Common test utilities for session integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pantry_session::store::{EvictionSelector, RecordPredicate, SessionUpdate};
use pantry_session::{
    Error, ManualClock, MemorySessionStore, OpaqueTokenCodec, Result, SessionConfig, SessionId,
    SessionManager, SessionRecord, SessionStore, TokenClaims, TokenCodec, TokenCorrelation,
};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 30 minute sessions, 5 minute refresh window.
pub fn config(max_concurrent_sessions: usize) -> SessionConfig {
    SessionConfig::new()
        .with_default_expiration(Duration::from_secs(30 * 60))
        .with_remember_me_expiration(Duration::from_secs(7 * 24 * 60 * 60))
        .with_refresh_threshold(Duration::from_secs(5 * 60))
        .with_max_concurrent_sessions(max_concurrent_sessions)
}

/// Manager plus handles on its store and clock.
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub store: Arc<MemorySessionStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let manager = SessionManager::new(
            config,
            store.clone(),
            Arc::new(OpaqueTokenCodec::new()),
            clock.clone(),
        )
        .expect("valid config");
        Self {
            manager: Arc::new(manager),
            store,
            clock,
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }

    /// Ids of the user's records that are still flagged active.
    pub async fn active_ids(&self, user_id: &str) -> Vec<SessionId> {
        self.store
            .list_by_user(user_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| r.session_id)
            .collect()
    }
}

/// Codec whose minting can be switched off.
#[derive(Debug, Default)]
pub struct SwitchableCodec {
    inner: OpaqueTokenCodec,
    pub fail_mint: AtomicBool,
}

impl SwitchableCodec {
    pub fn set_failing(&self, failing: bool) {
        self.fail_mint.store(failing, Ordering::SeqCst);
    }
}

impl TokenCodec for SwitchableCodec {
    fn mint(&self, claims: &TokenClaims<'_>) -> Result<String> {
        if self.fail_mint.load(Ordering::SeqCst) {
            return Err(Error::TokenMint("signing key unavailable".into()));
        }
        self.inner.mint(claims)
    }

    fn parse(&self, token: &str) -> Result<SessionId> {
        self.inner.parse(token)
    }
}

/// Store that is unreachable.
#[derive(Debug, Default)]
pub struct DownStore;

fn down<T>() -> Result<T> {
    Err(Error::StorageUnavailable("connection refused".into()))
}

#[async_trait]
impl SessionStore for DownStore {
    async fn put(&self, _record: SessionRecord) -> Result<()> {
        down()
    }
    async fn get_by_id(&self, _session_id: &SessionId) -> Result<Option<SessionRecord>> {
        down()
    }
    async fn get_by_correlation(
        &self,
        _correlation: &TokenCorrelation,
    ) -> Result<Option<SessionRecord>> {
        down()
    }
    async fn list_by_user(&self, _user_id: &str) -> Result<Vec<SessionRecord>> {
        down()
    }
    async fn delete(&self, _session_id: &SessionId) -> Result<bool> {
        down()
    }
    async fn delete_if(
        &self,
        _session_id: &SessionId,
        _predicate: RecordPredicate<'_>,
    ) -> Result<bool> {
        down()
    }
    async fn scan(&self, _predicate: RecordPredicate<'_>) -> Result<Vec<SessionRecord>> {
        down()
    }
    async fn update_if_current(
        &self,
        _session_id: &SessionId,
        _expected: &TokenCorrelation,
        _update: SessionUpdate,
    ) -> Result<Option<SessionRecord>> {
        down()
    }
    async fn deactivate(&self, _session_id: &SessionId) -> Result<bool> {
        down()
    }
    async fn insert_with_eviction(
        &self,
        _record: SessionRecord,
        _selector: EvictionSelector<'_>,
    ) -> Result<Vec<SessionId>> {
        down()
    }
    async fn len(&self) -> Result<usize> {
        down()
    }
}
