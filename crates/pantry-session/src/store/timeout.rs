//! Bounded-latency wrapper for session stores.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{EvictionSelector, RecordPredicate, SessionStore, SessionUpdate};
use crate::error::{Error, Result};
use crate::record::{SessionId, SessionRecord};
use crate::token::TokenCorrelation;

/// Default per-call bound.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Wraps a store so that no call can hang.
///
/// A call that does not finish within the timeout fails with
/// [`Error::StorageUnavailable`]. Nothing is retried here.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: SessionStore> TimeoutStore<S> {
    /// Wrap `inner` with the default timeout.
    pub fn new(inner: S) -> Self {
        Self::with_timeout(inner, DEFAULT_STORE_TIMEOUT)
    }

    /// Wrap `inner` with a custom timeout.
    pub fn with_timeout(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Session store call timed out"
                );
                Err(Error::StorageUnavailable(format!(
                    "{op} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<S: SessionStore> SessionStore for TimeoutStore<S> {
    async fn put(&self, record: SessionRecord) -> Result<()> {
        self.bounded("put", self.inner.put(record)).await
    }

    async fn get_by_id(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        self.bounded("get_by_id", self.inner.get_by_id(session_id))
            .await
    }

    async fn get_by_correlation(
        &self,
        correlation: &TokenCorrelation,
    ) -> Result<Option<SessionRecord>> {
        self.bounded(
            "get_by_correlation",
            self.inner.get_by_correlation(correlation),
        )
        .await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        self.bounded("list_by_user", self.inner.list_by_user(user_id))
            .await
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool> {
        self.bounded("delete", self.inner.delete(session_id)).await
    }

    async fn delete_if(
        &self,
        session_id: &SessionId,
        predicate: RecordPredicate<'_>,
    ) -> Result<bool> {
        self.bounded("delete_if", self.inner.delete_if(session_id, predicate))
            .await
    }

    async fn scan(&self, predicate: RecordPredicate<'_>) -> Result<Vec<SessionRecord>> {
        self.bounded("scan", self.inner.scan(predicate)).await
    }

    async fn update_if_current(
        &self,
        session_id: &SessionId,
        expected: &TokenCorrelation,
        update: SessionUpdate,
    ) -> Result<Option<SessionRecord>> {
        self.bounded(
            "update_if_current",
            self.inner.update_if_current(session_id, expected, update),
        )
        .await
    }

    async fn deactivate(&self, session_id: &SessionId) -> Result<bool> {
        self.bounded("deactivate", self.inner.deactivate(session_id))
            .await
    }

    async fn insert_with_eviction(
        &self,
        record: SessionRecord,
        selector: EvictionSelector<'_>,
    ) -> Result<Vec<SessionId>> {
        self.bounded(
            "insert_with_eviction",
            self.inner.insert_with_eviction(record, selector),
        )
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.bounded("len", self.inner.len()).await
    }

    async fn flush(&self) -> Result<()> {
        self.bounded("flush", self.inner.flush()).await
    }
}
