//! In-memory session store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{EvictionSelector, RecordPredicate, SessionStore, SessionUpdate};
use crate::error::Result;
use crate::record::{SessionId, SessionRecord};
use crate::token::TokenCorrelation;

/// All indices, guarded together so they can never disagree.
#[derive(Debug, Default)]
struct StoreInner {
    records: HashMap<SessionId, SessionRecord>,
    by_correlation: HashMap<TokenCorrelation, SessionId>,
    /// Session ids per user, in insertion order.
    by_user: HashMap<String, Vec<SessionId>>,
}

impl StoreInner {
    fn insert(&mut self, record: SessionRecord) {
        let id = record.session_id;

        if let Some(previous) = self.records.get(&id) {
            if self.by_correlation.get(&previous.token_correlation) == Some(&id) {
                self.by_correlation.remove(&previous.token_correlation);
            }
            if previous.user_id != record.user_id {
                let old_user = previous.user_id.clone();
                self.unlink_user(&old_user, &id);
            }
        }

        self.by_correlation
            .insert(record.token_correlation.clone(), id);
        let ids = self.by_user.entry(record.user_id.clone()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.records.insert(id, record);
    }

    fn remove(&mut self, id: &SessionId) -> Option<SessionRecord> {
        let record = self.records.remove(id)?;
        if self.by_correlation.get(&record.token_correlation) == Some(id) {
            self.by_correlation.remove(&record.token_correlation);
        }
        self.unlink_user(&record.user_id, id);
        Some(record)
    }

    fn unlink_user(&mut self, user_id: &str, id: &SessionId) {
        if let Some(ids) = self.by_user.get_mut(user_id) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.by_user.remove(user_id);
            }
        }
    }

    fn user_records(&self, user_id: &str) -> Vec<SessionRecord> {
        self.by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.records.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Session store backed by hash maps behind a single `RwLock`.
///
/// One lock over every index is what rules out index tears; critical
/// sections are short and never span an `.await`.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, record: SessionRecord) -> Result<()> {
        let mut inner = self.inner.write();
        trace!(session_id = %record.session_id, "Storing session record");
        inner.insert(record);
        Ok(())
    }

    async fn get_by_id(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        Ok(self.inner.read().records.get(session_id).cloned())
    }

    async fn get_by_correlation(
        &self,
        correlation: &TokenCorrelation,
    ) -> Result<Option<SessionRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .by_correlation
            .get(correlation)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        Ok(self.inner.read().user_records(user_id))
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool> {
        let removed = self.inner.write().remove(session_id).is_some();
        if removed {
            trace!(session_id = %session_id, "Deleted session record");
        }
        Ok(removed)
    }

    async fn delete_if(
        &self,
        session_id: &SessionId,
        predicate: RecordPredicate<'_>,
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        if !inner.records.get(session_id).is_some_and(|r| predicate(r)) {
            return Ok(false);
        }
        inner.remove(session_id);
        trace!(session_id = %session_id, "Deleted session record");
        Ok(true)
    }

    async fn scan(&self, predicate: RecordPredicate<'_>) -> Result<Vec<SessionRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .records
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect())
    }

    async fn update_if_current(
        &self,
        session_id: &SessionId,
        expected: &TokenCorrelation,
        update: SessionUpdate,
    ) -> Result<Option<SessionRecord>> {
        let mut inner = self.inner.write();

        let Some(record) = inner.records.get_mut(session_id) else {
            return Ok(None);
        };
        if !record.is_active || &record.token_correlation != expected {
            return Ok(None);
        }

        record.last_activity = update.last_activity;
        let stale = match update.rotation {
            Some(rotation) => {
                record.expires_at = rotation.expires_at;
                Some(std::mem::replace(
                    &mut record.token_correlation,
                    rotation.token_correlation,
                ))
            }
            None => None,
        };
        let updated = record.clone();

        if let Some(stale) = stale {
            inner.by_correlation.remove(&stale);
            inner
                .by_correlation
                .insert(updated.token_correlation.clone(), updated.session_id);
        }

        Ok(Some(updated))
    }

    async fn deactivate(&self, session_id: &SessionId) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.records.get_mut(session_id) {
            Some(record) if record.is_active => {
                record.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_with_eviction(
        &self,
        record: SessionRecord,
        selector: EvictionSelector<'_>,
    ) -> Result<Vec<SessionId>> {
        let mut inner = self.inner.write();

        let active: Vec<SessionRecord> = inner
            .user_records(&record.user_id)
            .into_iter()
            .filter(|r| r.is_active)
            .collect();

        let mut evicted = Vec::new();
        for id in selector(&active) {
            if !active.iter().any(|r| r.session_id == id) {
                continue;
            }
            if let Some(victim) = inner.records.get_mut(&id) {
                victim.is_active = false;
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            debug!(
                user_id = %record.user_id,
                evicted = evicted.len(),
                "Deactivated sessions to make room"
            );
        }

        inner.insert(record);
        Ok(evicted)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.read().records.len())
    }
}
