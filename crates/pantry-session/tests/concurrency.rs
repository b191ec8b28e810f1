//! Concurrent access and the per-user session limit.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use common::{Harness, config};
use pantry_session::store::{EvictionSelector, RecordPredicate, SessionUpdate};
use pantry_session::{
    Clock, ManualClock, MemorySessionStore, NewSession, OpaqueTokenCodec, Result as StoreResult,
    SessionId, SessionManager, SessionRecord, SessionStore, TokenCorrelation,
};
use proptest::prelude::*;
use tokio::sync::Notify;

fn alice() -> NewSession {
    NewSession::new("u-alice", "alice", "buyer")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_exceed_limit() {
    let h = Harness::new(config(3));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.create(alice()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.active_ids("u-alice").await.len(), 3);
    assert_eq!(h.store.len().await.unwrap(), 16);
    assert_eq!(h.manager.stats().await.unwrap().active_sessions, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refresh_has_one_winner() {
    let h = Harness::new(config(5));
    let (record, token) = h.manager.create(alice()).await.unwrap();
    h.clock.advance(Duration::minutes(27));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = h.manager.clone();
            let token = token.clone();
            tokio::spawn(async move { manager.validate(&token).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        if let Some(new_token) = result.new_token() {
            winners.push(new_token.to_string());
        } else {
            assert!(!result.is_valid());
        }
    }

    assert_eq!(winners.len(), 1);
    let stored = h.store.get_by_id(&record.session_id).await.unwrap().unwrap();
    assert_eq!(stored.token_correlation, TokenCorrelation::of(&winners[0]));
    assert!(h.manager.validate(&winners[0]).await.is_valid());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn validate_races_revocation_safely() {
    let h = Harness::new(config(5));
    let (record, token) = h.manager.create(alice()).await.unwrap();

    let validators: Vec<_> = (0..8)
        .map(|_| {
            let manager = h.manager.clone();
            let token = token.clone();
            tokio::spawn(async move { manager.validate(&token).await })
        })
        .collect();
    h.manager.revoke_by_session_id(&record.session_id).await.unwrap();
    for handle in validators {
        handle.await.unwrap();
    }

    let stored = h.store.get_by_id(&record.session_id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert!(!h.manager.validate(&token).await.is_valid());
}

/// Memory store whose conditional deletes wait until released.
#[derive(Debug, Default)]
struct GatedDeleteStore {
    inner: MemorySessionStore,
    delete_reached: Notify,
    release: Notify,
}

#[async_trait]
impl SessionStore for GatedDeleteStore {
    async fn put(&self, record: SessionRecord) -> StoreResult<()> {
        self.inner.put(record).await
    }
    async fn get_by_id(&self, session_id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        self.inner.get_by_id(session_id).await
    }
    async fn get_by_correlation(
        &self,
        correlation: &TokenCorrelation,
    ) -> StoreResult<Option<SessionRecord>> {
        self.inner.get_by_correlation(correlation).await
    }
    async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<SessionRecord>> {
        self.inner.list_by_user(user_id).await
    }
    async fn delete(&self, session_id: &SessionId) -> StoreResult<bool> {
        self.inner.delete(session_id).await
    }
    async fn delete_if(
        &self,
        session_id: &SessionId,
        predicate: RecordPredicate<'_>,
    ) -> StoreResult<bool> {
        self.delete_reached.notify_one();
        self.release.notified().await;
        self.inner.delete_if(session_id, predicate).await
    }
    async fn scan(&self, predicate: RecordPredicate<'_>) -> StoreResult<Vec<SessionRecord>> {
        self.inner.scan(predicate).await
    }
    async fn update_if_current(
        &self,
        session_id: &SessionId,
        expected: &TokenCorrelation,
        update: SessionUpdate,
    ) -> StoreResult<Option<SessionRecord>> {
        self.inner.update_if_current(session_id, expected, update).await
    }
    async fn deactivate(&self, session_id: &SessionId) -> StoreResult<bool> {
        self.inner.deactivate(session_id).await
    }
    async fn insert_with_eviction(
        &self,
        record: SessionRecord,
        selector: EvictionSelector<'_>,
    ) -> StoreResult<Vec<SessionId>> {
        self.inner.insert_with_eviction(record, selector).await
    }
    async fn len(&self) -> StoreResult<usize> {
        self.inner.len().await
    }
}

#[tokio::test]
async fn sweep_spares_session_refreshed_after_scan() {
    common::init_tracing();
    let store = Arc::new(GatedDeleteStore::default());
    let clock = Arc::new(ManualClock::starting_now());
    let manager = Arc::new(
        SessionManager::new(
            config(5),
            store.clone(),
            Arc::new(OpaqueTokenCodec::new()),
            clock.clone(),
        )
        .unwrap(),
    );
    let t0 = clock.now();
    let (record, token) = manager.create(alice()).await.unwrap();

    // The sweeper reads 30m and snapshots the record as expired.
    clock.set(t0 + Duration::minutes(30));
    let sweeper = tokio::spawn({
        let manager = manager.clone();
        async move { manager.sweep().await }
    });
    store.delete_reached.notified().await;

    // A request that read the clock a second earlier refreshes it.
    clock.set(t0 + Duration::minutes(30) - Duration::seconds(1));
    let result = manager.validate(&token).await;
    let fresh = result.new_token().unwrap().to_string();

    store.release.notify_one();
    assert_eq!(sweeper.await.unwrap().unwrap(), 0);

    assert!(store.inner.get_by_id(&record.session_id).await.unwrap().is_some());
    assert!(manager.validate(&fresh).await.is_valid());
}

/// Live, active sessions of `user_id` in eviction order.
async fn eviction_order(h: &Harness, user_id: &str) -> Vec<SessionId> {
    let now = h.clock.now();
    let mut live: Vec<_> = h
        .store
        .list_by_user(user_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_live_at(now))
        .collect();
    live.sort_by_key(|r| r.created_at);
    live.into_iter().map(|r| r.session_id).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn limit_evicts_exactly_the_oldest(
        max in 1usize..5,
        gaps in prop::collection::vec(0i64..3, 1..12),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            let h = Harness::new(config(max));
            for gap in gaps {
                h.clock.advance(Duration::minutes(gap));
                let before = eviction_order(&h, "u-alice").await;
                let (created, _) = h.manager.create(alice()).await.unwrap();
                let after = eviction_order(&h, "u-alice").await;

                prop_assert!(after.len() <= max);
                prop_assert!(after.contains(&created.session_id));

                let evict = (before.len() + 1).saturating_sub(max);
                let mut expected: Vec<SessionId> = before[evict..].to_vec();
                expected.push(created.session_id);
                prop_assert_eq!(after, expected);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
