//! Session record storage.
//!
//! The store owns every piece of shared mutable state and all of its
//! synchronization. It holds no policy: which session to evict, what counts
//! as expired and when to rotate a token are decided by the manager and
//! passed in.
//!
//! # Architecture
//!
//! ```text
//! SessionStore (trait)        - indexed record storage
//!     └── MemorySessionStore  - single-lock in-memory implementation
//!     └── TimeoutStore<S>     - bounds every call of an inner store
//! ```

mod memory;
mod timeout;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::record::{SessionId, SessionRecord};
use crate::token::TokenCorrelation;

pub use memory::MemorySessionStore;
pub use timeout::{DEFAULT_STORE_TIMEOUT, TimeoutStore};

/// Filter applied to records during a scan.
pub type RecordPredicate<'a> = &'a (dyn Fn(&SessionRecord) -> bool + Send + Sync);

/// Chooses which of a user's active records to deactivate before a new one
/// is inserted. Receives the records in insertion order.
pub type EvictionSelector<'a> = &'a (dyn Fn(&[SessionRecord]) -> Vec<SessionId> + Send + Sync);

/// A token rotation applied together with an activity bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRotation {
    pub token_correlation: TokenCorrelation,
    pub expires_at: DateTime<Utc>,
}

/// Mutation applied by [`SessionStore::update_if_current`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    pub last_activity: DateTime<Utc>,
    pub rotation: Option<TokenRotation>,
}

impl SessionUpdate {
    /// Bump `last_activity` only.
    pub fn touch(at: DateTime<Utc>) -> Self {
        Self {
            last_activity: at,
            rotation: None,
        }
    }

    /// Bump `last_activity` and swap in a new token.
    pub fn rotate(
        at: DateTime<Utc>,
        token_correlation: TokenCorrelation,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            last_activity: at,
            rotation: Some(TokenRotation {
                token_correlation,
                expires_at,
            }),
        }
    }
}

/// Trait for session record backends.
///
/// Every method must keep the by-id, by-correlation and by-user indices
/// mutually consistent: no caller may ever observe a record present in one
/// index and absent from another. Backends that talk to the network should
/// report I/O failures as [`Error::StorageUnavailable`](crate::Error::StorageUnavailable).
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Insert or replace a record.
    async fn put(&self, record: SessionRecord) -> Result<()>;

    /// Look a record up by id.
    async fn get_by_id(&self, session_id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Look a record up by the digest of its live token.
    async fn get_by_correlation(
        &self,
        correlation: &TokenCorrelation,
    ) -> Result<Option<SessionRecord>>;

    /// Snapshot of every record belonging to a user, in insertion order.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>>;

    /// Remove a record from every index. Returns whether it existed.
    async fn delete(&self, session_id: &SessionId) -> Result<bool>;

    /// Remove a record only if it still matches `predicate` at the moment
    /// of removal. Returns whether it was removed.
    ///
    /// Lets a caller act on a [`scan`](Self::scan) snapshot without undoing
    /// writes that landed after the snapshot was taken.
    async fn delete_if(
        &self,
        session_id: &SessionId,
        predicate: RecordPredicate<'_>,
    ) -> Result<bool>;

    /// Snapshot of every record matching `predicate`.
    ///
    /// The store is only locked while the snapshot is taken, so the caller
    /// is free to call back into the store (e.g. [`delete`](Self::delete))
    /// for each returned record.
    async fn scan(&self, predicate: RecordPredicate<'_>) -> Result<Vec<SessionRecord>>;

    /// Apply `update` only if the record is still active and still carries
    /// `expected` as its token correlation.
    ///
    /// Returns the updated record, or `None` if the record is gone, inactive
    /// or was rotated by someone else in the meantime.
    async fn update_if_current(
        &self,
        session_id: &SessionId,
        expected: &TokenCorrelation,
        update: SessionUpdate,
    ) -> Result<Option<SessionRecord>>;

    /// Mark a record inactive. Returns whether this call made the transition.
    async fn deactivate(&self, session_id: &SessionId) -> Result<bool>;

    /// Atomically deactivate the records chosen by `selector` from the
    /// owner's active records, then insert `record`.
    ///
    /// No other mutation for the same user may interleave. Returns the ids
    /// that were deactivated.
    async fn insert_with_eviction(
        &self,
        record: SessionRecord,
        selector: EvictionSelector<'_>,
    ) -> Result<Vec<SessionId>>;

    /// Number of records held, active or not.
    async fn len(&self) -> Result<usize>;

    /// Persist any buffered state. Called on shutdown.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
