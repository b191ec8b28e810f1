//! Session records and their derived views.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::token::TokenCorrelation;

/// Opaque, unique identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The authorization context a session is created for.
///
/// Produced by the login flow once credentials have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: String,
    pub username: String,
    pub role_name: String,
    pub permissions: BTreeSet<String>,
    /// Selects the long-lived expiration.
    pub remember_me: bool,
}

impl NewSession {
    /// Create a session request with no permissions.
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role_name: role_name.into(),
            permissions: BTreeSet::new(),
            remember_me: false,
        }
    }

    /// Set the permission snapshot.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Request the long-lived expiration.
    pub fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }
}

/// One record per login.
///
/// The user, role and permissions are a snapshot taken at creation; a
/// permission change takes effect on the next login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub user_id: String,
    pub username: String,
    pub role_name: String,
    pub permissions: BTreeSet<String>,

    /// Digest of the live bearer token. Never the token itself.
    pub token_correlation: TokenCorrelation,

    /// Whether the long-lived expiration applies on refresh.
    pub remember_me: bool,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,

    /// Cleared exactly once, on revocation or eviction.
    pub is_active: bool,
}

impl SessionRecord {
    /// Whether the absolute expiry has been reached at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Active and not yet expired. Token correlation is checked separately.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// Redacted view for session listings.
    pub fn summary(&self, is_current: bool) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            username: self.username.clone(),
            role_name: self.role_name.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_activity: self.last_activity,
            is_current,
        }
    }
}

/// Redacted, per-session view. Carries no token correlation and no
/// permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub username: String,
    pub role_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Set for the caller's own session.
    pub is_current: bool,
}

/// Aggregate counts computed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Records currently held by the store.
    pub total_sessions: usize,
    /// Records that are active and not past expiry.
    pub active_sessions: usize,
    /// Records that are revoked or past expiry, awaiting a sweep.
    pub inactive_sessions: usize,
}
