//! Session lifecycle: create, validate, refresh, revoke, list, sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::record::{NewSession, SessionId, SessionRecord, SessionStats, SessionSummary};
use crate::store::{MemorySessionStore, SessionStore, SessionUpdate};
use crate::token::{OpaqueTokenCodec, TokenClaims, TokenCodec, TokenCorrelation};

/// A freshly minted replacement token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of [`SessionManager::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The token authenticates `record`. `refreshed` is set when the token
    /// was rotated; the caller must hand the new token to the client.
    Valid {
        record: SessionRecord,
        refreshed: Option<RefreshedToken>,
    },
    /// The token does not authenticate anyone. Nothing was mutated.
    Invalid { code: ErrorCode },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    pub fn should_refresh(&self) -> bool {
        matches!(
            self,
            ValidationResult::Valid {
                refreshed: Some(_),
                ..
            }
        )
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            ValidationResult::Valid { record, .. } => Some(record),
            ValidationResult::Invalid { .. } => None,
        }
    }

    pub fn new_token(&self) -> Option<&str> {
        match self {
            ValidationResult::Valid {
                refreshed: Some(refreshed),
                ..
            } => Some(&refreshed.token),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ValidationResult::Invalid { code } => Some(*code),
            ValidationResult::Valid { .. } => None,
        }
    }
}

/// Result of a bulk revocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevocationReport {
    /// Sessions targeted by the request.
    pub requested: usize,
    /// Sessions this call actually moved from active to revoked.
    pub revoked: usize,
}

/// Issues, validates, rotates and revokes sessions.
///
/// Holds no mutable state of its own: the store owns all synchronization,
/// so one manager can be shared behind an `Arc` by every request worker.
#[derive(Debug)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn TokenCodec>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    refresh_threshold: Duration,
}

impl SessionManager {
    /// Create a manager over the given collaborators.
    ///
    /// Fails with [`Error::Config`] if the configuration is invalid.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SessionStore>,
        codec: Arc<dyn TokenCodec>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let refresh_threshold = Duration::from_std(config.refresh_threshold)
            .map_err(|_| Error::Config("refresh_threshold is out of range".into()))?;

        Ok(Self {
            refresh_threshold,
            store,
            codec,
            clock,
            config,
        })
    }

    /// Manager backed by an in-memory store, the opaque codec and the
    /// system clock.
    pub fn in_memory(config: SessionConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemorySessionStore::new()),
            Arc::new(OpaqueTokenCodec::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Absolute expiry for a session (re)issued at `now`.
    fn expiry_from(&self, now: DateTime<Utc>, remember_me: bool) -> Result<DateTime<Utc>> {
        Duration::from_std(self.config.lifetime(remember_me))
            .ok()
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| Error::Config("session lifetime is out of range".into()))
    }

    /// Start a session for an already-authenticated user.
    ///
    /// If the user is at the concurrent session limit, their oldest active
    /// session is revoked in the same atomic step that inserts the new one.
    /// The limit never makes this fail; a codec or store failure does.
    pub async fn create(&self, new: NewSession) -> Result<(SessionRecord, String)> {
        let now = self.clock.now();
        let expires_at = self.expiry_from(now, new.remember_me)?;
        let session_id = SessionId::new();

        let token = self
            .codec
            .mint(&TokenClaims::for_new_session(session_id, &new, expires_at))
            .map_err(into_mint_error)?;

        let record = SessionRecord {
            session_id,
            user_id: new.user_id,
            username: new.username,
            role_name: new.role_name,
            permissions: new.permissions,
            token_correlation: TokenCorrelation::of(&token),
            remember_me: new.remember_me,
            created_at: now,
            expires_at,
            last_activity: now,
            is_active: true,
        };

        let max = self.config.max_concurrent_sessions;
        let selector = move |active: &[SessionRecord]| select_evictions(active, now, max);
        let evicted = self
            .store
            .insert_with_eviction(record.clone(), &selector)
            .await?;

        for victim in &evicted {
            info!(
                session_id = %victim,
                user_id = %record.user_id,
                max_concurrent_sessions = max,
                "Evicted oldest session: concurrent session limit reached"
            );
        }
        info!(
            session_id = %record.session_id,
            user_id = %record.user_id,
            remember_me = record.remember_me,
            expires_at = %record.expires_at,
            "Created session"
        );

        Ok((record, token))
    }

    /// Authenticate a bearer token.
    ///
    /// On success `last_activity` is bumped, and if the session is within
    /// the refresh window the token is rotated. A rotation failure in the
    /// codec leaves the session valid and unrotated; the next request
    /// retries. Failures never mutate the record.
    pub async fn validate(&self, token: &str) -> ValidationResult {
        match self.authenticate(token).await {
            Ok((record, refreshed)) => ValidationResult::Valid { record, refreshed },
            Err(e) => {
                debug!(code = %e.code(), error = %e, "Session validation failed");
                ValidationResult::Invalid { code: e.code() }
            }
        }
    }

    /// Rotate the token now, regardless of the refresh window.
    ///
    /// The same checks as [`validate`](Self::validate) apply; the presented
    /// token stops working once this returns.
    pub async fn refresh(&self, token: &str) -> Result<(SessionRecord, RefreshedToken)> {
        let now = self.clock.now();
        let presented = TokenCorrelation::of(token);
        let record = self.load_usable(token, &presented, now).await?;

        let (update, refreshed) = self.mint_rotation(&record, now)?;
        let updated = self.commit(&record.session_id, &presented, update, now).await?;
        debug!(
            session_id = %updated.session_id,
            expires_at = %refreshed.expires_at,
            "Rotated session token on request"
        );
        Ok((updated, refreshed))
    }

    async fn authenticate(&self, token: &str) -> Result<(SessionRecord, Option<RefreshedToken>)> {
        let now = self.clock.now();
        let presented = TokenCorrelation::of(token);
        let record = self.load_usable(token, &presented, now).await?;

        let (update, refreshed) = if record.expires_at - now <= self.refresh_threshold {
            match self.mint_rotation(&record, now) {
                Ok((update, refreshed)) => (update, Some(refreshed)),
                Err(e) => {
                    warn!(
                        session_id = %record.session_id,
                        error = %e,
                        "Token rotation failed, keeping current token"
                    );
                    (SessionUpdate::touch(now), None)
                }
            }
        } else {
            (SessionUpdate::touch(now), None)
        };

        let updated = self.commit(&record.session_id, &presented, update, now).await?;
        match &refreshed {
            Some(refreshed) => debug!(
                session_id = %updated.session_id,
                expires_at = %refreshed.expires_at,
                "Rotated session token"
            ),
            None => trace!(session_id = %updated.session_id, "Session touched"),
        }
        Ok((updated, refreshed))
    }

    /// Parse the token and load its record, rejecting anything the token
    /// may not be used for.
    async fn load_usable(
        &self,
        token: &str,
        presented: &TokenCorrelation,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord> {
        let session_id = self.codec.parse(token).map_err(|_| Error::InvalidToken)?;
        let record = self
            .store
            .get_by_id(&session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;
        check_usable(&record, presented, now)?;
        Ok(record)
    }

    /// Mint a replacement token with a fresh expiry.
    fn mint_rotation(
        &self,
        record: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<(SessionUpdate, RefreshedToken)> {
        let expires_at = self.expiry_from(now, record.remember_me)?;
        let token = self
            .codec
            .mint(&TokenClaims::for_record(record, expires_at))
            .map_err(into_mint_error)?;
        Ok((
            SessionUpdate::rotate(now, TokenCorrelation::of(&token), expires_at),
            RefreshedToken { token, expires_at },
        ))
    }

    /// Apply `update` only if `presented` is still the live token.
    async fn commit(
        &self,
        session_id: &SessionId,
        presented: &TokenCorrelation,
        update: SessionUpdate,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord> {
        match self
            .store
            .update_if_current(session_id, presented, update)
            .await?
        {
            Some(updated) => Ok(updated),
            None => Err(self.classify_lost_race(session_id, presented, now).await),
        }
    }

    /// The record changed between the read and the conditional write.
    /// Re-read it to report why the presented token no longer works.
    async fn classify_lost_race(
        &self,
        session_id: &SessionId,
        presented: &TokenCorrelation,
        now: DateTime<Utc>,
    ) -> Error {
        match self.store.get_by_id(session_id).await {
            Ok(Some(current)) => check_usable(&current, presented, now)
                .err()
                .unwrap_or(Error::InvalidToken),
            Ok(None) => Error::SessionNotFound(*session_id),
            Err(e) => e,
        }
    }

    /// Revoke one session. Revoking an unknown or already revoked session
    /// is not an error; returns whether this call revoked it.
    pub async fn revoke_by_session_id(&self, session_id: &SessionId) -> Result<bool> {
        let revoked = self.store.deactivate(session_id).await?;
        if revoked {
            info!(session_id = %session_id, "Revoked session");
        }
        Ok(revoked)
    }

    /// Revoke the session whose live token is `token`.
    ///
    /// A malformed or superseded token matches nothing and yields
    /// `Ok(false)`.
    pub async fn revoke_by_token(&self, token: &str) -> Result<bool> {
        let correlation = TokenCorrelation::of(token);
        match self.store.get_by_correlation(&correlation).await? {
            Some(record) => self.revoke_by_session_id(&record.session_id).await,
            None => Ok(false),
        }
    }

    /// Revoke every session of a user, optionally sparing one ("log out
    /// everywhere but here").
    pub async fn revoke_all_for_user(
        &self,
        user_id: &str,
        except: Option<&SessionId>,
    ) -> Result<RevocationReport> {
        let targets: Vec<SessionId> = self
            .store
            .list_by_user(user_id)
            .await?
            .into_iter()
            .map(|r| r.session_id)
            .filter(|id| Some(id) != except)
            .collect();

        let mut report = RevocationReport {
            requested: targets.len(),
            revoked: 0,
        };
        for id in &targets {
            if self.store.deactivate(id).await? {
                report.revoked += 1;
            }
        }

        info!(
            user_id = %user_id,
            requested = report.requested,
            revoked = report.revoked,
            kept = ?except.map(ToString::to_string),
            "Revoked user sessions"
        );
        Ok(report)
    }

    /// Redacted view of a user's usable sessions, oldest first.
    pub async fn list_user_sessions(
        &self,
        user_id: &str,
        current: Option<&SessionId>,
    ) -> Result<Vec<SessionSummary>> {
        let now = self.clock.now();
        let mut live: Vec<SessionRecord> = self
            .store
            .list_by_user(user_id)
            .await?
            .into_iter()
            .filter(|r| r.is_live_at(now))
            .collect();
        live.sort_by_key(|r| r.created_at);

        Ok(live
            .iter()
            .map(|r| r.summary(Some(&r.session_id) == current))
            .collect())
    }

    /// Redacted view of a single session, usable or not.
    pub async fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionSummary>> {
        Ok(self
            .store
            .get_by_id(session_id)
            .await?
            .map(|r| r.summary(false)))
    }

    /// Count records by state. Read-only.
    pub async fn stats(&self) -> Result<SessionStats> {
        let now = self.clock.now();
        let all = self.store.scan(&|_: &SessionRecord| true).await?;
        let active = all.iter().filter(|r| r.is_live_at(now)).count();

        Ok(SessionStats {
            total_sessions: all.len(),
            active_sessions: active,
            inactive_sessions: all.len() - active,
        })
    }

    /// Delete every record that is revoked or past expiry. Returns how many
    /// were removed.
    pub async fn sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let is_dead = move |r: &SessionRecord| !r.is_live_at(now);
        let dead = self.store.scan(&is_dead).await?;

        // Re-checked at delete time: a record refreshed after the scan stays.
        let mut removed = 0;
        for record in &dead {
            if self.store.delete_if(&record.session_id, &is_dead).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Swept dead sessions");
        } else {
            trace!("Sweep found nothing to remove");
        }
        Ok(removed)
    }
}

/// Usable iff active, unexpired, and `presented` is the live token.
fn check_usable(
    record: &SessionRecord,
    presented: &TokenCorrelation,
    now: DateTime<Utc>,
) -> Result<()> {
    if !record.is_active {
        return Err(Error::SessionRevoked(record.session_id));
    }
    if record.is_expired_at(now) {
        return Err(Error::SessionExpired(record.session_id));
    }
    if &record.token_correlation != presented {
        return Err(Error::InvalidToken);
    }
    Ok(())
}

/// Oldest-first eviction: pick enough of the user's live sessions that one
/// more fits under `max`. Ties on `created_at` fall back to insertion order,
/// which the store guarantees for `active`.
fn select_evictions(active: &[SessionRecord], now: DateTime<Utc>, max: usize) -> Vec<SessionId> {
    let mut live: Vec<&SessionRecord> = active.iter().filter(|r| r.is_live_at(now)).collect();
    if live.len() < max {
        return Vec::new();
    }
    live.sort_by_key(|r| r.created_at);
    let excess = live.len() + 1 - max;
    live.into_iter().take(excess).map(|r| r.session_id).collect()
}

fn into_mint_error(e: Error) -> Error {
    match e {
        Error::TokenMint(_) => e,
        other => Error::TokenMint(other.to_string()),
    }
}
