//! Bearer tokens: the codec seam and the correlation digest stored in
//! place of the token.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::record::{NewSession, SessionId, SessionRecord};

/// One-way digest of a bearer token (hex-encoded SHA-256).
///
/// Lets the store answer "is this exact token still the live one" without
/// being able to reconstruct the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCorrelation(String);

impl TokenCorrelation {
    /// Digest a bearer token.
    pub fn of(token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        Self(hex::encode(digest))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenCorrelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a minted token carries.
#[derive(Debug, Clone, Copy)]
pub struct TokenClaims<'a> {
    pub session_id: SessionId,
    pub user_id: &'a str,
    pub username: &'a str,
    pub role_name: &'a str,
    pub permissions: &'a BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl<'a> TokenClaims<'a> {
    /// Claims for a session that does not exist yet.
    pub fn for_new_session(
        session_id: SessionId,
        new: &'a NewSession,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            user_id: &new.user_id,
            username: &new.username,
            role_name: &new.role_name,
            permissions: &new.permissions,
            expires_at,
        }
    }

    /// Claims for re-issuing a token for an existing session.
    pub fn for_record(record: &'a SessionRecord, expires_at: DateTime<Utc>) -> Self {
        Self {
            session_id: record.session_id,
            user_id: &record.user_id,
            username: &record.username,
            role_name: &record.role_name,
            permissions: &record.permissions,
            expires_at,
        }
    }
}

/// Mints and parses bearer tokens.
///
/// The signing scheme is the implementor's business; the manager only
/// needs the session id back out of a token.
pub trait TokenCodec: Send + Sync + std::fmt::Debug {
    /// Produce a bearer token for the claims.
    ///
    /// Failures must be reported as [`Error::TokenMint`].
    fn mint(&self, claims: &TokenClaims<'_>) -> Result<String>;

    /// Recover the session id from a bearer token.
    ///
    /// Failures must be reported as [`Error::InvalidToken`].
    fn parse(&self, token: &str) -> Result<SessionId>;
}

const SECRET_LEN: usize = 32;

/// Unsigned codec: `<session-id>.<base64url random secret>`.
///
/// The random part makes every token unique, so a token naming a valid
/// session id but not minted for it fails the correlation check.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueTokenCodec;

impl OpaqueTokenCodec {
    pub fn new() -> Self {
        Self
    }
}

impl TokenCodec for OpaqueTokenCodec {
    fn mint(&self, claims: &TokenClaims<'_>) -> Result<String> {
        let mut secret = [0u8; SECRET_LEN];
        rand::rng().fill_bytes(&mut secret);
        Ok(format!(
            "{}.{}",
            claims.session_id,
            URL_SAFE_NO_PAD.encode(secret)
        ))
    }

    fn parse(&self, token: &str) -> Result<SessionId> {
        let (id, secret) = token.split_once('.').ok_or(Error::InvalidToken)?;
        let secret = URL_SAFE_NO_PAD
            .decode(secret)
            .map_err(|_| Error::InvalidToken)?;
        if secret.len() != SECRET_LEN {
            return Err(Error::InvalidToken);
        }
        id.parse().map_err(|_| Error::InvalidToken)
    }
}
