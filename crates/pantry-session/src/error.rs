//! Error types for session operations.

use serde::Serialize;

use crate::record::SessionId;

/// Error type for session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Token is malformed, unparseable, or no longer the live token for its
    /// session. The three cases are indistinguishable.
    #[error("Invalid token")]
    InvalidToken,

    /// No record exists for the session.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session is past its absolute expiry.
    #[error("Session expired: {0}")]
    SessionExpired(SessionId),

    /// Session was revoked or evicted.
    #[error("Session revoked: {0}")]
    SessionRevoked(SessionId),

    /// The token codec failed to mint a token.
    #[error("Token mint error: {0}")]
    TokenMint(String),

    /// The record store could not be reached or timed out.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Session settings failed validation.
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// The stable code for this error, suitable for logging and for mapping
    /// onto transport status codes.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidToken => ErrorCode::InvalidToken,
            Error::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Error::SessionExpired(_) => ErrorCode::SessionExpired,
            Error::SessionRevoked(_) => ErrorCode::SessionRevoked,
            Error::TokenMint(_) => ErrorCode::TokenMintError,
            Error::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            Error::Config(_) => ErrorCode::Config,
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Payload-free classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidToken,
    SessionNotFound,
    SessionExpired,
    SessionRevoked,
    TokenMintError,
    StorageUnavailable,
    Config,
}

impl ErrorCode {
    /// Whether the caller presented credentials that no longer authenticate
    /// anyone. Client-held credentials should be cleared in this case.
    pub fn is_authentication_failure(self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidToken
                | ErrorCode::SessionNotFound
                | ErrorCode::SessionExpired
                | ErrorCode::SessionRevoked
        )
    }

    /// Whether the failure is on the server side and worth retrying.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorCode::StorageUnavailable | ErrorCode::TokenMintError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::SessionRevoked => "SESSION_REVOKED",
            ErrorCode::TokenMintError => "TOKEN_MINT_ERROR",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::Config => "CONFIG",
        };
        f.write_str(s)
    }
}
