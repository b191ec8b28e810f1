//! Session management core for the Pantry storefront services.
//!
//! This crate issues, validates, rotates, limits and revokes the sessions
//! behind short-lived bearer tokens:
//! - Absolute expiry with a sliding refresh window
//! - Per-user concurrent session cap with oldest-first eviction
//! - Point, by-token and bulk revocation
//! - Periodic sweeping of dead records
//!
//! Raw tokens are never stored; records carry only a SHA-256 correlation
//! digest of the live token.
//!
//! [`SessionStats::inactive_sessions`] counts every record a sweep would
//! remove: revoked ones as well as those past expiry.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pantry_session::{
//!     MemorySessionStore, NewSession, OpaqueTokenCodec, SessionConfig, SessionService,
//!     SystemClock,
//! };
//!
//! let service = SessionService::init(
//!     SessionConfig::default(),
//!     Arc::new(MemorySessionStore::new()),
//!     Arc::new(OpaqueTokenCodec::new()),
//!     Arc::new(SystemClock),
//! )?;
//!
//! let (record, token) = service
//!     .manager()
//!     .create(NewSession::new("u-42", "alice", "buyer"))
//!     .await?;
//! assert!(service.manager().validate(&token).await.is_valid());
//! ```

mod clock;
mod config;
mod error;
mod manager;
mod record;
mod scheduler;
mod service;
pub mod store;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SessionConfig, SessionSettings};
pub use error::{Error, ErrorCode, Result};
pub use manager::{RefreshedToken, RevocationReport, SessionManager, ValidationResult};
pub use record::{NewSession, SessionId, SessionRecord, SessionStats, SessionSummary};
pub use scheduler::CleanupScheduler;
pub use service::SessionService;
pub use store::{MemorySessionStore, SessionStore, TimeoutStore};
pub use token::{OpaqueTokenCodec, TokenClaims, TokenCodec, TokenCorrelation};
