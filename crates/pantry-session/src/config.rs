//! Configuration for the session manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default lifetime of a regular session.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30 * 60);

/// Default lifetime of a "remember me" session.
pub const DEFAULT_REMEMBER_ME_EXPIRATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How close to expiry a validation triggers token renewal.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Default period of the expiry sweep.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Default cap on simultaneously active sessions per user.
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 5;

/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Configuration for the session manager.
///
/// Read-only once handed to a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Lifetime of a session created without "remember me".
    pub default_expiration: Duration,

    /// Lifetime of a session created with "remember me".
    pub remember_me_expiration: Duration,

    /// A validation within this window of `expires_at` rotates the token.
    pub refresh_threshold: Duration,

    /// Interval between expiry sweeps.
    pub cleanup_interval: Duration,

    /// Maximum number of active sessions per user. The oldest is evicted
    /// when a new one would exceed it.
    pub max_concurrent_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_expiration: DEFAULT_EXPIRATION,
            remember_me_expiration: DEFAULT_REMEMBER_ME_EXPIRATION,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the regular session lifetime.
    pub fn with_default_expiration(mut self, expiration: Duration) -> Self {
        self.default_expiration = expiration;
        self
    }

    /// Set the "remember me" session lifetime.
    pub fn with_remember_me_expiration(mut self, expiration: Duration) -> Self {
        self.remember_me_expiration = expiration;
        self
    }

    /// Set the refresh window.
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Set the cleanup interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the per-user concurrent session cap.
    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    /// Lifetime for a session given its "remember me" flag.
    pub fn lifetime(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.remember_me_expiration
        } else {
            self.default_expiration
        }
    }

    /// Check the configuration for values the manager cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.default_expiration.is_zero() {
            return Err(Error::Config("default_expiration must be non-zero".into()));
        }
        if self.remember_me_expiration < self.default_expiration {
            return Err(Error::Config(
                "remember_me_expiration must not be shorter than default_expiration".into(),
            ));
        }
        if self.refresh_threshold.is_zero() {
            return Err(Error::Config("refresh_threshold must be non-zero".into()));
        }
        if self.refresh_threshold >= self.default_expiration {
            return Err(Error::Config(
                "refresh_threshold must be shorter than default_expiration".into(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::Config("cleanup_interval must be non-zero".into()));
        }
        if self.remember_me_expiration > MAX_DURATION || self.cleanup_interval > MAX_DURATION {
            return Err(Error::Config(format!(
                "durations must not exceed {} seconds",
                MAX_DURATION.as_secs()
            )));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(Error::Config(
                "max_concurrent_sessions must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// File-level session settings.
///
/// ```toml
/// [session]
/// default_expiration_secs = 1800
/// remember_me_expiration_secs = 2592000
/// refresh_threshold_secs = 300
/// cleanup_interval_secs = 60
/// max_concurrent_sessions = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Regular session lifetime in seconds.
    pub default_expiration_secs: u64,
    /// "Remember me" session lifetime in seconds.
    pub remember_me_expiration_secs: u64,
    /// Refresh window in seconds.
    pub refresh_threshold_secs: u64,
    /// Seconds between expiry sweeps.
    pub cleanup_interval_secs: u64,
    /// Per-user concurrent session cap.
    pub max_concurrent_sessions: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_expiration_secs: DEFAULT_EXPIRATION.as_secs(),
            remember_me_expiration_secs: DEFAULT_REMEMBER_ME_EXPIRATION.as_secs(),
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD.as_secs(),
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    session: SessionSettings,
}

impl SessionSettings {
    /// Parse the `[session]` table of a TOML document. A missing table
    /// yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: SettingsFile =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(file.session)
    }
}

impl TryFrom<SessionSettings> for SessionConfig {
    type Error = Error;

    fn try_from(settings: SessionSettings) -> Result<Self> {
        let config = SessionConfig {
            default_expiration: Duration::from_secs(settings.default_expiration_secs),
            remember_me_expiration: Duration::from_secs(settings.remember_me_expiration_secs),
            refresh_threshold: Duration::from_secs(settings.refresh_threshold_secs),
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs),
            max_concurrent_sessions: settings.max_concurrent_sessions,
        };
        config.validate()?;
        Ok(config)
    }
}
