//! Sync configuration.
//!
//! Defaults are fixed; every field can be overridden from the environment
//! and then again by explicit CLI flags.

use std::time::Duration;
use tracing::debug;

use crate::error::SyncError;

/// Default authority repository holding the source secrets.
pub const DEFAULT_AUTHORITY: &str = "5dlabs/cto-secrets";

/// Default `repository_dispatch` event type that starts the export workflow.
pub const DEFAULT_DISPATCH_EVENT: &str = "export-secret";

/// Default maximum wait for an export to land.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between presence checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const ENV_AUTHORITY: &str = "SECRET_SYNC_AUTHORITY";
const ENV_TIMEOUT_SECS: &str = "SECRET_SYNC_TIMEOUT_SECS";
const ENV_POLL_INTERVAL_SECS: &str = "SECRET_SYNC_POLL_INTERVAL_SECS";
const ENV_ALLOW_DEGRADED: &str = "SECRET_SYNC_ALLOW_DEGRADED";
const ENV_DISPATCH_EVENT: &str = "SECRET_SYNC_DISPATCH_EVENT";

/// Settings for one `ensure` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Authority identity that dispatch requests are sent to
    pub authority: String,
    /// Maximum wait per secret once dispatched
    pub timeout: Duration,
    /// Delay between presence checks
    pub poll_interval: Duration,
    /// Return the report instead of failing when secrets are missing
    pub allow_degraded: bool,
    /// Event type for dispatchers that need one
    pub dispatch_event: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            allow_degraded: false,
            dispatch_event: DEFAULT_DISPATCH_EVENT.to_string(),
        }
    }
}

impl SyncConfig {
    /// Build a config from defaults plus environment overrides.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config reading overrides through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(authority) = lookup(ENV_AUTHORITY).filter(|v| !v.trim().is_empty()) {
            config.authority = authority.trim().to_string();
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout = parse_secs(ENV_TIMEOUT_SECS, &secs)?;
        }
        if let Some(secs) = lookup(ENV_POLL_INTERVAL_SECS) {
            config.poll_interval = parse_secs(ENV_POLL_INTERVAL_SECS, &secs)?;
        }
        if let Some(flag) = lookup(ENV_ALLOW_DEGRADED) {
            config.allow_degraded = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
        if let Some(event) = lookup(ENV_DISPATCH_EVENT).filter(|v| !v.trim().is_empty()) {
            config.dispatch_event = event.trim().to_string();
        }

        debug!(
            authority = %config.authority,
            timeout_secs = config.timeout.as_secs(),
            poll_interval_secs = config.poll_interval.as_secs(),
            allow_degraded = config.allow_degraded,
            "Loaded sync configuration"
        );

        config.validate()?;
        Ok(config)
    }

    /// Check that the polling bounds and authority make sense.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.authority.trim().is_empty() {
            return Err(SyncError::Config("authority must not be empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval > self.timeout {
            return Err(SyncError::Config(format!(
                "poll interval ({}s) exceeds timeout ({}s)",
                self.poll_interval.as_secs(),
                self.timeout.as_secs()
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    #[must_use]
    pub const fn with_degraded(mut self, allow_degraded: bool) -> Self {
        self.allow_degraded = allow_degraded;
        self
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, SyncError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| SyncError::Config(format!("{key}='{value}' is not a number of seconds: {e}")))
}
