//! Guard configuration.
//!
//! Built once at startup and passed by reference to the runner, the retry
//! coordinator and the timeout configurator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default delay between lock timeout retries.
pub const DEFAULT_LOCK_TIMEOUT_DELAY: Duration = Duration::from_secs(3);

/// A database server version, `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = [0u32; 3];
        let mut count = 0;

        for part in s.split('.') {
            if count == 3 {
                return Err(format!("invalid version '{}': too many components", s));
            }
            parts[count] = part
                .parse()
                .map_err(|_| format!("invalid version '{}'", s))?;
            count += 1;
        }

        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How often and how patiently to retry lock timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts beyond the first.
    pub max_retries: u32,
    /// Wait before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

/// Session timeouts applied around a migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutSettings {
    pub lock_timeout: Option<Duration>,
    pub statement_timeout: Option<Duration>,
}

impl TimeoutSettings {
    /// Check if neither timeout is set.
    pub fn is_empty(&self) -> bool {
        self.lock_timeout.is_none() && self.statement_timeout.is_none()
    }
}

/// Process-wide guard configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Session lock timeout. `None` leaves the server default.
    pub lock_timeout: Option<Duration>,

    /// Session statement timeout. `None` leaves the server default.
    pub statement_timeout: Option<Duration>,

    /// Retries after a lock timeout.
    pub lock_timeout_retries: u32,

    /// Wait between lock timeout retries.
    pub lock_timeout_delay: Duration,

    /// Server version migrations are written against. Checks outside their
    /// window for this version are skipped.
    pub target_version: Option<Version>,

    /// Migrations with a version at or below this are not checked.
    pub start_after: Option<u64>,

    /// Whether to run checks when migrating down.
    pub check_down: bool,
}

impl GuardConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self {
            lock_timeout: None,
            statement_timeout: None,
            lock_timeout_retries: 0,
            lock_timeout_delay: DEFAULT_LOCK_TIMEOUT_DELAY,
            target_version: None,
            start_after: None,
            check_down: false,
        }
    }

    /// Set the session lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Set the session statement timeout.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Set the number of lock timeout retries.
    pub fn with_lock_timeout_retries(mut self, retries: u32) -> Self {
        self.lock_timeout_retries = retries;
        self
    }

    /// Set the delay between lock timeout retries.
    pub fn with_lock_timeout_delay(mut self, delay: Duration) -> Self {
        self.lock_timeout_delay = delay;
        self
    }

    /// Set the target server version.
    pub fn with_target_version(mut self, version: Version) -> Self {
        self.target_version = Some(version);
        self
    }

    /// Skip checks for migrations up to and including `version`.
    pub fn with_start_after(mut self, version: u64) -> Self {
        self.start_after = Some(version);
        self
    }

    /// Enable checks on the down direction.
    pub fn with_check_down(mut self, enabled: bool) -> Self {
        self.check_down = enabled;
        self
    }

    /// The retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.lock_timeout_retries, self.lock_timeout_delay)
    }

    /// The session timeouts derived from this configuration.
    pub fn timeout_settings(&self) -> TimeoutSettings {
        TimeoutSettings {
            lock_timeout: self.lock_timeout,
            statement_timeout: self.statement_timeout,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new()
    }
}
