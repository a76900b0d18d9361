//! Per-run migration context.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::adapter::AdapterKind;
use crate::config::Version;

/// Direction a migration is being run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// State visible to checks and the retry logic while a migration runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationContext {
    /// Adapter of the active connection.
    pub adapter: AdapterKind,
    /// Server version the migrations target.
    pub target_version: Option<Version>,
    /// Whether DDL on this connection is transactional.
    pub transactional_ddl: bool,
    /// Whether the current step runs inside an open transaction.
    pub in_transaction: bool,
    /// Direction of the run.
    pub direction: Direction,
    /// Version of the running migration.
    pub migration_version: u64,
    /// Whether checks apply to this migration at all.
    pub checks_enabled: bool,
    /// Whether the current operation is inside a `safety_assured` block.
    pub safety_assured: bool,
}

impl MigrationContext {
    /// A context for an up migration with checks enabled.
    pub fn new(adapter: AdapterKind, transactional_ddl: bool) -> Self {
        Self {
            adapter,
            target_version: None,
            transactional_ddl,
            in_transaction: false,
            direction: Direction::Up,
            migration_version: 0,
            checks_enabled: true,
            safety_assured: false,
        }
    }

    /// Set the target server version.
    pub fn with_target_version(mut self, version: Option<Version>) -> Self {
        self.target_version = version;
        self
    }

    /// Whether operations should be checked right now.
    pub fn checks_active(&self) -> bool {
        self.checks_enabled && !self.safety_assured
    }
}
