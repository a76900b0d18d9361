//! Database adapter seam.
//!
//! The guard never talks to a driver directly. Adapters implement
//! [`Connection`], which executes raw session SQL, performs typed schema
//! operations, and manages transactions.

pub mod classifier;
pub mod recording;
pub mod timeouts;

pub use classifier::{classify, ErrorClass};
pub use recording::RecordingConnection;
pub use timeouts::{SessionTimeouts, TimeoutConfigurator};

use crate::config::Version;
use crate::error::DatabaseError;
use crate::operation::OperationCall;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported database adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Postgresql,
    Mysql,
    Mariadb,
}

impl AdapterKind {
    /// The adapter name.
    pub fn name(&self) -> &'static str {
        match self {
            AdapterKind::Postgresql => "postgresql",
            AdapterKind::Mysql => "mysql",
            AdapterKind::Mariadb => "mariadb",
        }
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "postgis" => Ok(AdapterKind::Postgresql),
            "mysql" | "mysql2" | "trilogy" => Ok(AdapterKind::Mysql),
            "mariadb" => Ok(AdapterKind::Mariadb),
            other => Err(format!("unsupported adapter: {}", other)),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A live database connection, as seen by the guard.
pub trait Connection {
    /// Which database this connection talks to.
    fn adapter(&self) -> AdapterKind;

    /// Whether DDL on this connection runs inside transactions.
    ///
    /// Supplied by the adapter layer rather than inferred from the adapter
    /// kind.
    fn supports_transactional_ddl(&self) -> bool;

    /// Version reported by the server, used for version-gated checks when
    /// no target version is configured.
    fn server_version(&self) -> Option<Version> {
        None
    }

    /// Execute raw SQL.
    fn execute(&mut self, sql: &str) -> Result<(), DatabaseError>;

    /// Perform a schema operation.
    fn perform(&mut self, call: &OperationCall) -> Result<(), DatabaseError>;

    /// Open a transaction.
    fn begin(&mut self) -> Result<(), DatabaseError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), DatabaseError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), DatabaseError>;
}
