//! Classification of adapter errors.
//!
//! Drivers rarely expose structured lock-timeout codes, so errors are
//! recognised by their message text. Every signature lives here.

use super::AdapterKind;
use crate::error::DatabaseError;

/// What kind of failure an adapter error represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Gave up waiting for a lock. Transient; eligible for retry.
    LockTimeout,
    /// Statement ran too long. Not retried.
    StatementTimeout,
    /// Anything else. Not retried.
    Other,
}

const POSTGRESQL_LOCK_TIMEOUT: &[&str] = &["canceling statement due to lock timeout"];
const POSTGRESQL_STATEMENT_TIMEOUT: &[&str] = &["canceling statement due to statement timeout"];

const MYSQL_LOCK_TIMEOUT: &[&str] = &["Lock wait timeout exceeded"];
const MYSQL_STATEMENT_TIMEOUT: &[&str] = &["maximum statement execution time exceeded"];

const MARIADB_LOCK_TIMEOUT: &[&str] = &["Lock wait timeout exceeded"];
const MARIADB_STATEMENT_TIMEOUT: &[&str] = &["max_statement_time exceeded"];

fn signatures(adapter: AdapterKind) -> (&'static [&'static str], &'static [&'static str]) {
    match adapter {
        AdapterKind::Postgresql => (POSTGRESQL_LOCK_TIMEOUT, POSTGRESQL_STATEMENT_TIMEOUT),
        AdapterKind::Mysql => (MYSQL_LOCK_TIMEOUT, MYSQL_STATEMENT_TIMEOUT),
        AdapterKind::Mariadb => (MARIADB_LOCK_TIMEOUT, MARIADB_STATEMENT_TIMEOUT),
    }
}

/// Classify an adapter error by its message.
pub fn classify(error: &DatabaseError, adapter: AdapterKind) -> ErrorClass {
    let message = error.message();
    let (lock, statement) = signatures(adapter);

    if lock.iter().any(|sig| message.contains(sig)) {
        ErrorClass::LockTimeout
    } else if statement.iter().any(|sig| message.contains(sig)) {
        ErrorClass::StatementTimeout
    } else {
        ErrorClass::Other
    }
}

/// The message an adapter reports for a lock timeout.
///
/// Used by the recording connection to simulate a competing session.
pub(crate) fn lock_timeout_message(adapter: AdapterKind) -> String {
    match adapter {
        AdapterKind::Postgresql => {
            format!("PG::LockNotAvailable: ERROR:  {}", POSTGRESQL_LOCK_TIMEOUT[0])
        }
        AdapterKind::Mysql | AdapterKind::Mariadb => format!(
            "Mysql2::Error::TimeoutError: {}; try restarting transaction",
            MYSQL_LOCK_TIMEOUT[0]
        ),
    }
}
