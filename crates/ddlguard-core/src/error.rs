//! Migration error types.

use crate::operation::{OperationCall, Value};
use thiserror::Error;

/// An error reported by the database adapter.
///
/// The message is the driver's original text; it is displayed unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    message: String,
}

impl DatabaseError {
    /// Create an error from the adapter's message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The adapter's original message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DatabaseError {}

/// An operation rejected by a safety check.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsafeMigrationError {
    /// Name of the check that failed.
    pub check: String,
    /// The offending operation name.
    pub operation: String,
    /// The offending operation's arguments.
    pub arguments: Vec<Value>,
    /// Why the operation is unsafe.
    pub reason: String,
    /// How to reach the same schema safely.
    pub safe_alternative: Option<String>,
}

impl UnsafeMigrationError {
    pub(crate) fn new(call: &OperationCall, violation: crate::checks::Violation) -> Self {
        Self {
            check: violation.check,
            operation: call.name().to_string(),
            arguments: call.args.clone(),
            reason: violation.reason,
            safe_alternative: violation.safe_alternative,
        }
    }
}

impl std::fmt::Display for UnsafeMigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "=== Dangerous operation detected: {} ({}) ===\n\n{}",
            self.operation, self.check, self.reason
        )?;
        if let Some(alternative) = &self.safe_alternative {
            write!(f, "\n\nSafe alternative:\n{}", alternative)?;
        }
        Ok(())
    }
}

impl std::error::Error for UnsafeMigrationError {}

/// Errors surfaced to the migration runner.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A safety check rejected an operation. Never retried.
    #[error(transparent)]
    Unsafe(#[from] UnsafeMigrationError),

    /// The database gave up waiting for a lock.
    #[error(transparent)]
    LockTimeout(DatabaseError),

    /// The database cancelled a statement that ran too long.
    #[error(transparent)]
    StatementTimeout(DatabaseError),

    /// Any other adapter error.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The migration has no down step.
    #[error("migration {0} is irreversible")]
    Irreversible(String),

    /// A migration plan could not be loaded.
    #[error("invalid migration plan: {0}")]
    Plan(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// The underlying adapter error, if this came from the database.
    pub fn database_error(&self) -> Option<&DatabaseError> {
        match self {
            MigrationError::LockTimeout(e)
            | MigrationError::StatementTimeout(e)
            | MigrationError::Database(e) => Some(e),
            _ => None,
        }
    }

    /// Check if this error was raised by a safety check.
    pub fn is_unsafe(&self) -> bool {
        matches!(self, MigrationError::Unsafe(_))
    }
}
