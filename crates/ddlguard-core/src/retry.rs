//! Lock timeout retries.
//!
//! The coordinator runs an operation, classifies what it raised, and retries
//! lock timeouts up to the policy limit with a blocking delay in between.
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!              |
//!              v
//!         Classifying -> Failed
//!              |
//!              v
//!          Retrying -> Attempting
//! ```

use std::cell::Cell;
use std::fmt;

use tracing::{debug, warn};

use crate::adapter::{classify, AdapterKind, ErrorClass};
use crate::config::RetryPolicy;
use crate::error::MigrationError;

/// Where the coordinator is in its retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting,
    Classifying,
    Retrying,
    Succeeded,
    Failed,
}

impl RetryState {
    /// Check if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded | RetryState::Failed)
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryState::Idle => write!(f, "idle"),
            RetryState::Attempting => write!(f, "attempting"),
            RetryState::Classifying => write!(f, "classifying"),
            RetryState::Retrying => write!(f, "retrying"),
            RetryState::Succeeded => write!(f, "succeeded"),
            RetryState::Failed => write!(f, "failed"),
        }
    }
}

/// Retries an operation on lock timeouts.
#[derive(Debug)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
    adapter: AdapterKind,
    attempts: Cell<u32>,
    state: Cell<RetryState>,
}

impl RetryCoordinator {
    /// Create a coordinator for the given policy and adapter.
    pub fn new(policy: RetryPolicy, adapter: AdapterKind) -> Self {
        Self {
            policy,
            adapter,
            attempts: Cell::new(0),
            state: Cell::new(RetryState::Idle),
        }
    }

    /// Attempts made by the most recent run.
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    /// State reached by the most recent run.
    pub fn state(&self) -> RetryState {
        self.state.get()
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    ///
    /// `attempt` receives the 1-based attempt number. Unsafe-migration errors
    /// are returned at once without classification. A terminal database
    /// error is returned with its message unchanged, tagged as a lock or
    /// statement timeout when it is one.
    pub fn run<T, F>(&self, mut attempt: F) -> Result<T, MigrationError>
    where
        F: FnMut(u32) -> Result<T, MigrationError>,
    {
        let policy = self.policy;
        self.attempts.set(0);
        self.state.set(RetryState::Idle);

        loop {
            self.state.set(RetryState::Attempting);
            let n = self.attempts.get() + 1;
            self.attempts.set(n);

            let err = match attempt(n) {
                Ok(value) => {
                    self.state.set(RetryState::Succeeded);
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.is_unsafe() {
                self.state.set(RetryState::Failed);
                return Err(err);
            }

            self.state.set(RetryState::Classifying);
            let class = self.classify(&err);
            debug!(attempt = n, class = ?class, "classified failed attempt");

            if class == ErrorClass::LockTimeout && n <= policy.max_retries {
                self.state.set(RetryState::Retrying);
                warn!(
                    attempt = n,
                    max_retries = policy.max_retries,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Lock timeout. Retrying"
                );
                if !policy.delay.is_zero() {
                    std::thread::sleep(policy.delay);
                }
                continue;
            }

            self.state.set(RetryState::Failed);
            return Err(tag(err, class));
        }
    }

    fn classify(&self, err: &MigrationError) -> ErrorClass {
        match err {
            MigrationError::LockTimeout(_) => ErrorClass::LockTimeout,
            MigrationError::StatementTimeout(_) => ErrorClass::StatementTimeout,
            MigrationError::Database(e) => classify(e, self.adapter),
            _ => ErrorClass::Other,
        }
    }
}

fn tag(err: MigrationError, class: ErrorClass) -> MigrationError {
    match (err, class) {
        (MigrationError::Database(e), ErrorClass::LockTimeout) => MigrationError::LockTimeout(e),
        (MigrationError::Database(e), ErrorClass::StatementTimeout) => {
            MigrationError::StatementTimeout(e)
        }
        (err, _) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Violation;
    use crate::error::{DatabaseError, UnsafeMigrationError};
    use crate::operation::{OperationCall, OperationKind};
    use std::time::{Duration, Instant};

    const PG_LOCK: &str = "ERROR:  canceling statement due to lock timeout";

    fn coordinator(max_retries: u32) -> RetryCoordinator {
        RetryCoordinator::new(
            RetryPolicy::new(max_retries, Duration::ZERO),
            AdapterKind::Postgresql,
        )
    }

    fn db(message: &str) -> MigrationError {
        MigrationError::Database(DatabaseError::new(message))
    }

    #[test]
    fn test_success_on_first_attempt() {
        let retry = coordinator(3);
        assert_eq!(retry.state(), RetryState::Idle);

        let value = retry.run(|n| Ok::<_, MigrationError>(n * 10)).unwrap();
        assert_eq!(value, 10);
        assert_eq!(retry.attempts(), 1);
        assert_eq!(retry.state(), RetryState::Succeeded);
    }

    #[test]
    fn test_retries_lock_timeout_then_succeeds() {
        let retry = coordinator(1);
        let result = retry.run(|n| if n == 1 { Err(db(PG_LOCK)) } else { Ok(()) });

        assert!(result.is_ok());
        assert_eq!(retry.attempts(), 2);
    }

    #[test]
    fn test_exhausted_retries_surface_original_message() {
        let retry = coordinator(1);
        let err = retry.run(|_| -> Result<(), _> { Err(db(PG_LOCK)) }).unwrap_err();

        assert_eq!(retry.attempts(), 2);
        assert_eq!(retry.state(), RetryState::Failed);
        assert!(matches!(err, MigrationError::LockTimeout(_)));
        assert_eq!(err.to_string(), PG_LOCK);
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let retry = coordinator(0);
        let err = retry.run(|_| -> Result<(), _> { Err(db(PG_LOCK)) }).unwrap_err();

        assert_eq!(retry.attempts(), 1);
        assert!(matches!(err, MigrationError::LockTimeout(_)));
    }

    #[test]
    fn test_statement_timeout_not_retried() {
        let retry = coordinator(5);
        let err = retry
            .run(|_| -> Result<(), _> {
                Err(db("ERROR:  canceling statement due to statement timeout"))
            })
            .unwrap_err();

        assert_eq!(retry.attempts(), 1);
        assert!(matches!(err, MigrationError::StatementTimeout(_)));
    }

    #[test]
    fn test_other_errors_not_retried() {
        let retry = coordinator(5);
        let err = retry
            .run(|_| -> Result<(), _> { Err(db("ERROR:  column \"name\" already exists")) })
            .unwrap_err();

        assert_eq!(retry.attempts(), 1);
        assert!(matches!(err, MigrationError::Database(_)));
        assert_eq!(err.to_string(), "ERROR:  column \"name\" already exists");
    }

    #[test]
    fn test_unsafe_bypasses_classification() {
        let retry = coordinator(5);
        let call = OperationCall::new(OperationKind::RemoveColumn);
        let err = retry
            .run(|_| -> Result<(), _> {
                Err(UnsafeMigrationError::new(&call, Violation::new("no").named("custom")).into())
            })
            .unwrap_err();

        assert!(err.is_unsafe());
        assert_eq!(retry.attempts(), 1);
        assert_eq!(retry.state(), RetryState::Failed);
    }

    #[test]
    fn test_already_classified_lock_timeout_is_retried() {
        let retry = coordinator(2);
        let err = retry
            .run(|_| -> Result<(), _> {
                Err(MigrationError::LockTimeout(DatabaseError::new(PG_LOCK)))
            })
            .unwrap_err();

        assert_eq!(retry.attempts(), 3);
        assert!(matches!(err, MigrationError::LockTimeout(_)));
    }

    #[test]
    fn test_delay_blocks_between_attempts() {
        let retry = RetryCoordinator::new(
            RetryPolicy::new(1, Duration::from_millis(20)),
            AdapterKind::Mysql,
        );
        let start = Instant::now();
        let _ = retry.run(|_| -> Result<(), _> { Err(db("Lock wait timeout exceeded")) });

        assert_eq!(retry.attempts(), 2);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_state_terminal() {
        assert!(RetryState::Succeeded.is_terminal());
        assert!(RetryState::Failed.is_terminal());
        assert!(!RetryState::Retrying.is_terminal());
    }
}
