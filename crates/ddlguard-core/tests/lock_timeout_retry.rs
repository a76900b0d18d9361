//! Integration tests for lock timeout retries.
//!
//! The `users` table is held by another session for the whole run, so every
//! attempt times out waiting for its lock.

use std::cell::Cell;
use std::time::Duration;

use ddlguard_core::{
    AdapterKind, CheckRegistry, Direction, GuardConfig, Migration, MigrationError,
    MigrationRunner, RecordingConnection, Schema,
};

struct CheckLockTimeoutRetries {
    transactional: bool,
    attempts: Cell<u32>,
}

impl CheckLockTimeoutRetries {
    fn new(transactional: bool) -> Self {
        Self {
            transactional,
            attempts: Cell::new(0),
        }
    }
}

impl Migration for CheckLockTimeoutRetries {
    fn version(&self) -> u64 {
        20240101000001
    }

    fn name(&self) -> &str {
        "check_lock_timeout_retries"
    }

    fn transactional(&self) -> bool {
        self.transactional
    }

    fn up(&self, schema: &mut Schema<'_>) -> Result<(), MigrationError> {
        self.attempts.set(self.attempts.get() + 1);
        schema.add_column("users", "nickname", "string")
    }
}

fn with_lock_timeout_retries(adapter: AdapterKind) -> (GuardConfig, RecordingConnection) {
    let lock_timeout = match adapter {
        AdapterKind::Postgresql => Duration::from_millis(100),
        _ => Duration::from_secs(1),
    };
    let config = GuardConfig::new()
        .with_lock_timeout(lock_timeout)
        .with_lock_timeout_retries(1)
        .with_lock_timeout_delay(Duration::ZERO);

    let mut conn = RecordingConnection::new(adapter);
    conn.lock_table("users");
    (config, conn)
}

fn migrate(
    config: &GuardConfig,
    conn: &mut RecordingConnection,
    migration: &dyn Migration,
) -> Result<(), MigrationError> {
    let registry = CheckRegistry::with_builtin_checks();
    MigrationRunner::new(config, &registry, conn)
        .run(migration, Direction::Up)
        .map(|_| ())
}

fn assert_lock_timeout(adapter: AdapterKind, error: &MigrationError) {
    assert!(matches!(error, MigrationError::LockTimeout(_)), "{:?}", error);
    let expected = match adapter {
        AdapterKind::Postgresql => "canceling statement due to lock timeout",
        _ => "Lock wait timeout exceeded",
    };
    assert!(
        error.to_string().contains(expected),
        "unexpected message: {}",
        error
    );
}

#[test]
fn test_lock_timeout_retries_postgresql() {
    let (config, mut conn) = with_lock_timeout_retries(AdapterKind::Postgresql);
    let migration = CheckLockTimeoutRetries::new(true);

    let error = migrate(&config, &mut conn, &migration).unwrap_err();

    assert_lock_timeout(AdapterKind::Postgresql, &error);
    assert_eq!(migration.attempts.get(), 2);
    assert_eq!(conn.perform_attempts(), 2);
    assert!(conn.operations().is_empty());
    assert!(!conn.in_transaction());
    assert_eq!(conn.session_value("lock_timeout"), None);
}

#[test]
fn test_lock_timeout_retries_mysql() {
    let (config, mut conn) = with_lock_timeout_retries(AdapterKind::Mysql);
    let migration = CheckLockTimeoutRetries::new(true);

    let error = migrate(&config, &mut conn, &migration).unwrap_err();

    assert_lock_timeout(AdapterKind::Mysql, &error);
    // No DDL transactions: the statement is retried, the body runs once.
    assert_eq!(migration.attempts.get(), 1);
    assert_eq!(conn.perform_attempts(), 2);
    assert_eq!(conn.session_value("lock_wait_timeout"), None);
}

#[test]
fn test_lock_timeout_retries_mariadb() {
    let (config, mut conn) = with_lock_timeout_retries(AdapterKind::Mariadb);
    let migration = CheckLockTimeoutRetries::new(true);

    let error = migrate(&config, &mut conn, &migration).unwrap_err();

    assert_lock_timeout(AdapterKind::Mariadb, &error);
    assert_eq!(migration.attempts.get(), 1);
    assert_eq!(conn.session_value("lock_wait_timeout"), None);
}

#[test]
fn test_lock_timeout_retries_no_transaction() {
    for adapter in [
        AdapterKind::Postgresql,
        AdapterKind::Mysql,
        AdapterKind::Mariadb,
    ] {
        let (config, mut conn) = with_lock_timeout_retries(adapter);
        let migration = CheckLockTimeoutRetries::new(false);

        let error = migrate(&config, &mut conn, &migration).unwrap_err();

        assert_lock_timeout(adapter, &error);
        assert_eq!(migration.attempts.get(), 1, "{}", adapter);
        assert_eq!(conn.perform_attempts(), 2, "{}", adapter);
        assert!(!conn.statements().contains(&"BEGIN".to_string()));
    }
}

#[test]
fn test_lock_released_between_attempts_succeeds() {
    let (config, mut conn) = with_lock_timeout_retries(AdapterKind::Postgresql);
    conn.unlock_table("users");
    conn.fail_next_perform(ddlguard_core::DatabaseError::new(
        "PG::LockNotAvailable: ERROR:  canceling statement due to lock timeout",
    ));
    let migration = CheckLockTimeoutRetries::new(true);

    migrate(&config, &mut conn, &migration).unwrap();

    assert_eq!(migration.attempts.get(), 2);
    assert_eq!(conn.operations().len(), 1);
    assert_eq!(conn.session_value("lock_timeout"), None);
}

#[test]
fn test_no_retries_configured() {
    let (config, mut conn) = with_lock_timeout_retries(AdapterKind::Postgresql);
    let config = config.with_lock_timeout_retries(0);
    let migration = CheckLockTimeoutRetries::new(true);

    let error = migrate(&config, &mut conn, &migration).unwrap_err();

    assert_lock_timeout(AdapterKind::Postgresql, &error);
    assert_eq!(migration.attempts.get(), 1);
}

#[test]
fn test_statement_timeout_is_not_retried() {
    let config = GuardConfig::new()
        .with_statement_timeout(Duration::from_secs(1))
        .with_lock_timeout_retries(3)
        .with_lock_timeout_delay(Duration::ZERO);
    let mut conn = RecordingConnection::new(AdapterKind::Postgresql);
    conn.fail_next_perform(ddlguard_core::DatabaseError::new(
        "ERROR:  canceling statement due to statement timeout",
    ));
    let migration = CheckLockTimeoutRetries::new(true);

    let error = migrate(&config, &mut conn, &migration).unwrap_err();

    assert!(matches!(error, MigrationError::StatementTimeout(_)));
    assert_eq!(migration.attempts.get(), 1);
    assert_eq!(conn.session_value("statement_timeout"), None);
}
