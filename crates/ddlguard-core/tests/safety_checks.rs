//! Integration tests for safety checks running through the migration runner.

use std::time::Duration;

use ddlguard_core::{
    stop, AdapterKind, Check, CheckRegistry, Direction, GuardConfig, Migration, MigrationError,
    MigrationPlan, MigrationRunner, OperationKind, RecordingConnection, Schema, StepStatus,
    Version,
};

struct AddForbiddenColumn;

impl Migration for AddForbiddenColumn {
    fn version(&self) -> u64 {
        20240101000002
    }

    fn name(&self) -> &str {
        "add_forbidden_column"
    }

    fn up(&self, schema: &mut Schema<'_>) -> Result<(), MigrationError> {
        schema.add_column("users", "forbidden", "string")
    }

    fn down(&self, schema: &mut Schema<'_>) -> Result<(), MigrationError> {
        schema.remove_column("users", "forbidden")
    }
}

fn registry_with_custom_check() -> CheckRegistry {
    let mut registry = CheckRegistry::with_builtin_checks();
    registry.add_check(|call| {
        if call.kind == OperationKind::AddColumn && call.arg_str(1) == Some("forbidden") {
            return stop("Cannot add forbidden column");
        }
        Ok(())
    });
    registry
}

#[test]
fn test_custom_check_rejects_operation() {
    let config = GuardConfig::default();
    let registry = registry_with_custom_check();
    let mut conn = RecordingConnection::new(AdapterKind::Postgresql);

    let error = MigrationRunner::new(&config, &registry, &mut conn)
        .run(&AddForbiddenColumn, Direction::Up)
        .unwrap_err();

    match &error {
        MigrationError::Unsafe(unsafe_error) => {
            assert_eq!(unsafe_error.reason, "Cannot add forbidden column");
            assert_eq!(unsafe_error.operation, "add_column");
        }
        other => panic!("expected unsafe error, got {:?}", other),
    }
    assert!(error.to_string().contains("Cannot add forbidden column"));
    assert_eq!(conn.perform_attempts(), 0);
    assert!(!conn.in_transaction());
}

#[test]
fn test_unsafe_operation_is_never_retried() {
    let config = GuardConfig::new()
        .with_lock_timeout(Duration::from_millis(100))
        .with_lock_timeout_retries(3)
        .with_lock_timeout_delay(Duration::ZERO);
    let registry = registry_with_custom_check();

    for adapter in [AdapterKind::Postgresql, AdapterKind::Mysql] {
        let mut conn = RecordingConnection::new(adapter);
        let mut runner = MigrationRunner::new(&config, &registry, &mut conn);

        let error = runner.run(&AddForbiddenColumn, Direction::Up).unwrap_err();

        assert!(error.is_unsafe());
        assert_eq!(runner.steps().len(), 1);
        assert_eq!(runner.steps()[0].status, StepStatus::Unsafe);
        assert_eq!(runner.steps()[0].attempts, 0);
        assert_eq!(conn.perform_attempts(), 0);
    }
}

#[test]
fn test_down_is_unchecked_unless_enabled() {
    let registry = CheckRegistry::with_builtin_checks();
    let mut conn = RecordingConnection::new(AdapterKind::Postgresql);

    let config = GuardConfig::default();
    let report = MigrationRunner::new(&config, &registry, &mut conn)
        .run(&AddForbiddenColumn, Direction::Down)
        .unwrap();
    assert_eq!(report.steps_applied(), 1);

    let config = GuardConfig::new().with_check_down(true);
    let error = MigrationRunner::new(&config, &registry, &mut conn)
        .run(&AddForbiddenColumn, Direction::Down)
        .unwrap_err();
    match error {
        MigrationError::Unsafe(e) => assert_eq!(e.check, "remove_column"),
        other => panic!("expected unsafe error, got {:?}", other),
    }
}

#[test]
fn test_start_after_skips_old_migrations() {
    let registry = registry_with_custom_check();
    let mut conn = RecordingConnection::new(AdapterKind::Mysql);

    let config = GuardConfig::new().with_start_after(20240101000002);
    assert!(MigrationRunner::new(&config, &registry, &mut conn)
        .run(&AddForbiddenColumn, Direction::Up)
        .is_ok());

    let config = GuardConfig::new().with_start_after(20240101000001);
    assert!(MigrationRunner::new(&config, &registry, &mut conn)
        .run(&AddForbiddenColumn, Direction::Up)
        .unwrap_err()
        .is_unsafe());
}

#[test]
fn test_safety_assured_block() {
    struct RemoveLegacy;

    impl Migration for RemoveLegacy {
        fn version(&self) -> u64 {
            20240101000003
        }

        fn name(&self) -> &str {
            "remove_legacy"
        }

        fn up(&self, schema: &mut Schema<'_>) -> Result<(), MigrationError> {
            schema.safety_assured(|s| s.remove_column("users", "legacy"))?;
            assert!(!schema.context().safety_assured);
            schema.remove_column("users", "other")
        }
    }

    let config = GuardConfig::default();
    let registry = CheckRegistry::with_builtin_checks();
    let mut conn = RecordingConnection::new(AdapterKind::Mysql);

    let error = MigrationRunner::new(&config, &registry, &mut conn)
        .run(&RemoveLegacy, Direction::Up)
        .unwrap_err();

    assert!(error.is_unsafe());
    // The assured removal ran; the unguarded one did not.
    assert_eq!(conn.operations().len(), 1);
    assert_eq!(conn.operations()[0].arg_str(1), Some("legacy"));
}

#[test]
fn test_target_version_gates_checks() {
    let registry = CheckRegistry::with_builtin_checks();
    let add_with_default = r#"{
        "version": 20240101000004,
        "name": "add_status",
        "up": [{ "op": "add_column", "args": ["users", "status", "string"], "options": { "default": "active" } }]
    }"#;
    let plan = MigrationPlan::from_json(add_with_default).unwrap();

    let old = GuardConfig::new().with_target_version(Version::new(10, 0, 0));
    let mut conn = RecordingConnection::new(AdapterKind::Postgresql);
    let error = MigrationRunner::new(&old, &registry, &mut conn)
        .run(&plan, Direction::Up)
        .unwrap_err();
    match error {
        MigrationError::Unsafe(e) => assert_eq!(e.check, "add_column_default"),
        other => panic!("expected unsafe error, got {:?}", other),
    }

    let current = GuardConfig::new().with_target_version(Version::new(11, 0, 0));
    let report = MigrationRunner::new(&current, &registry, &mut conn)
        .run(&plan, Direction::Up)
        .unwrap();
    assert_eq!(report.steps_applied(), 1);
}

#[test]
fn test_server_version_used_without_target_version() {
    let registry = CheckRegistry::with_builtin_checks();
    let config = GuardConfig::default();
    let plan = MigrationPlan::from_json(
        r#"{
            "version": 7,
            "name": "add_status",
            "up": [{ "op": "add_column", "args": ["users", "status", "string"], "options": { "default": "active" } }]
        }"#,
    )
    .unwrap();

    let mut current =
        RecordingConnection::new(AdapterKind::Postgresql).with_server_version(Version::new(16, 2, 0));
    assert!(MigrationRunner::new(&config, &registry, &mut current)
        .run(&plan, Direction::Up)
        .is_ok());

    let mut old =
        RecordingConnection::new(AdapterKind::Postgresql).with_server_version(Version::new(10, 0, 0));
    assert!(MigrationRunner::new(&config, &registry, &mut old)
        .run(&plan, Direction::Up)
        .unwrap_err()
        .is_unsafe());

    // An explicit target version wins over the server's.
    let pinned = GuardConfig::new().with_target_version(Version::new(10, 0, 0));
    let mut current =
        RecordingConnection::new(AdapterKind::Postgresql).with_server_version(Version::new(16, 2, 0));
    assert!(MigrationRunner::new(&pinned, &registry, &mut current)
        .run(&plan, Direction::Up)
        .unwrap_err()
        .is_unsafe());
}

#[test]
fn test_registered_check_limited_to_adapter() {
    let mut registry = CheckRegistry::new();
    registry.register(
        Check::new("no_indexes_on_mysql", |call, _| {
            if call.kind == OperationKind::AddIndex {
                return stop("Indexes are built offline on this cluster");
            }
            Ok(())
        })
        .for_adapter(AdapterKind::Mysql),
    );
    let config = GuardConfig::default();
    let plan = MigrationPlan::from_json(
        r#"{ "version": 5, "name": "index_email", "up": [{ "op": "add_index", "args": ["users", "email"] }] }"#,
    )
    .unwrap();

    let mut pg = RecordingConnection::new(AdapterKind::Postgresql);
    assert!(MigrationRunner::new(&config, &registry, &mut pg)
        .run(&plan, Direction::Up)
        .is_ok());

    let mut mysql = RecordingConnection::new(AdapterKind::Mysql);
    let error = MigrationRunner::new(&config, &registry, &mut mysql)
        .run(&plan, Direction::Up)
        .unwrap_err();
    assert!(error.to_string().contains("Indexes are built offline"));
}

#[test]
fn test_plan_safety_assured_steps() {
    let registry = CheckRegistry::with_builtin_checks();
    let config = GuardConfig::default();
    let plan = MigrationPlan::from_json(
        r#"{
            "version": 6,
            "name": "cleanup",
            "transactional": false,
            "up": [
                { "safety_assured": [{ "op": "execute", "args": ["UPDATE users SET status = 'active'"] }] },
                { "op": "execute", "args": ["DELETE FROM users"] }
            ]
        }"#,
    )
    .unwrap();
    let mut conn = RecordingConnection::new(AdapterKind::Postgresql);

    let mut runner = MigrationRunner::new(&config, &registry, &mut conn);
    let error = runner.run(&plan, Direction::Up).unwrap_err();

    assert!(error.is_unsafe());
    assert_eq!(runner.steps()[0].status, StepStatus::Succeeded);
    assert_eq!(runner.steps()[1].status, StepStatus::Unsafe);
    // Per-statement mode keeps what already ran.
    assert_eq!(conn.operations().len(), 1);
}
