//! ddlguard core - safety checks and lock-timeout retries for schema migrations.
//!
//! Migrations issue operations through a [`Schema`] handle. Each operation is
//! evaluated against a [`CheckRegistry`] before it reaches the database, and
//! lock timeouts are retried according to the [`GuardConfig`].
//!
//! ```no_run
//! use ddlguard_core::{
//!     AdapterKind, CheckRegistry, Direction, GuardConfig, MigrationPlan, MigrationRunner,
//!     RecordingConnection,
//! };
//!
//! let config = GuardConfig::default();
//! let registry = CheckRegistry::with_builtin_checks();
//! let plan = MigrationPlan::from_path("migrations/20240101000000_add_nickname.json")?;
//!
//! let mut conn = RecordingConnection::new(AdapterKind::Postgresql);
//! let report = MigrationRunner::new(&config, &registry, &mut conn).run(&plan, Direction::Up)?;
//! println!("{} steps applied", report.steps_applied());
//! # Ok::<(), ddlguard_core::MigrationError>(())
//! ```

pub mod adapter;
pub mod checks;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod operation;
pub mod retry;
pub mod runner;

pub use adapter::{
    classify, AdapterKind, Connection, ErrorClass, RecordingConnection, SessionTimeouts,
    TimeoutConfigurator,
};
pub use checks::{fail, stop, Check, CheckRegistry, CheckResult, Outcome, VersionWindow, Violation};
pub use config::{GuardConfig, RetryPolicy, TimeoutSettings, Version, DEFAULT_LOCK_TIMEOUT_DELAY};
pub use context::{Direction, MigrationContext};
pub use engine::SafetyCheckEngine;
pub use error::{DatabaseError, MigrationError, UnsafeMigrationError};
pub use operation::{OperationCall, OperationKind, Value};
pub use retry::{RetryCoordinator, RetryState};
pub use runner::{
    AssuredSteps, ExecutionMode, Migration, MigrationPlan, MigrationRunner, PlanStep, RunReport, Schema,
    StepRecord, StepStatus,
};
