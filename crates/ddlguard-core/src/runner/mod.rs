//! Migration execution.
//!
//! The runner ties the pieces together for one migration:
//!
//! 1. Build the [`MigrationContext`] from the configuration and migration.
//! 2. Apply session timeouts.
//! 3. Run the body through a [`Schema`] handle, which checks every operation.
//! 4. Retry lock timeouts. With transactional DDL the whole body is rolled
//!    back and re-run; otherwise each statement is retried in place.
//! 5. Restore the session defaults.

mod plan;
mod schema;
mod state;

pub use plan::{AssuredSteps, MigrationPlan, PlanStep};
pub use schema::Schema;
pub use state::{ExecutionMode, RunReport, StepRecord, StepStatus};

use tracing::{debug, info, instrument, warn};

use crate::adapter::{AdapterKind, Connection, SessionTimeouts, TimeoutConfigurator};
use crate::checks::CheckRegistry;
use crate::config::GuardConfig;
use crate::context::{Direction, MigrationContext};
use crate::engine::SafetyCheckEngine;
use crate::error::MigrationError;
use crate::retry::RetryCoordinator;

/// A single schema migration.
pub trait Migration {
    /// Version number, usually a timestamp.
    fn version(&self) -> u64;

    fn name(&self) -> &str;

    /// Whether the body may run inside a transaction. Returning `false`
    /// runs every statement on its own, as required for e.g. concurrent
    /// index builds.
    fn transactional(&self) -> bool {
        true
    }

    fn up(&self, schema: &mut Schema<'_>) -> Result<(), MigrationError>;

    fn down(&self, _schema: &mut Schema<'_>) -> Result<(), MigrationError> {
        Err(MigrationError::Irreversible(self.name().to_string()))
    }
}

/// Runs migrations against a connection.
pub struct MigrationRunner<'a> {
    config: &'a GuardConfig,
    registry: &'a CheckRegistry,
    conn: &'a mut dyn Connection,
    steps: Vec<StepRecord>,
}

impl<'a> MigrationRunner<'a> {
    /// Create a runner.
    pub fn new(
        config: &'a GuardConfig,
        registry: &'a CheckRegistry,
        conn: &'a mut dyn Connection,
    ) -> Self {
        Self {
            config,
            registry,
            conn,
            steps: Vec::new(),
        }
    }

    /// Steps of the most recent run, including a failed one.
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Run `migration` in `direction`.
    ///
    /// On failure the error is returned unchanged from the adapter or the
    /// check that raised it.
    #[instrument(skip_all, fields(version = migration.version(), name = migration.name(), direction = %direction))]
    pub fn run(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
    ) -> Result<RunReport, MigrationError> {
        let adapter = self.conn.adapter();
        let transactional_ddl = self.conn.supports_transactional_ddl();
        let mode = if transactional_ddl && migration.transactional() {
            ExecutionMode::Transaction
        } else {
            ExecutionMode::PerStatement
        };
        let context = self.context_for(migration, direction, adapter, transactional_ddl);

        info!(
            adapter = %adapter,
            mode = %mode,
            checks = context.checks_enabled,
            "running migration"
        );

        self.steps.clear();
        let result = match mode {
            ExecutionMode::Transaction => self.run_in_transaction(migration, direction, context),
            ExecutionMode::PerStatement => self.run_per_statement(migration, direction, context),
        };

        let applied = self.steps.iter().filter(|s| s.is_succeeded()).count();
        match result {
            Ok(attempts) => {
                info!(attempts, steps = applied, "migration complete");
                Ok(RunReport {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    direction,
                    mode,
                    attempts,
                    steps: self.steps.clone(),
                })
            }
            Err(err) => {
                match mode {
                    ExecutionMode::Transaction => {
                        warn!(error = %err, "migration failed, transaction rolled back")
                    }
                    ExecutionMode::PerStatement => {
                        warn!(error = %err, "migration failed, applied up to step {}", applied)
                    }
                }
                Err(err)
            }
        }
    }

    fn context_for(
        &self,
        migration: &dyn Migration,
        direction: Direction,
        adapter: AdapterKind,
        transactional_ddl: bool,
    ) -> MigrationContext {
        let version = migration.version();
        let started = !matches!(self.config.start_after, Some(after) if version <= after);
        let checked_direction = direction == Direction::Up || self.config.check_down;

        MigrationContext {
            adapter,
            target_version: self.config.target_version.or_else(|| self.conn.server_version()),
            transactional_ddl,
            in_transaction: false,
            direction,
            migration_version: version,
            checks_enabled: started && checked_direction,
            safety_assured: false,
        }
    }

    /// Run the whole body in a transaction, re-running it after a lock
    /// timeout. Returns the number of body attempts.
    fn run_in_transaction(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
        context: MigrationContext,
    ) -> Result<u32, MigrationError> {
        let configurator = TimeoutConfigurator::new(context.adapter, self.config.timeout_settings());
        let retry = RetryCoordinator::new(self.config.retry_policy(), context.adapter);
        let engine = SafetyCheckEngine::new(self.registry);
        let context = MigrationContext {
            in_transaction: true,
            ..context
        };

        let steps = &mut self.steps;
        let mut scope = SessionTimeouts::new(&mut *self.conn, configurator);

        let outcome = retry.run(|attempt| {
            steps.clear();
            if attempt > 1 {
                debug!(attempt, "re-running migration body");
            }

            scope.connection().begin()?;
            // A rollback discards session settings on transactional DDL, so
            // they are applied inside every attempt.
            let result = scope.apply().map_err(MigrationError::from).and_then(|()| {
                let mut schema =
                    Schema::new(scope.connection(), engine, context.clone(), None, &mut *steps);
                migrate(migration, direction, &mut schema)
            });

            match result {
                Ok(()) => {
                    scope.connection().commit()?;
                    Ok(())
                }
                Err(err) => {
                    if let Err(e) = scope.connection().rollback() {
                        warn!(error = %e, "rollback failed");
                    }
                    Err(err)
                }
            }
        });

        let released = scope.release();
        outcome?;
        released?;
        Ok(retry.attempts())
    }

    /// Run the body once with statements retried individually.
    fn run_per_statement(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
        context: MigrationContext,
    ) -> Result<u32, MigrationError> {
        let configurator = TimeoutConfigurator::new(context.adapter, self.config.timeout_settings());
        let retry = RetryCoordinator::new(self.config.retry_policy(), context.adapter);
        let engine = SafetyCheckEngine::new(self.registry);

        let mut scope = SessionTimeouts::enter(&mut *self.conn, configurator)?;
        let outcome = {
            let mut schema =
                Schema::new(scope.connection(), engine, context, Some(&retry), &mut self.steps);
            migrate(migration, direction, &mut schema)
        };

        let released = scope.release();
        outcome?;
        released?;
        Ok(1)
    }
}

fn migrate(
    migration: &dyn Migration,
    direction: Direction,
    schema: &mut Schema<'_>,
) -> Result<(), MigrationError> {
    match direction {
        Direction::Up => migration.up(schema),
        Direction::Down => migration.down(schema),
    }
}
