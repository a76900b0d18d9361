//! The schema handle migrations issue operations through.

use tracing::debug;

use crate::adapter::Connection;
use crate::context::MigrationContext;
use crate::engine::SafetyCheckEngine;
use crate::error::MigrationError;
use crate::operation::{OperationCall, OperationKind, Value};
use crate::retry::RetryCoordinator;

use super::state::StepRecord;

/// Handle passed to [`Migration::up`](super::Migration::up) and
/// [`Migration::down`](super::Migration::down).
///
/// Every operation is checked before it reaches the connection. Outside a
/// transaction each operation is retried on its own when it hits a lock
/// timeout.
pub struct Schema<'a> {
    conn: &'a mut dyn Connection,
    engine: SafetyCheckEngine<'a>,
    context: MigrationContext,
    statement_retry: Option<&'a RetryCoordinator>,
    steps: &'a mut Vec<StepRecord>,
}

impl<'a> Schema<'a> {
    pub(crate) fn new(
        conn: &'a mut dyn Connection,
        engine: SafetyCheckEngine<'a>,
        context: MigrationContext,
        statement_retry: Option<&'a RetryCoordinator>,
        steps: &'a mut Vec<StepRecord>,
    ) -> Self {
        Self {
            conn,
            engine,
            context,
            statement_retry,
            steps,
        }
    }

    /// The context operations are checked against.
    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    /// Check and perform an operation.
    pub fn perform(&mut self, call: OperationCall) -> Result<(), MigrationError> {
        let steps = &mut *self.steps;
        steps.push(StepRecord::new(steps.len(), &call));

        let conn = &mut *self.conn;
        let retry = if self.context.in_transaction {
            None
        } else {
            self.statement_retry
        };
        let mut attempts = 0u32;

        let result = self.engine.intercept(&call, &self.context, |call| {
            if let Some(step) = steps.last_mut() {
                step.start();
            }
            debug!(operation = %call, "performing operation");

            let mut send = |call: &OperationCall| {
                attempts += 1;
                conn.perform(call).map_err(MigrationError::from)
            };
            match retry {
                Some(retry) => retry.run(|_| send(call)),
                None => send(call),
            }
        });

        if let Some(step) = steps.last_mut() {
            match &result {
                Ok(()) => step.complete(attempts),
                Err(MigrationError::Unsafe(err)) => step.reject(err.reason.clone()),
                Err(err) => step.fail(attempts, err.to_string()),
            }
        }
        result
    }

    /// Run `f` with checks disabled. The previous setting is restored
    /// afterwards, whether or not `f` succeeds.
    pub fn safety_assured<F>(&mut self, f: F) -> Result<(), MigrationError>
    where
        F: FnOnce(&mut Self) -> Result<(), MigrationError>,
    {
        let previous = self.context.safety_assured;
        self.context.safety_assured = true;
        let result = f(self);
        self.context.safety_assured = previous;
        result
    }

    pub fn create_table(&mut self, table: &str) -> Result<(), MigrationError> {
        self.perform(OperationCall::new(OperationKind::CreateTable).arg(table))
    }

    pub fn drop_table(&mut self, table: &str) -> Result<(), MigrationError> {
        self.perform(OperationCall::new(OperationKind::DropTable).arg(table))
    }

    pub fn add_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
    ) -> Result<(), MigrationError> {
        self.perform(
            OperationCall::new(OperationKind::AddColumn)
                .arg(table)
                .arg(column)
                .arg(column_type),
        )
    }

    pub fn remove_column(&mut self, table: &str, column: &str) -> Result<(), MigrationError> {
        self.perform(
            OperationCall::new(OperationKind::RemoveColumn)
                .arg(table)
                .arg(column),
        )
    }

    pub fn rename_column(&mut self, table: &str, from: &str, to: &str) -> Result<(), MigrationError> {
        self.perform(
            OperationCall::new(OperationKind::RenameColumn)
                .arg(table)
                .arg(from)
                .arg(to),
        )
    }

    pub fn change_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
    ) -> Result<(), MigrationError> {
        self.perform(
            OperationCall::new(OperationKind::ChangeColumn)
                .arg(table)
                .arg(column)
                .arg(column_type),
        )
    }

    /// Add an index on one or more columns.
    pub fn add_index(&mut self, table: &str, columns: &[&str]) -> Result<(), MigrationError> {
        let columns = match columns {
            [single] => Value::from(*single),
            many => Value::List(many.iter().map(|c| Value::from(*c)).collect()),
        };
        self.perform(
            OperationCall::new(OperationKind::AddIndex)
                .arg(table)
                .arg(columns),
        )
    }

    /// Run raw SQL.
    pub fn execute(&mut self, sql: &str) -> Result<(), MigrationError> {
        self.perform(OperationCall::new(OperationKind::Execute).arg(sql))
    }
}
