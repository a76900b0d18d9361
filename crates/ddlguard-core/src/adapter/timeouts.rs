//! Session timeout management.
//!
//! [`TimeoutConfigurator`] knows the adapter-specific commands.
//! [`SessionTimeouts`] scopes them to a connection: once applied, the
//! defaults are restored when the scope is released or dropped.

use std::time::Duration;

use tracing::{debug, warn};

use super::{AdapterKind, Connection};
use crate::config::TimeoutSettings;
use crate::error::DatabaseError;

/// Round up to whole milliseconds.
fn ceil_millis(d: Duration) -> u128 {
    d.as_nanos().div_ceil(1_000_000)
}

/// Round up to whole seconds.
fn ceil_secs(d: Duration) -> u128 {
    d.as_nanos().div_ceil(1_000_000_000)
}

/// Seconds with millisecond precision, rounded up.
fn decimal_secs(d: Duration) -> String {
    let ms = ceil_millis(d);
    if ms % 1000 == 0 {
        format!("{}", ms / 1000)
    } else {
        format!("{}.{:03}", ms / 1000, ms % 1000)
    }
}

/// Builds and issues session timeout commands for one adapter.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfigurator {
    adapter: AdapterKind,
    settings: TimeoutSettings,
}

impl TimeoutConfigurator {
    /// Create a configurator for the given adapter and settings.
    pub fn new(adapter: AdapterKind, settings: TimeoutSettings) -> Self {
        Self { adapter, settings }
    }

    pub fn settings(&self) -> &TimeoutSettings {
        &self.settings
    }

    /// Commands that set the configured timeouts. Unset timeouts are skipped.
    pub fn apply_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();

        if let Some(timeout) = self.settings.statement_timeout {
            statements.push(match self.adapter {
                AdapterKind::Postgresql => {
                    format!("SET statement_timeout = '{}ms'", ceil_millis(timeout))
                }
                AdapterKind::Mysql => {
                    format!("SET max_execution_time = {}", ceil_millis(timeout))
                }
                AdapterKind::Mariadb => {
                    format!("SET max_statement_time = {}", decimal_secs(timeout))
                }
            });
        }

        if let Some(timeout) = self.settings.lock_timeout {
            statements.push(match self.adapter {
                AdapterKind::Postgresql => {
                    format!("SET lock_timeout = '{}ms'", ceil_millis(timeout))
                }
                AdapterKind::Mysql | AdapterKind::Mariadb => {
                    format!("SET lock_wait_timeout = {}", ceil_secs(timeout))
                }
            });
        }

        statements
    }

    /// Commands that restore the defaults for the configured timeouts.
    pub fn reset_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();

        if self.settings.statement_timeout.is_some() {
            statements.push(
                match self.adapter {
                    AdapterKind::Postgresql => "RESET statement_timeout",
                    AdapterKind::Mysql => "SET max_execution_time = DEFAULT",
                    AdapterKind::Mariadb => "SET max_statement_time = DEFAULT",
                }
                .to_string(),
            );
        }

        if self.settings.lock_timeout.is_some() {
            statements.push(
                match self.adapter {
                    AdapterKind::Postgresql => "RESET lock_timeout",
                    AdapterKind::Mysql | AdapterKind::Mariadb => {
                        "SET lock_wait_timeout = DEFAULT"
                    }
                }
                .to_string(),
            );
        }

        statements
    }

    /// Set the configured timeouts on the connection.
    pub fn apply(&self, conn: &mut dyn Connection) -> Result<(), DatabaseError> {
        for sql in self.apply_statements() {
            debug!(adapter = %self.adapter, sql = %sql, "setting session timeout");
            conn.execute(&sql)?;
        }
        Ok(())
    }

    /// Restore the default timeouts on the connection.
    ///
    /// Every reset command is attempted; the first error is returned.
    pub fn reset(&self, conn: &mut dyn Connection) -> Result<(), DatabaseError> {
        let mut first_error = None;
        for sql in self.reset_statements() {
            debug!(adapter = %self.adapter, sql = %sql, "resetting session timeout");
            if let Err(e) = conn.execute(&sql) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Session timeouts scoped to a borrowed connection.
///
/// After [`apply`](Self::apply) the defaults are restored exactly once, by
/// [`release`](Self::release) or, on any other exit path, by `Drop`.
pub struct SessionTimeouts<'c> {
    conn: &'c mut dyn Connection,
    configurator: TimeoutConfigurator,
    applied: bool,
}

impl<'c> SessionTimeouts<'c> {
    /// Take the connection without touching its session state.
    pub fn new(conn: &'c mut dyn Connection, configurator: TimeoutConfigurator) -> Self {
        Self {
            conn,
            configurator,
            applied: false,
        }
    }

    /// Take the connection and apply the timeouts immediately.
    pub fn enter(
        conn: &'c mut dyn Connection,
        configurator: TimeoutConfigurator,
    ) -> Result<Self, DatabaseError> {
        let mut scope = Self::new(conn, configurator);
        scope.apply()?;
        Ok(scope)
    }

    /// Apply the timeouts. May be called again after a rollback discarded
    /// them.
    pub fn apply(&mut self) -> Result<(), DatabaseError> {
        if self.configurator.settings().is_empty() {
            return Ok(());
        }
        // Marked before issuing so a partial apply is still reset.
        self.applied = true;
        self.configurator.apply(self.conn)
    }

    /// The scoped connection.
    pub fn connection(&mut self) -> &mut dyn Connection {
        &mut *self.conn
    }

    /// Restore defaults and end the scope, reporting reset failures.
    pub fn release(mut self) -> Result<(), DatabaseError> {
        if self.applied {
            self.applied = false;
            self.configurator.reset(self.conn)?;
        }
        Ok(())
    }
}

impl Drop for SessionTimeouts<'_> {
    fn drop(&mut self) {
        if self.applied {
            if let Err(e) = self.configurator.reset(self.conn) {
                warn!(error = %e, "failed to reset session timeouts");
            }
        }
    }
}
