//! A connection that records instead of executing.
//!
//! Used for dry runs and tests. It keeps the SQL it was given, tracks
//! `SET`/`RESET` session variables (rolled back with the transaction when the
//! adapter has transactional DDL), and can simulate another session holding
//! an exclusive lock on a table.

use std::collections::{BTreeMap, HashSet, VecDeque};

use super::classifier::lock_timeout_message;
use super::{AdapterKind, Connection};
use crate::config::Version;
use crate::error::DatabaseError;
use crate::operation::OperationCall;

/// Recording connection.
#[derive(Debug)]
pub struct RecordingConnection {
    adapter: AdapterKind,
    transactional_ddl: bool,
    server_version: Option<Version>,
    statements: Vec<String>,
    operations: Vec<OperationCall>,
    perform_attempts: usize,
    session: BTreeMap<String, String>,
    /// Session state at `BEGIN`, restored on rollback.
    savepoint: Option<BTreeMap<String, String>>,
    locked_tables: HashSet<String>,
    scripted_failures: VecDeque<DatabaseError>,
    /// Pending `execute` failures keyed by SQL prefix.
    execute_failures: Vec<(String, DatabaseError)>,
}

impl RecordingConnection {
    /// Create a connection for the given adapter.
    ///
    /// PostgreSQL defaults to transactional DDL; MySQL and MariaDB do not.
    pub fn new(adapter: AdapterKind) -> Self {
        Self {
            adapter,
            transactional_ddl: adapter == AdapterKind::Postgresql,
            server_version: None,
            statements: Vec::new(),
            operations: Vec::new(),
            perform_attempts: 0,
            session: BTreeMap::new(),
            savepoint: None,
            locked_tables: HashSet::new(),
            scripted_failures: VecDeque::new(),
            execute_failures: Vec::new(),
        }
    }

    /// Override the transactional DDL capability.
    pub fn with_transactional_ddl(mut self, enabled: bool) -> Self {
        self.transactional_ddl = enabled;
        self
    }

    /// Report `version` as the server version.
    pub fn with_server_version(mut self, version: Version) -> Self {
        self.server_version = Some(version);
        self
    }

    /// Simulate another session holding an exclusive lock on `table`.
    ///
    /// Every operation on the table fails with the adapter's lock timeout.
    pub fn lock_table(&mut self, table: impl Into<String>) {
        self.locked_tables.insert(table.into());
    }

    /// Release a simulated table lock.
    pub fn unlock_table(&mut self, table: &str) {
        self.locked_tables.remove(table);
    }

    /// Fail the next `perform` with `error`. Failures queue in order.
    pub fn fail_next_perform(&mut self, error: DatabaseError) {
        self.scripted_failures.push_back(error);
    }

    /// Fail the next `execute` whose SQL starts with `prefix`.
    ///
    /// The statement is still recorded but leaves the session unchanged.
    pub fn fail_next_execute(&mut self, prefix: impl Into<String>, error: DatabaseError) {
        self.execute_failures.push((prefix.into(), error));
    }

    /// Raw SQL received, including transaction control.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Operations that completed.
    pub fn operations(&self) -> &[OperationCall] {
        &self.operations
    }

    /// Number of `perform` calls, successful or not.
    pub fn perform_attempts(&self) -> usize {
        self.perform_attempts
    }

    /// Current value of a session variable, `None` when at its default.
    pub fn session_value(&self, name: &str) -> Option<&str> {
        self.session.get(name).map(String::as_str)
    }

    /// Check if a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.savepoint.is_some()
    }

    fn track_session(&mut self, sql: &str) {
        let sql = sql.trim().trim_end_matches(';');

        if let Some(name) = strip_keyword(sql, "RESET") {
            self.session.remove(name.trim());
        } else if let Some(rest) = strip_keyword(sql, "SET") {
            if let Some((name, value)) = rest.split_once('=') {
                let name = name.trim().to_string();
                let value = value.trim().trim_matches('\'');
                if value.eq_ignore_ascii_case("DEFAULT") {
                    self.session.remove(&name);
                } else {
                    self.session.insert(name, value.to_string());
                }
            }
        }
    }
}

fn strip_keyword<'a>(sql: &'a str, keyword: &str) -> Option<&'a str> {
    let head = sql.get(..keyword.len())?;
    let rest = &sql[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(' ')).then_some(rest)
}

impl Connection for RecordingConnection {
    fn adapter(&self) -> AdapterKind {
        self.adapter
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.transactional_ddl
    }

    fn server_version(&self) -> Option<Version> {
        self.server_version
    }

    fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        self.statements.push(sql.to_string());

        if let Some(pos) = self
            .execute_failures
            .iter()
            .position(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            let (_, error) = self.execute_failures.remove(pos);
            return Err(error);
        }

        self.track_session(sql);
        Ok(())
    }

    fn perform(&mut self, call: &OperationCall) -> Result<(), DatabaseError> {
        self.perform_attempts += 1;

        if let Some(error) = self.scripted_failures.pop_front() {
            return Err(error);
        }
        if call.table().is_some_and(|t| self.locked_tables.contains(t)) {
            return Err(DatabaseError::new(lock_timeout_message(self.adapter)));
        }

        self.operations.push(call.clone());
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DatabaseError> {
        if self.savepoint.is_some() {
            return Err(DatabaseError::new("transaction already open"));
        }
        self.statements.push("BEGIN".to_string());
        self.savepoint = Some(self.session.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        if self.savepoint.take().is_none() {
            return Err(DatabaseError::new("no transaction is open"));
        }
        self.statements.push("COMMIT".to_string());
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        let Some(saved) = self.savepoint.take() else {
            return Err(DatabaseError::new("no transaction is open"));
        };
        self.statements.push("ROLLBACK".to_string());
        if self.transactional_ddl {
            self.session = saved;
        }
        Ok(())
    }
}
