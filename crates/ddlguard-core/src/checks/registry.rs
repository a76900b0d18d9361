//! Ordered collection of safety checks.

use tracing::debug;

use super::{builtin, Check, CheckResult, Outcome};
use crate::context::MigrationContext;
use crate::operation::OperationCall;

/// Registered checks, evaluated in insertion order.
///
/// The registry is populated before migrations run and only borrowed
/// immutably while they run.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    checks: Vec<Check>,
}

impl CheckRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Create a registry holding the built-in checks.
    pub fn with_builtin_checks() -> Self {
        let mut registry = Self::new();
        for check in builtin::checks() {
            registry.register(check);
        }
        registry
    }

    /// Append a check.
    pub fn register(&mut self, check: Check) -> &mut Self {
        self.checks.push(check);
        self
    }

    /// Append a custom check over the operation alone.
    ///
    /// Use [`stop`](super::stop) inside the closure to reject an operation.
    pub fn add_check<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&OperationCall) -> CheckResult + Send + Sync + 'static,
    {
        let name = format!("custom_check_{}", self.checks.len() + 1);
        self.register(Check::new(name, move |call, _| predicate(call)))
    }

    /// Evaluate every applicable check in order. The first failure wins.
    pub fn evaluate(&self, call: &OperationCall, context: &MigrationContext) -> Outcome {
        for check in &self.checks {
            if !check.applies_to(context) {
                debug!(
                    check = check.name(),
                    operation = call.name(),
                    target_version = ?context.target_version,
                    "check not in force, skipping"
                );
                continue;
            }
            if let Err(violation) = check.run(call, context) {
                return Outcome::Fail(violation);
            }
        }
        Outcome::Pass
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Registered checks, in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter()
    }
}
