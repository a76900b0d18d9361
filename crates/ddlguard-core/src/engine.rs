//! Safety check engine.
//!
//! Sits between a migration and its adapter. Every operation is evaluated
//! against the registry before it reaches the database, so a rejected
//! operation never partially applies.

use tracing::{debug, warn};

use crate::checks::{CheckRegistry, Outcome};
use crate::context::MigrationContext;
use crate::error::{MigrationError, UnsafeMigrationError};
use crate::operation::OperationCall;

/// Evaluates operations against a check registry before they run.
#[derive(Debug, Clone, Copy)]
pub struct SafetyCheckEngine<'r> {
    registry: &'r CheckRegistry,
}

impl<'r> SafetyCheckEngine<'r> {
    /// Create an engine over a populated registry.
    pub fn new(registry: &'r CheckRegistry) -> Self {
        Self { registry }
    }

    /// Check `call` and, if it is safe, run `perform`.
    ///
    /// On a violation `perform` is not called and an
    /// [`UnsafeMigrationError`] is returned. Otherwise the result of
    /// `perform` is returned unchanged.
    pub fn intercept<T, F>(
        &self,
        call: &OperationCall,
        context: &MigrationContext,
        perform: F,
    ) -> Result<T, MigrationError>
    where
        F: FnOnce(&OperationCall) -> Result<T, MigrationError>,
    {
        self.check(call, context)?;
        perform(call)
    }

    /// Check `call` without running it.
    pub fn check(
        &self,
        call: &OperationCall,
        context: &MigrationContext,
    ) -> Result<(), UnsafeMigrationError> {
        if !context.checks_active() {
            debug!(
                operation = call.name(),
                safety_assured = context.safety_assured,
                "checks inactive, skipping evaluation"
            );
            return Ok(());
        }

        match self.registry.evaluate(call, context) {
            Outcome::Pass => Ok(()),
            Outcome::Fail(violation) => {
                warn!(
                    check = %violation.check,
                    operation = call.name(),
                    "unsafe operation rejected"
                );
                Err(UnsafeMigrationError::new(call, violation))
            }
        }
    }
}
