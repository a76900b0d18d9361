//! Safety checks.
//!
//! A [`Check`] is a named predicate over an operation and its context. It
//! passes with `Ok(())` or fails with a [`Violation`]. Checks can be limited
//! to certain adapters and to a window of target server versions.
//!
//! | Helper | Produces |
//! |--------|----------|
//! | [`stop`] | a failure with a custom message |
//! | [`fail`] | a failure with a reason and a safe alternative |

pub mod builtin;
pub mod registry;

pub use registry::CheckRegistry;

use std::fmt;
use std::sync::Arc;

use crate::adapter::AdapterKind;
use crate::config::Version;
use crate::context::MigrationContext;
use crate::operation::OperationCall;

/// Why a check rejected an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the failing check. Filled in by the registry.
    pub check: String,
    /// Human-readable reason.
    pub reason: String,
    /// Suggested safe way to make the same change.
    pub safe_alternative: Option<String>,
}

impl Violation {
    /// Create a violation with a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            check: String::new(),
            reason: reason.into(),
            safe_alternative: None,
        }
    }

    /// Attach a safe alternative.
    pub fn with_alternative(mut self, alternative: impl Into<String>) -> Self {
        self.safe_alternative = Some(alternative.into());
        self
    }

    /// Attribute the violation to a check.
    pub fn named(mut self, check: impl Into<String>) -> Self {
        self.check = check.into();
        self
    }
}

/// Result of running a single check.
pub type CheckResult = Result<(), Violation>;

/// Fail the current check with a custom message.
///
/// The message replaces any default reason text.
pub fn stop(message: impl Into<String>) -> CheckResult {
    Err(Violation::new(message))
}

/// Fail the current check with a reason and a safe alternative.
pub fn fail(reason: impl Into<String>, alternative: impl Into<String>) -> CheckResult {
    Err(Violation::new(reason).with_alternative(alternative))
}

/// Outcome of evaluating all registered checks against one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail(Violation),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }
}

/// Target versions a check applies to.
///
/// `since` is inclusive and `until` exclusive. With no target version
/// configured every window applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionWindow {
    pub since: Option<Version>,
    pub until: Option<Version>,
}

impl VersionWindow {
    /// Check if the window covers `target`.
    pub fn covers(&self, target: Option<Version>) -> bool {
        let Some(target) = target else {
            return true;
        };
        self.since.map_or(true, |since| target >= since)
            && self.until.map_or(true, |until| target < until)
    }
}

type Predicate = dyn Fn(&OperationCall, &MigrationContext) -> CheckResult + Send + Sync;

/// A named safety rule.
#[derive(Clone)]
pub struct Check {
    name: String,
    window: VersionWindow,
    adapters: Vec<AdapterKind>,
    predicate: Arc<Predicate>,
}

impl Check {
    /// Create a check that applies to every adapter and version.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&OperationCall, &MigrationContext) -> CheckResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            window: VersionWindow::default(),
            adapters: Vec::new(),
            predicate: Arc::new(predicate),
        }
    }

    /// Only apply from `version` onwards (inclusive).
    pub fn since(mut self, version: Version) -> Self {
        self.window.since = Some(version);
        self
    }

    /// Only apply below `version`.
    pub fn until(mut self, version: Version) -> Self {
        self.window.until = Some(version);
        self
    }

    /// Restrict the check to an adapter. May be called more than once.
    pub fn for_adapter(mut self, adapter: AdapterKind) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> VersionWindow {
        self.window
    }

    /// Adapters the check is limited to. Empty means all.
    pub fn adapters(&self) -> &[AdapterKind] {
        &self.adapters
    }

    /// Check if this rule is in force for the context.
    pub fn applies_to(&self, context: &MigrationContext) -> bool {
        (self.adapters.is_empty() || self.adapters.contains(&context.adapter))
            && self.window.covers(context.target_version)
    }

    /// Run the predicate, attributing any violation to this check.
    pub fn run(&self, call: &OperationCall, context: &MigrationContext) -> CheckResult {
        (self.predicate)(call, context).map_err(|v| v.named(self.name.clone()))
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("window", &self.window)
            .field("adapters", &self.adapters)
            .finish()
    }
}
