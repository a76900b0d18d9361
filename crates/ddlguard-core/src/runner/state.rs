//! Step tracking and run reports.

use serde::Serialize;

use crate::context::Direction;
use crate::operation::OperationCall;

/// How a migration's statements are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The whole body runs in one transaction and is retried as a unit.
    Transaction,
    /// Statements run on their own and each is retried in place.
    PerStatement,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Transaction => write!(f, "transaction"),
            ExecutionMode::PerStatement => write!(f, "per_statement"),
        }
    }
}

/// Status of a single step within a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step recorded but not yet sent.
    Pending,
    /// Step is being sent to the adapter.
    Executing,
    /// Step was rejected by a safety check.
    Unsafe,
    /// Step failed in the adapter.
    Failed,
    /// Step completed successfully.
    Succeeded,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Executing => write!(f, "executing"),
            StepStatus::Unsafe => write!(f, "unsafe"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Succeeded => write!(f, "succeeded"),
        }
    }
}

/// Progress of a single operation within a migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Position of the step in the migration body.
    pub index: usize,
    /// The operation, rendered for display.
    pub operation: String,
    /// Current status of the step.
    pub status: StepStatus,
    /// Times the adapter was asked to perform the step.
    pub attempts: u32,
    /// Error message if the step did not succeed.
    pub error: Option<String>,
}

impl StepRecord {
    /// Create a pending record for `call`.
    pub fn new(index: usize, call: &OperationCall) -> Self {
        Self {
            index,
            operation: call.to_string(),
            status: StepStatus::Pending,
            attempts: 0,
            error: None,
        }
    }

    /// Mark the step as executing.
    pub fn start(&mut self) {
        self.status = StepStatus::Executing;
    }

    /// Mark the step as completed.
    pub fn complete(&mut self, attempts: u32) {
        self.status = StepStatus::Succeeded;
        self.attempts = attempts;
    }

    /// Mark the step as rejected by a check.
    pub fn reject(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Unsafe;
        self.error = Some(error.into());
    }

    /// Mark the step as failed.
    pub fn fail(&mut self, attempts: u32, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.attempts = attempts;
        self.error = Some(error.into());
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// Result of a successful migration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Migration version.
    pub version: u64,
    /// Migration name.
    pub name: String,
    /// Direction the migration ran in.
    pub direction: Direction,
    /// How statements were grouped.
    pub mode: ExecutionMode,
    /// Times the migration body ran.
    pub attempts: u32,
    /// Per-operation records from the final attempt.
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    /// Number of steps that completed.
    pub fn steps_applied(&self) -> usize {
        self.steps.iter().filter(|s| s.is_succeeded()).count()
    }
}
