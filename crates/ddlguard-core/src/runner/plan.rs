//! Migrations described as JSON.
//!
//! ```json
//! {
//!   "version": 20240101000000,
//!   "name": "add_nickname_to_users",
//!   "up": [
//!     { "op": "add_column", "args": ["users", "nickname", "string"] },
//!     { "safety_assured": [{ "op": "remove_column", "args": ["users", "legacy"] }] }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MigrationError;
use crate::operation::OperationCall;

use super::{Migration, Schema};

/// Operations run with checks disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssuredSteps {
    pub safety_assured: Vec<OperationCall>,
}

/// One entry in a plan body.
///
/// Entries mixing an operation with a `safety_assured` block match neither
/// variant and fail to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanStep {
    Assured(AssuredSteps),
    /// A single checked operation.
    Call(OperationCall),
}

/// A migration loaded from a plan file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub version: u64,
    pub name: String,
    /// Run the body in a transaction where the adapter allows it.
    #[serde(default = "default_transactional")]
    pub transactional: bool,
    #[serde(default)]
    pub up: Vec<PlanStep>,
    /// Steps to reverse the migration. Absent means irreversible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<Vec<PlanStep>>,
}

fn default_transactional() -> bool {
    true
}

impl MigrationPlan {
    /// Parse a plan from JSON.
    pub fn from_json(json: &str) -> Result<Self, MigrationError> {
        let plan: MigrationPlan =
            serde_json::from_str(json).map_err(|e| MigrationError::Plan(e.to_string()))?;
        if plan.name.trim().is_empty() {
            return Err(MigrationError::Plan("migration name is empty".to_string()));
        }
        Ok(plan)
    }

    /// Read and parse a plan file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize the plan as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, MigrationError> {
        serde_json::to_string_pretty(self).map_err(|e| MigrationError::Plan(e.to_string()))
    }
}

fn run_steps(steps: &[PlanStep], schema: &mut Schema<'_>) -> Result<(), MigrationError> {
    for step in steps {
        match step {
            PlanStep::Call(call) => schema.perform(call.clone())?,
            PlanStep::Assured(assured) => schema.safety_assured(|s| {
                assured
                    .safety_assured
                    .iter()
                    .try_for_each(|call| s.perform(call.clone()))
            })?,
        }
    }
    Ok(())
}

impl Migration for MigrationPlan {
    fn version(&self) -> u64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn transactional(&self) -> bool {
        self.transactional
    }

    fn up(&self, schema: &mut Schema<'_>) -> Result<(), MigrationError> {
        run_steps(&self.up, schema)
    }

    fn down(&self, schema: &mut Schema<'_>) -> Result<(), MigrationError> {
        match &self.down {
            Some(steps) => run_steps(steps, schema),
            None => Err(MigrationError::Irreversible(self.name.clone())),
        }
    }
}
