//! Output formatters for check results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Serialize;

use ddlguard_core::{AdapterKind, Check, CheckRegistry, Direction, StepRecord};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Result of checking one migration plan.
#[derive(Debug, Serialize)]
pub struct CheckSummary<'a> {
    pub migration: &'a str,
    pub version: u64,
    pub adapter: AdapterKind,
    pub direction: Direction,
    pub passed: bool,
    /// Times the body ran; absent when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    pub steps: &'a [StepRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format the result of a plan check.
    fn format_summary(&self, summary: &CheckSummary<'_>) -> String;

    /// Format the registered checks.
    fn format_checks(&self, registry: &CheckRegistry) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn adapters_label(check: &Check) -> String {
    if check.adapters().is_empty() {
        "all".to_string()
    } else {
        check
            .adapters()
            .iter()
            .map(AdapterKind::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn window_label(check: &Check) -> String {
    let window = check.window();
    match (window.since, window.until) {
        (None, None) => "-".to_string(),
        (Some(since), None) => format!(">= {}", since),
        (None, Some(until)) => format!("< {}", until),
        (Some(since), Some(until)) => format!(">= {}, < {}", since, until),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_summary(&self, summary: &CheckSummary<'_>) -> String {
        let mut output = String::new();

        if !summary.steps.is_empty() {
            let mut table = Table::new();
            table.set_header(vec!["#", "Operation", "Status", "Attempts"]);
            for step in summary.steps {
                table.add_row(vec![
                    Cell::new(step.index + 1),
                    Cell::new(&step.operation),
                    Cell::new(step.status),
                    Cell::new(step.attempts),
                ]);
            }
            output.push_str(&table.to_string());
            output.push_str("\n\n");
        }

        match &summary.error {
            None => output.push_str(&format!(
                "OK: {} ({}, {}) is safe",
                summary.migration, summary.adapter, summary.direction
            )),
            Some(error) => output.push_str(&format!(
                "FAILED: {} ({}, {})\n\n{}",
                summary.migration, summary.adapter, summary.direction, error
            )),
        }

        output
    }

    fn format_checks(&self, registry: &CheckRegistry) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Check", "Adapters", "Target versions"]);

        for check in registry.iter() {
            table.add_row(vec![
                check.name().to_string(),
                adapters_label(check),
                window_label(check),
            ]);
        }

        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

#[derive(Serialize)]
struct CheckInfo {
    name: String,
    adapters: Vec<AdapterKind>,
    since: Option<String>,
    until: Option<String>,
}

impl Formatter for JsonFormatter {
    fn format_summary(&self, summary: &CheckSummary<'_>) -> String {
        serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_checks(&self, registry: &CheckRegistry) -> String {
        let checks: Vec<CheckInfo> = registry
            .iter()
            .map(|check| CheckInfo {
                name: check.name().to_string(),
                adapters: check.adapters().to_vec(),
                since: check.window().since.map(|v| v.to_string()),
                until: check.window().until.map(|v| v.to_string()),
            })
            .collect();

        serde_json::to_string_pretty(&checks).unwrap_or_else(|_| "[]".to_string())
    }
}
