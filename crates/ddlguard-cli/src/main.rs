//! ddlguard command-line checker.
//!
//! Dry-runs a JSON migration plan against the safety checks on a recording
//! connection and reports what would happen.

mod args;
mod formatter;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::{CheckOptions, Cli, Command};
use ddlguard_core::{CheckRegistry, MigrationError, MigrationPlan, MigrationRunner, RecordingConnection};
use formatter::CheckSummary;

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ddlguard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Check(args) => match check(args.into_options()) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Command::Checks { format } => {
            let registry = CheckRegistry::with_builtin_checks();
            println!("{}", formatter::create_formatter(format).format_checks(&registry));
            ExitCode::SUCCESS
        }
    }
}

/// Run the plan and print the result. Returns whether it passed.
fn check(options: CheckOptions) -> Result<bool, MigrationError> {
    let plan = MigrationPlan::from_path(&options.plan)?;

    tracing::info!(
        plan = %options.plan.display(),
        adapter = %options.adapter,
        transactional_ddl = options.transactional_ddl,
        "checking migration plan"
    );

    let registry = CheckRegistry::with_builtin_checks();
    let mut conn =
        RecordingConnection::new(options.adapter).with_transactional_ddl(options.transactional_ddl);
    let mut runner = MigrationRunner::new(&options.config, &registry, &mut conn);

    let result = runner.run(&plan, options.direction);
    let summary = CheckSummary {
        migration: &plan.name,
        version: plan.version,
        adapter: options.adapter,
        direction: options.direction,
        passed: result.is_ok(),
        attempts: result.as_ref().ok().map(|report| report.attempts),
        steps: runner.steps(),
        error: result.as_ref().err().map(|e| e.to_string()),
    };

    println!("{}", formatter::create_formatter(options.format).format_summary(&summary));
    Ok(summary.passed)
}
