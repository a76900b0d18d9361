//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ddlguard_core::{AdapterKind, Direction, GuardConfig, Version, DEFAULT_LOCK_TIMEOUT_DELAY};

use crate::formatter::OutputFormat;

/// ddlguard - catch unsafe schema changes before they reach production
#[derive(Parser, Debug)]
#[command(name = "ddlguard")]
#[command(version, about = "Check migrations for unsafe schema changes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dry-run a migration plan against the safety checks.
    Check(CheckArgs),

    /// List the built-in checks.
    Checks {
        /// Output format
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,
    },
}

/// Migration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Up => Direction::Up,
            DirectionArg::Down => Direction::Down,
        }
    }
}

/// Arguments for `ddlguard check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the migration plan (JSON).
    pub plan: PathBuf,

    /// Database adapter (postgresql, mysql, mariadb).
    #[arg(short, long, default_value = "postgresql")]
    pub adapter: AdapterKind,

    /// Server version the migration targets, e.g. 10.3.2.
    #[arg(long)]
    pub target_version: Option<Version>,

    /// Session lock timeout in milliseconds.
    #[arg(long)]
    pub lock_timeout_ms: Option<u64>,

    /// Session statement timeout in milliseconds.
    #[arg(long)]
    pub statement_timeout_ms: Option<u64>,

    /// Retries after a lock timeout.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Delay between lock timeout retries in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT_DELAY.as_millis() as u64)]
    pub delay_ms: u64,

    /// Skip checks for migrations up to and including this version.
    #[arg(long)]
    pub start_after: Option<u64>,

    /// Also check the down direction.
    #[arg(long)]
    pub check_down: bool,

    /// Direction to run the plan in.
    #[arg(long, default_value = "up", value_enum)]
    pub direction: DirectionArg,

    /// Treat the connection as not supporting transactional DDL.
    #[arg(long)]
    pub no_transactional_ddl: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

/// Everything `check` needs, resolved from the arguments.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub plan: PathBuf,
    pub adapter: AdapterKind,
    pub transactional_ddl: bool,
    pub direction: Direction,
    pub format: OutputFormat,
    pub config: GuardConfig,
}

impl CheckArgs {
    /// Convert command-line arguments to check options.
    pub fn into_options(self) -> CheckOptions {
        let mut config = GuardConfig::new()
            .with_lock_timeout_retries(self.retries)
            .with_lock_timeout_delay(Duration::from_millis(self.delay_ms))
            .with_check_down(self.check_down);

        if let Some(ms) = self.lock_timeout_ms {
            config = config.with_lock_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.statement_timeout_ms {
            config = config.with_statement_timeout(Duration::from_millis(ms));
        }
        if let Some(version) = self.target_version {
            config = config.with_target_version(version);
        }
        if let Some(version) = self.start_after {
            config = config.with_start_after(version);
        }

        let transactional_ddl =
            self.adapter == AdapterKind::Postgresql && !self.no_transactional_ddl;

        CheckOptions {
            plan: self.plan,
            adapter: self.adapter,
            transactional_ddl,
            direction: self.direction.into(),
            format: self.format,
            config,
        }
    }
}
