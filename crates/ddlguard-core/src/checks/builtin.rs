//! Built-in safety checks.
//!
//! Each rule flags an operation that takes a long or blocking lock, or that
//! breaks application code still running against the old schema.

use super::{fail, Check, CheckResult};
use crate::adapter::AdapterKind;
use crate::config::Version;
use crate::context::MigrationContext;
use crate::operation::{OperationCall, OperationKind, Value};

/// All built-in checks, in evaluation order.
pub fn checks() -> Vec<Check> {
    vec![
        Check::new("remove_column", remove_column),
        // Servers before these versions rewrite the table to fill a default.
        Check::new("add_column_default", add_column_default)
            .for_adapter(AdapterKind::Postgresql)
            .until(Version::new(11, 0, 0)),
        Check::new("add_column_default", add_column_default)
            .for_adapter(AdapterKind::Mysql)
            .until(Version::new(8, 0, 12)),
        Check::new("add_column_default", add_column_default)
            .for_adapter(AdapterKind::Mariadb)
            .until(Version::new(10, 3, 2)),
        Check::new("add_column_json", add_column_json).for_adapter(AdapterKind::Postgresql),
        Check::new("change_column", change_column),
        Check::new("rename_column", rename_column),
        Check::new("rename_table", rename_table),
        Check::new("create_table_force", create_table_force),
        Check::new("add_index", add_index).for_adapter(AdapterKind::Postgresql),
        Check::new("add_reference_index", add_reference_index).for_adapter(AdapterKind::Postgresql),
        Check::new("add_foreign_key", add_foreign_key).for_adapter(AdapterKind::Postgresql),
        Check::new("add_check_constraint", add_check_constraint)
            .for_adapter(AdapterKind::Postgresql),
        Check::new("change_column_null", change_column_null).for_adapter(AdapterKind::Postgresql),
        Check::new("execute", execute),
    ]
}

fn table(call: &OperationCall) -> &str {
    call.table().unwrap_or("<table>")
}

fn column(call: &OperationCall) -> String {
    call.get_arg(1)
        .map(Value::to_string)
        .unwrap_or_else(|| "<column>".to_string())
}

fn is_concurrent(call: &OperationCall) -> bool {
    call.option_str("algorithm")
        .is_some_and(|a| a.eq_ignore_ascii_case("concurrently"))
}

fn validates(call: &OperationCall) -> bool {
    call.option_bool("validate") != Some(false)
}

fn remove_column(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::RemoveColumn {
        return Ok(());
    }
    fail(
        format!(
            "Removing column {} from {} breaks application code that still reads it.",
            column(call),
            table(call)
        ),
        "1. Stop reading and writing the column in application code\n\
         2. Deploy the code\n\
         3. Remove the column in a migration wrapped in safety_assured",
    )
}

fn add_column_default(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::AddColumn {
        return Ok(());
    }
    let Some(default) = call.get_option("default") else {
        return Ok(());
    };
    if default.is_null() {
        return Ok(());
    }
    fail(
        format!(
            "Adding column {} to {} with a default rewrites the entire table on this server version.",
            column(call),
            table(call)
        ),
        "Add the column without a default, then set the default with \
         change_column_default in a separate step and backfill existing rows in batches.",
    )
}

fn add_column_json(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::AddColumn || call.arg_str(2) != Some("json") {
        return Ok(());
    }
    fail(
        "There's no equality operator for the json column type, which can break \
         existing SELECT DISTINCT queries on the table.",
        format!("Use jsonb instead: add_column {}, {}, jsonb", table(call), column(call)),
    )
}

fn change_column(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::ChangeColumn {
        return Ok(());
    }
    fail(
        format!(
            "Changing the type of {}.{} rewrites the table and blocks reads and writes while it runs.",
            table(call),
            column(call)
        ),
        "1. Create a new column\n\
         2. Write to both columns\n\
         3. Backfill data from the old column to the new column\n\
         4. Move reads to the new column\n\
         5. Stop writing to the old column\n\
         6. Drop the old column",
    )
}

fn rename_column(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::RenameColumn {
        return Ok(());
    }
    fail(
        format!(
            "Renaming {}.{} breaks application code that uses the old name.",
            table(call),
            column(call)
        ),
        "1. Create a new column\n\
         2. Write to both columns\n\
         3. Backfill data from the old column to the new column\n\
         4. Move reads to the new column\n\
         5. Stop writing to the old column\n\
         6. Drop the old column",
    )
}

fn rename_table(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::RenameTable {
        return Ok(());
    }
    fail(
        format!(
            "Renaming table {} breaks application code that uses the old name.",
            table(call)
        ),
        "1. Create a new table\n\
         2. Write to both tables\n\
         3. Backfill data from the old table to the new table\n\
         4. Move reads to the new table\n\
         5. Stop writing to the old table\n\
         6. Drop the old table",
    )
}

fn create_table_force(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::CreateTable || call.option_bool("force") != Some(true) {
        return Ok(());
    }
    fail(
        format!(
            "The force option drops {} if it already exists, along with its data.",
            table(call)
        ),
        "Drop the existing table in its own migration if that is really intended, \
         then create the table without force.",
    )
}

fn add_index(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::AddIndex || is_concurrent(call) {
        return Ok(());
    }
    fail(
        format!(
            "Adding an index on {} non-concurrently blocks writes to the table.",
            table(call)
        ),
        format!(
            "Add the index with algorithm: concurrently in a non-transactional migration:\n\
             add_index {}, {}, algorithm: concurrently",
            table(call),
            column(call)
        ),
    )
}

fn add_reference_index(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::AddReference {
        return Ok(());
    }
    if call.option_bool("index") == Some(false) || is_concurrent(call) {
        return Ok(());
    }
    fail(
        format!(
            "Adding a reference on {} creates its index non-concurrently, which blocks writes.",
            table(call)
        ),
        "Add the reference with index: false, then add the index with \
         algorithm: concurrently in a non-transactional migration.",
    )
}

fn add_foreign_key(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::AddForeignKey || !validates(call) {
        return Ok(());
    }
    fail(
        format!(
            "Adding a validated foreign key on {} blocks writes on both tables while existing rows are checked.",
            table(call)
        ),
        "Add the foreign key with validate: false, then validate it in a separate migration.",
    )
}

fn add_check_constraint(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::AddCheckConstraint || !validates(call) {
        return Ok(());
    }
    fail(
        format!(
            "Adding a validated check constraint on {} blocks reads and writes while every row is checked.",
            table(call)
        ),
        "Add the check constraint with validate: false, then validate it in a separate migration.",
    )
}

fn change_column_null(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::ChangeColumnNull {
        return Ok(());
    }
    // change_column_null table, column, null
    if call.get_arg(2).and_then(Value::as_bool) != Some(false) {
        return Ok(());
    }
    fail(
        format!(
            "Setting NOT NULL on {}.{} blocks reads and writes while every row is checked.",
            table(call),
            column(call)
        ),
        "Add a check constraint IS NOT NULL with validate: false, validate it in a separate \
         migration, then set NOT NULL and drop the constraint.",
    )
}

fn execute(call: &OperationCall, _: &MigrationContext) -> CheckResult {
    if call.kind != OperationKind::Execute {
        return Ok(());
    }
    fail(
        "Raw SQL can't be checked for safety.",
        "Make sure the statement is safe, then wrap it in safety_assured.",
    )
}
