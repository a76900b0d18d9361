//! Typed schema operations.
//!
//! Every DDL call a migration makes is described by an [`OperationCall`]: the
//! operation kind, its positional arguments, and its keyword options. Checks
//! inspect calls; the adapter turns them into SQL.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema operations a migration can issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    CreateTable,
    DropTable,
    RenameTable,
    AddColumn,
    RemoveColumn,
    RenameColumn,
    ChangeColumn,
    ChangeColumnNull,
    ChangeColumnDefault,
    AddIndex,
    RemoveIndex,
    AddReference,
    AddForeignKey,
    AddCheckConstraint,
    /// Raw SQL.
    Execute,
    /// Any operation the adapter supports that is not listed above.
    Custom(String),
}

impl OperationKind {
    /// The snake_case operation name.
    pub fn name(&self) -> &str {
        match self {
            OperationKind::CreateTable => "create_table",
            OperationKind::DropTable => "drop_table",
            OperationKind::RenameTable => "rename_table",
            OperationKind::AddColumn => "add_column",
            OperationKind::RemoveColumn => "remove_column",
            OperationKind::RenameColumn => "rename_column",
            OperationKind::ChangeColumn => "change_column",
            OperationKind::ChangeColumnNull => "change_column_null",
            OperationKind::ChangeColumnDefault => "change_column_default",
            OperationKind::AddIndex => "add_index",
            OperationKind::RemoveIndex => "remove_index",
            OperationKind::AddReference => "add_reference",
            OperationKind::AddForeignKey => "add_foreign_key",
            OperationKind::AddCheckConstraint => "add_check_constraint",
            OperationKind::Execute => "execute",
            OperationKind::Custom(name) => name,
        }
    }
}

impl From<&str> for OperationKind {
    fn from(name: &str) -> Self {
        match name {
            "create_table" => OperationKind::CreateTable,
            "drop_table" => OperationKind::DropTable,
            "rename_table" => OperationKind::RenameTable,
            "add_column" => OperationKind::AddColumn,
            "remove_column" => OperationKind::RemoveColumn,
            "rename_column" => OperationKind::RenameColumn,
            "change_column" => OperationKind::ChangeColumn,
            "change_column_null" => OperationKind::ChangeColumnNull,
            "change_column_default" => OperationKind::ChangeColumnDefault,
            "add_index" => OperationKind::AddIndex,
            "remove_index" => OperationKind::RemoveIndex,
            "add_reference" => OperationKind::AddReference,
            "add_foreign_key" => OperationKind::AddForeignKey,
            "add_check_constraint" => OperationKind::AddCheckConstraint,
            "execute" => OperationKind::Execute,
            other => OperationKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for OperationKind {
    fn from(name: String) -> Self {
        OperationKind::from(name.as_str())
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An argument or option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

/// A single schema operation issued by a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationCall {
    /// The operation kind.
    #[serde(rename = "op")]
    pub kind: OperationKind,
    /// Positional arguments, in call order.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

impl OperationCall {
    /// Create a call with no arguments.
    pub fn new(kind: impl Into<OperationKind>) -> Self {
        Self {
            kind: kind.into(),
            args: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword option.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// The operation name.
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Positional argument at `index`.
    pub fn get_arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Positional argument at `index` as a string.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Value::as_str)
    }

    /// Keyword option by name.
    pub fn get_option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Keyword option as a string.
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(Value::as_str)
    }

    /// Keyword option as a boolean.
    pub fn option_bool(&self, name: &str) -> Option<bool> {
        self.options.get(name).and_then(Value::as_bool)
    }

    /// The table this operation targets (first positional argument).
    pub fn table(&self) -> Option<&str> {
        self.arg_str(0)
    }
}

impl fmt::Display for OperationCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        let mut first = true;
        for arg in &self.args {
            write!(f, "{} {}", if first { "" } else { "," }, arg)?;
            first = false;
        }
        for (name, value) in &self.options {
            write!(f, "{} {}: {}", if first { "" } else { "," }, name, value)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        assert_eq!(OperationKind::from("add_column"), OperationKind::AddColumn);
        assert_eq!(OperationKind::AddColumn.name(), "add_column");
        assert_eq!(
            OperationKind::from("enable_extension"),
            OperationKind::Custom("enable_extension".into())
        );
    }

    #[test]
    fn test_call_accessors() {
        let call = OperationCall::new(OperationKind::AddColumn)
            .arg("users")
            .arg("forbidden")
            .arg("string")
            .option("default", "x");

        assert_eq!(call.table(), Some("users"));
        assert_eq!(call.arg_str(1), Some("forbidden"));
        assert_eq!(call.get_arg(1).map(|v| v.to_string()), Some("forbidden".into()));
        assert_eq!(call.option_str("default"), Some("x"));
        assert_eq!(call.option_bool("default"), None);
        assert_eq!(call.to_string(), "add_column users, forbidden, string, default: x");
    }

    #[test]
    fn test_call_from_json() {
        let call: OperationCall = serde_json::from_str(
            r#"{"op": "add_index", "args": ["users", ["name", "city"]], "options": {"unique": true}}"#,
        )
        .unwrap();

        assert_eq!(call.kind, OperationKind::AddIndex);
        assert_eq!(
            call.args[1],
            Value::List(vec![Value::from("name"), Value::from("city")])
        );
        assert_eq!(call.option_bool("unique"), Some(true));
    }
}
