//! Row types for CONFIG_DB tables.
//!
//! CONFIG_DB stores one Redis hash per row under `TABLE|key`, where the key
//! itself may be composite (`Vlan100|Ethernet0`). List-valued fields are
//! comma separated and, by convention, their field name carries a trailing
//! `@` (`ports@`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the table name and key parts in CONFIG_DB.
pub const KEY_SEPARATOR: char = '|';

/// Suffix marking a list-valued field.
pub const LIST_FIELD_SUFFIX: char = '@';

/// Placeholder field written for rows that carry no fields.
pub const NULL_FIELD: &str = "NULL";

/// Redis database number of CONFIG_DB.
pub const CONFIG_DB_ID: u32 = 4;

/// Key-value tuple representing a field and its value.
pub type FieldValue = (String, String);

/// Collection of field-value pairs for a table entry.
pub type FieldValues = Vec<FieldValue>;

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Sets a field, replacing an existing value.
    fn set_field(&mut self, field: &str, value: &str);
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    fn set_field(&mut self, field: &str, value: &str) {
        match self.iter_mut().find(|(f, _)| f == field) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.push((field.to_string(), value.to_string())),
        }
    }
}

/// Builds a FieldValues collection from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}

/// Strips the list marker from a field name (`ports@` -> `ports`).
pub fn base_field_name(field: &str) -> &str {
    field.strip_suffix(LIST_FIELD_SUFFIX).unwrap_or(field)
}

/// Splits a comma-separated list value, dropping empty items.
pub fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Splits a composite key into its parts.
pub fn key_parts(key: &str) -> impl Iterator<Item = &str> {
    key.split(KEY_SEPARATOR)
}

/// Address of a row: `(table, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowRef {
    /// Table name.
    pub table: String,
    /// Row key (possibly composite).
    pub key: String,
}

impl RowRef {
    /// Creates a row reference.
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.table, KEY_SEPARATOR, self.key)
    }
}

/// A row living in CONFIG_DB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRow {
    /// Table name.
    pub table: String,
    /// Row key (possibly composite).
    pub key: String,
    /// Field-value pairs.
    pub fields: FieldValues,
}

impl ConfigRow {
    /// Creates a row.
    pub fn new(table: impl Into<String>, key: impl Into<String>, fields: FieldValues) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields,
        }
    }

    /// Returns the `(table, key)` address of this row.
    pub fn row_ref(&self) -> RowRef {
        RowRef::new(self.table.clone(), self.key.clone())
    }

    /// Returns the parts of the row key.
    pub fn key_parts(&self) -> impl Iterator<Item = &str> {
        key_parts(&self.key)
    }
}
