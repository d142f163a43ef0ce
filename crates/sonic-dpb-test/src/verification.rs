//! Verification helpers for testing breakouts
//!
//! Provides assertion helpers over the final store contents and over the
//! ordered mutation journal.

use std::collections::BTreeSet;

use sonic_config_db::{ConfigDbError, ConfigReader, FieldValuesExt, MemoryConfigStore, StoreOp};
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Store error: {0}")]
    Store(#[from] ConfigDbError),

    #[error("Expected row '{key}' not found")]
    RowNotFound { key: String },

    #[error("Row '{key}' should not exist")]
    UnexpectedRow { key: String },

    #[error("Expected field '{field}' not found in row '{key}'")]
    FieldNotFound { key: String, field: String },

    #[error("Value mismatch for {key}:{field}: expected '{expected}', got '{actual}'")]
    ValueMismatch {
        key: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Key set of {table} mismatch: expected {expected:?}, got {actual:?}")]
    KeySetMismatch {
        table: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Ordering violated: {0}")]
    Ordering(String),
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Store contents verification helper
pub struct StoreVerifier<'a> {
    store: &'a MemoryConfigStore,
}

impl<'a> StoreVerifier<'a> {
    /// Create a new store verifier
    pub fn new(store: &'a MemoryConfigStore) -> Self {
        Self { store }
    }

    /// Verify that a row exists
    pub async fn assert_row_exists(&self, table: &str, key: &str) -> VerifyResult<()> {
        match self.store.get(table, key).await? {
            Some(_) => Ok(()),
            None => Err(VerificationError::RowNotFound {
                key: format!("{}|{}", table, key),
            }),
        }
    }

    /// Verify that a row does not exist
    pub async fn assert_row_absent(&self, table: &str, key: &str) -> VerifyResult<()> {
        match self.store.get(table, key).await? {
            Some(_) => Err(VerificationError::UnexpectedRow {
                key: format!("{}|{}", table, key),
            }),
            None => Ok(()),
        }
    }

    /// Verify that a field has a specific value
    pub async fn assert_field_value(
        &self,
        table: &str,
        key: &str,
        field: &str,
        expected: &str,
    ) -> VerifyResult<()> {
        let row_key = format!("{}|{}", table, key);
        let fields = self
            .store
            .get(table, key)
            .await?
            .ok_or_else(|| VerificationError::RowNotFound {
                key: row_key.clone(),
            })?;

        match fields.get_field(field) {
            None => Err(VerificationError::FieldNotFound {
                key: row_key,
                field: field.to_string(),
            }),
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(VerificationError::ValueMismatch {
                key: row_key,
                field: field.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
        }
    }

    /// Verify the exact key set of a table
    pub async fn assert_keys(&self, table: &str, expected: &[&str]) -> VerifyResult<()> {
        let actual: BTreeSet<String> = self.store.keys(table).await?.into_iter().collect();
        let wanted: BTreeSet<String> = expected.iter().map(|k| k.to_string()).collect();
        if actual != wanted {
            return Err(VerificationError::KeySetMismatch {
                table: table.to_string(),
                expected: wanted.into_iter().collect(),
                actual: actual.into_iter().collect(),
            });
        }
        Ok(())
    }
}

/// Mutation journal verifier
pub struct JournalVerifier {
    ops: Vec<StoreOp>,
}

impl JournalVerifier {
    /// Create a new journal verifier
    pub fn new(ops: Vec<StoreOp>) -> Self {
        Self { ops }
    }

    /// Capture the journal of a store
    pub async fn of(store: &MemoryConfigStore) -> Self {
        Self::new(store.journal().await)
    }

    fn position(&self, pred: impl Fn(&StoreOp) -> bool) -> Option<usize> {
        self.ops.iter().position(pred)
    }

    fn is_port_delete(op: &StoreOp, port: &str) -> bool {
        matches!(op, StoreOp::Delete { row } if row.table == "PORT" && row.key == port)
    }

    fn sets_admin(op: &StoreOp, port: &str, status: &str) -> bool {
        matches!(op, StoreOp::Set { row, fields }
            if row.table == "PORT" && row.key == port && fields.get_field("admin_status") == Some(status))
    }

    /// Verify that nothing was written
    pub fn assert_no_mutations(&self) -> VerifyResult<()> {
        if self.ops.is_empty() {
            Ok(())
        } else {
            Err(VerificationError::Ordering(format!(
                "expected no mutations, got {:?}",
                self.ops
            )))
        }
    }

    /// Verify that no PORT row was deleted
    pub fn assert_no_port_deleted(&self) -> VerifyResult<()> {
        match self
            .ops
            .iter()
            .find(|op| matches!(op, StoreOp::Delete { row } if row.table == "PORT"))
        {
            Some(op) => Err(VerificationError::Ordering(format!(
                "unexpected deletion of {}",
                op.row()
            ))),
            None => Ok(()),
        }
    }

    /// Verify that every deleted port was set administratively down before
    /// the first deletion of the run
    pub fn assert_quiesced_before_delete(&self, ports: &[&str]) -> VerifyResult<()> {
        let first_delete = self
            .position(|op| matches!(op, StoreOp::Delete { .. }))
            .unwrap_or(self.ops.len());

        for port in ports {
            let down = self
                .position(|op| Self::sets_admin(op, port, "down"))
                .ok_or_else(|| {
                    VerificationError::Ordering(format!("{} was never set admin down", port))
                })?;
            if down > first_delete {
                return Err(VerificationError::Ordering(format!(
                    "{} set admin down after deletions started",
                    port
                )));
            }
            if let Some(delete) = self.position(|op| Self::is_port_delete(op, port)) {
                if delete < down {
                    return Err(VerificationError::Ordering(format!(
                        "{} deleted before it was set admin down",
                        port
                    )));
                }
            }
        }
        Ok(())
    }

    /// Verify that no new port is raised before every new port row was
    /// written
    pub fn assert_written_before_up(&self, ports: &[&str]) -> VerifyResult<()> {
        let last_write = ports
            .iter()
            .filter_map(|port| {
                self.ops.iter().rposition(|op| {
                    matches!(op, StoreOp::Set { row, .. } if row.table == "PORT" && row.key == *port)
                        && !Self::sets_admin(op, port, "up")
                })
            })
            .max();

        for port in ports {
            if let Some(up) = self.position(|op| Self::sets_admin(op, port, "up")) {
                if last_write.is_some_and(|last| up < last) {
                    return Err(VerificationError::Ordering(format!(
                        "{} raised before all new ports were written",
                        port
                    )));
                }
            }
        }
        Ok(())
    }

    /// Verify that the last mutation touched the given row
    pub fn assert_last_write(&self, table: &str, key: &str) -> VerifyResult<()> {
        match self.ops.last() {
            Some(op) if op.row().table == table && op.row().key == key => Ok(()),
            other => Err(VerificationError::Ordering(format!(
                "expected last write to {}|{}, got {:?}",
                table, key, other
            ))),
        }
    }

    /// Get all captured operations
    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }
}
