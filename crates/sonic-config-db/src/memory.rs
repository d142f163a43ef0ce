//! In-memory CONFIG_DB store.
//!
//! Used by tests and dry runs. Every mutation is appended to a journal so
//! callers can assert on write ordering, and individual rows can be marked
//! as failing to exercise error paths.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ConfigDbError, ConfigDbResult};
use crate::row::{ConfigRow, FieldValue, FieldValues, FieldValuesExt, RowRef};
use crate::store::{ConfigReader, ConfigStore};

/// A mutation applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Fields merged into a row.
    Set {
        /// The row written.
        row: RowRef,
        /// The fields written.
        fields: FieldValues,
    },
    /// Row removed.
    Delete {
        /// The row removed.
        row: RowRef,
    },
}

impl StoreOp {
    /// Returns the row touched by this operation.
    pub fn row(&self) -> &RowRef {
        match self {
            StoreOp::Set { row, .. } | StoreOp::Delete { row } => row,
        }
    }
}

type Tables = BTreeMap<String, BTreeMap<String, FieldValues>>;

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    journal: Vec<StoreOp>,
    failing: HashSet<RowRef>,
}

/// In-memory implementation of [`ConfigStore`].
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: RwLock<Inner>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with rows. Seeding is not journaled.
    pub fn from_rows(rows: impl IntoIterator<Item = ConfigRow>) -> Self {
        let mut store = Self::new();
        for row in rows {
            store = store.with_row(row.table, row.key, row.fields);
        }
        store
    }

    /// Adds a row during setup. Seeding is not journaled.
    pub fn with_row(
        mut self,
        table: impl Into<String>,
        key: impl Into<String>,
        fields: FieldValues,
    ) -> Self {
        self.inner
            .get_mut()
            .tables
            .entry(table.into())
            .or_default()
            .insert(key.into(), fields);
        self
    }

    /// Makes every write to the given row fail.
    pub fn with_failing_row(mut self, table: impl Into<String>, key: impl Into<String>) -> Self {
        self.inner.get_mut().failing.insert(RowRef::new(table, key));
        self
    }

    /// Returns the mutations applied so far, in order.
    pub async fn journal(&self) -> Vec<StoreOp> {
        self.inner.read().await.journal.clone()
    }

    /// Returns a copy of the full store contents.
    pub async fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, FieldValues>> {
        self.inner.read().await.tables.clone()
    }

    fn check_writable(inner: &Inner, op: &str, table: &str, key: &str) -> ConfigDbResult<()> {
        if inner.failing.contains(&RowRef::new(table, key)) {
            return Err(ConfigDbError::operation(
                op,
                table,
                key,
                "injected write failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigReader for MemoryConfigStore {
    async fn tables(&self) -> ConfigDbResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tables
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn keys(&self, table: &str) -> ConfigDbResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tables
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, table: &str, key: &str) -> ConfigDbResult<Option<FieldValues>> {
        let inner = self.inner.read().await;
        Ok(inner.tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn set(&self, table: &str, key: &str, fvs: &[FieldValue]) -> ConfigDbResult<()> {
        let mut inner = self.inner.write().await;
        Self::check_writable(&inner, "hset", table, key)?;

        let row = inner
            .tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();
        for (field, value) in fvs {
            row.set_field(field, value);
        }

        debug!("SET {}|{} {:?}", table, key, fvs);
        inner.journal.push(StoreOp::Set {
            row: RowRef::new(table, key),
            fields: fvs.to_vec(),
        });
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> ConfigDbResult<()> {
        let mut inner = self.inner.write().await;
        Self::check_writable(&inner, "del", table, key)?;

        let now_empty = match inner.tables.get_mut(table) {
            Some(rows) => {
                rows.remove(key);
                rows.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.tables.remove(table);
        }

        debug!("DEL {}|{}", table, key);
        inner.journal.push(StoreOp::Delete {
            row: RowRef::new(table, key),
        });
        Ok(())
    }
}
