//! Store capabilities consumed by configuration tools.
//!
//! Reading and writing are split into two traits so that components which
//! must never mutate CONFIG_DB (dependency scans, dry runs) can be handed
//! the read capability only.
//!
//! The store offers no multi-row transactions. Every write is visible to
//! other CONFIG_DB subscribers as soon as it completes.

use async_trait::async_trait;

use crate::error::ConfigDbResult;
use crate::row::{ConfigRow, FieldValue, FieldValues, FieldValuesExt};

/// Read access to a table-oriented configuration store.
#[async_trait]
pub trait ConfigReader: Send + Sync {
    /// Returns the names of all tables currently holding at least one row.
    async fn tables(&self) -> ConfigDbResult<Vec<String>>;

    /// Returns all keys of a table.
    async fn keys(&self, table: &str) -> ConfigDbResult<Vec<String>>;

    /// Returns the fields of a row, or `None` if the row does not exist.
    async fn get(&self, table: &str, key: &str) -> ConfigDbResult<Option<FieldValues>>;

    /// Returns a single field of a row.
    async fn get_field(
        &self,
        table: &str,
        key: &str,
        field: &str,
    ) -> ConfigDbResult<Option<String>> {
        Ok(self
            .get(table, key)
            .await?
            .and_then(|fvs| fvs.get_field(field).map(str::to_string)))
    }

    /// Returns every row of a table.
    ///
    /// Rows removed by another writer between enumeration and read are
    /// skipped.
    async fn rows(&self, table: &str) -> ConfigDbResult<Vec<ConfigRow>> {
        let mut rows = Vec::new();
        for key in self.keys(table).await? {
            if let Some(fields) = self.get(table, &key).await? {
                rows.push(ConfigRow::new(table, key, fields));
            }
        }
        Ok(rows)
    }
}

/// Read-write access to a table-oriented configuration store.
#[async_trait]
pub trait ConfigStore: ConfigReader {
    /// Merges fields into a row, creating it if needed (HSET semantics).
    async fn set(&self, table: &str, key: &str, fvs: &[FieldValue]) -> ConfigDbResult<()>;

    /// Deletes a row. Deleting a missing row is not an error.
    async fn delete(&self, table: &str, key: &str) -> ConfigDbResult<()>;

    /// Sets a single field of a row.
    async fn set_field(
        &self,
        table: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> ConfigDbResult<()> {
        self.set(table, key, &[(field.to_string(), value.to_string())])
            .await
    }

    /// Replaces a row with exactly the given fields.
    ///
    /// Implemented as delete followed by set; observers may see the row
    /// briefly absent.
    async fn replace(&self, table: &str, key: &str, fvs: &[FieldValue]) -> ConfigDbResult<()> {
        self.delete(table, key).await?;
        self.set(table, key, fvs).await
    }
}
