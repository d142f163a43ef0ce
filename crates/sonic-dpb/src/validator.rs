//! Dependency discovery for ports about to be deleted.
//!
//! Every table in CONFIG_DB is classified as either *modeled* (its port
//! references are described by [`PortRef`] rules) or *unmodeled* (an opaque
//! blob scanned token by token). Modeled references block the breakout
//! unless forced; unmodeled references can never be proven safe and always
//! need operator confirmation.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use sonic_config_db::{
    base_field_name, split_list, ConfigReader, ConfigRow, FieldValues, RowRef, KEY_SEPARATOR,
};

use crate::error::DpbResult;
use crate::tables::MANAGED_TABLES;

/// Separators for the unmodeled token scan. Anything outside a port-name
/// alphabet splits tokens, so `Ethernet0.10` and `Vlan10|Ethernet0` both
/// yield `Ethernet0`.
static TOKEN_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_/\-]+").expect("Invalid regex pattern"));

/// Where a modeled table refers to ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRef {
    /// The n-th `|` part of the key names a port (or a comma list of
    /// ports, or a sub-interface of a port).
    KeyPart(usize),
    /// A field holds a port or a comma list of ports (`ports@`).
    Field(String),
    /// Field names are port names (e.g., CABLE_LENGTH).
    FieldName,
}

/// Does `item` name `port` or one of its sub-interfaces?
fn names_port(item: &str, port: &str) -> bool {
    match item.strip_prefix(port) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

fn list_names_port(value: &str, port: &str) -> bool {
    split_list(value).any(|item| names_port(item, port))
}

/// `ports@` and `ports` name the same field.
fn same_field(a: &str, b: &str) -> bool {
    base_field_name(a) == base_field_name(b)
}

impl PortRef {
    fn matches(&self, row: &ConfigRow, port: &str) -> bool {
        match self {
            PortRef::KeyPart(index) => row
                .key_parts()
                .nth(*index)
                .is_some_and(|part| list_names_port(part, port)),
            PortRef::Field(name) => row
                .fields
                .iter()
                .any(|(f, v)| same_field(f, name) && list_names_port(v, port)),
            PortRef::FieldName => row.fields.iter().any(|(f, _)| f == port),
        }
    }
}

/// What removing a forced reference does to a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detach {
    /// The row no longer references the ports.
    Unchanged,
    /// The row must be removed.
    DeleteRow,
    /// The row must be rewritten with these fields.
    Rewrite(FieldValues),
    /// A key part listed surviving ports too: the row moves to `key`
    /// (without the deleted ports) and the old key is removed.
    Rekey {
        /// Key rebuilt from the surviving ports.
        key: String,
        /// Fields to write under the new key.
        fields: FieldValues,
    },
}

/// A table whose port references are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeledTable {
    /// Table name.
    pub name: String,
    /// Port reference rules.
    pub refs: Vec<PortRef>,
}

impl ModeledTable {
    /// Creates a modeled table.
    pub fn new(name: impl Into<String>, refs: Vec<PortRef>) -> Self {
        Self {
            name: name.into(),
            refs,
        }
    }

    /// True if the row references `port` through any rule.
    pub fn references_port(&self, row: &ConfigRow, port: &str) -> bool {
        self.refs.iter().any(|r| r.matches(row, port))
    }

    /// Computes how to remove every reference to `ports` from `row`.
    ///
    /// A key part naming only deleted ports removes the row; a key part
    /// listing other ports too moves the row to a key without the deleted
    /// ones. List fields lose the matching items and disappear when empty;
    /// port-named fields are dropped. A row left without fields is removed.
    pub fn detach(&self, row: &ConfigRow, ports: &[String]) -> Detach {
        let deleted = |item: &str| ports.iter().any(|p| names_port(item, p));

        let mut parts = Vec::new();
        for (index, part) in row.key_parts().enumerate() {
            if !self.refs.contains(&PortRef::KeyPart(index)) {
                parts.push(part.to_string());
                continue;
            }
            let items: Vec<&str> = split_list(part).collect();
            let kept: Vec<&str> = items.iter().copied().filter(|item| !deleted(*item)).collect();
            if kept.len() == items.len() {
                parts.push(part.to_string());
            } else if kept.is_empty() {
                return Detach::DeleteRow;
            } else {
                parts.push(kept.join(","));
            }
        }
        let key = parts.join(KEY_SEPARATOR.to_string().as_str());

        let mut fields = FieldValues::with_capacity(row.fields.len());
        let mut changed = false;
        for (field, value) in &row.fields {
            let port_named =
                self.refs.contains(&PortRef::FieldName) && ports.iter().any(|p| p == field);
            if port_named {
                changed = true;
                continue;
            }

            let list_ref = self
                .refs
                .iter()
                .any(|r| matches!(r, PortRef::Field(name) if same_field(name, field)));
            if list_ref {
                let kept: Vec<&str> = split_list(value).filter(|item| !deleted(*item)).collect();
                if kept.len() != split_list(value).count() {
                    changed = true;
                    if !kept.is_empty() {
                        fields.push((field.clone(), kept.join(",")));
                    }
                    continue;
                }
            }

            fields.push((field.clone(), value.clone()));
        }

        if changed && fields.is_empty() {
            return Detach::DeleteRow;
        }
        match (key != row.key, changed) {
            (true, _) => Detach::Rekey { key, fields },
            (false, true) => Detach::Rewrite(fields),
            (false, false) => Detach::Unchanged,
        }
    }
}

/// Classification of a table for dependency scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind<'a> {
    /// Port references are described by rules.
    Modeled(&'a ModeledTable),
    /// Opaque table, scanned by token containment.
    Unmodeled,
}

impl TableKind<'_> {
    /// True if the row references `port`.
    pub fn references_port(&self, row: &ConfigRow, port: &str) -> bool {
        match self {
            TableKind::Modeled(table) => table.references_port(row, port),
            TableKind::Unmodeled => {
                let tokens = |s: &str| -> bool {
                    TOKEN_SPLIT_RE.split(s).any(|token| token == port)
                };
                tokens(&row.key) || row.fields.iter().any(|(f, v)| tokens(f) || tokens(v))
            }
        }
    }
}

/// Registry of modeled tables.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, ModeledTable>,
}

impl TableRegistry {
    /// Creates an empty registry: every table is unmodeled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in CONFIG_DB tables.
    pub fn builtin() -> Self {
        use PortRef::*;

        let field = |name: &str| Field(name.to_string());
        [
            ModeledTable::new("VLAN_MEMBER", vec![KeyPart(1)]),
            ModeledTable::new("PORTCHANNEL_MEMBER", vec![KeyPart(1)]),
            ModeledTable::new("INTERFACE", vec![KeyPart(0)]),
            ModeledTable::new("VLAN_SUB_INTERFACE", vec![KeyPart(0)]),
            ModeledTable::new("ACL_TABLE", vec![field("ports")]),
            ModeledTable::new("MIRROR_SESSION", vec![field("src_port"), field("dst_port")]),
            ModeledTable::new("PORT_QOS_MAP", vec![KeyPart(0)]),
            ModeledTable::new("QUEUE", vec![KeyPart(0)]),
            ModeledTable::new("BUFFER_PG", vec![KeyPart(0)]),
            ModeledTable::new("BUFFER_QUEUE", vec![KeyPart(0)]),
            ModeledTable::new("BUFFER_PORT_INGRESS_PROFILE_LIST", vec![KeyPart(0)]),
            ModeledTable::new("BUFFER_PORT_EGRESS_PROFILE_LIST", vec![KeyPart(0)]),
            ModeledTable::new("CABLE_LENGTH", vec![FieldName]),
            ModeledTable::new("PFC_WD", vec![KeyPart(0)]),
            ModeledTable::new("SFLOW_SESSION", vec![KeyPart(0)]),
            ModeledTable::new("DEVICE_NEIGHBOR", vec![KeyPart(0)]),
            ModeledTable::new("PORT_STORM_CONTROL", vec![KeyPart(0)]),
        ]
        .into_iter()
        .fold(Self::new(), Self::with_table)
    }

    /// Adds or replaces a modeled table.
    pub fn with_table(mut self, table: ModeledTable) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Classifies a table.
    pub fn kind(&self, table: &str) -> TableKind<'_> {
        match self.tables.get(table) {
            Some(modeled) => TableKind::Modeled(modeled),
            None => TableKind::Unmodeled,
        }
    }

    /// Returns a modeled table by name.
    pub fn modeled(&self, table: &str) -> Option<&ModeledTable> {
        self.tables.get(table)
    }
}

/// Rows referencing ports slated for deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// References in modeled tables.
    pub modeled: BTreeSet<RowRef>,
    /// References in unmodeled tables.
    pub unmodeled: BTreeSet<RowRef>,
}

impl DependencyReport {
    /// True when nothing references the ports.
    pub fn is_clear(&self) -> bool {
        self.modeled.is_empty() && self.unmodeled.is_empty()
    }
}

/// How the sequencer must react to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Nothing references the ports.
    Clear,
    /// Modeled references exist and the run is not forced.
    Abort {
        /// Rows to report.
        blockers: Vec<RowRef>,
    },
    /// The run may continue.
    Proceed {
        /// Modeled references bypassed by force.
        forced: Vec<RowRef>,
        /// Unmodeled references the operator must accept.
        needs_confirmation: Vec<RowRef>,
    },
}

/// Applies the blocking policy to a report.
pub fn policy(report: &DependencyReport, force: bool) -> PolicyDecision {
    if report.is_clear() {
        return PolicyDecision::Clear;
    }
    if !report.modeled.is_empty() && !force {
        return PolicyDecision::Abort {
            blockers: report.modeled.iter().cloned().collect(),
        };
    }
    PolicyDecision::Proceed {
        forced: report.modeled.iter().cloned().collect(),
        needs_confirmation: report.unmodeled.iter().cloned().collect(),
    }
}

/// Scans CONFIG_DB for references to ports.
#[derive(Debug, Clone, Copy)]
pub struct DependencyValidator<'a> {
    registry: &'a TableRegistry,
}

impl<'a> DependencyValidator<'a> {
    /// Creates a validator over a registry.
    pub fn new(registry: &'a TableRegistry) -> Self {
        Self { registry }
    }

    /// Finds every row referencing one of `ports`.
    ///
    /// Takes the read capability only; the store is never modified.
    #[instrument(skip(self, store))]
    pub async fn check<R>(&self, store: &R, ports: &[String]) -> DpbResult<DependencyReport>
    where
        R: ConfigReader + ?Sized,
    {
        let mut report = DependencyReport::default();
        if ports.is_empty() {
            return Ok(report);
        }

        for table in store.tables().await? {
            if MANAGED_TABLES.contains(&table.as_str()) {
                continue;
            }

            let kind = self.registry.kind(&table);
            for row in store.rows(&table).await? {
                if !ports.iter().any(|p| kind.references_port(&row, p)) {
                    continue;
                }
                match kind {
                    TableKind::Modeled(_) => {
                        debug!("Modeled dependency {}", row.row_ref());
                        report.modeled.insert(row.row_ref());
                    }
                    TableKind::Unmodeled => {
                        warn!("Unverifiable reference in {}", row.row_ref());
                        report.unmodeled.insert(row.row_ref());
                    }
                }
            }
        }

        Ok(report)
    }
}
