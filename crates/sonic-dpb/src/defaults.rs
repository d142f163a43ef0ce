//! Default per-port configuration for newly created ports.
//!
//! With `--load-defaults`, every port created by a breakout is handed to a
//! [`PortDefaults`] provider and the rows it returns are written right after
//! the port's base row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sonic_config_db::{ConfigRow, FieldValues};

use crate::descriptor::ChildPortSpec;

/// Supplies default rows for a new port.
pub trait PortDefaults: Send + Sync {
    /// Returns the rows to write for `port`.
    fn default_rows(&self, port: &ChildPortSpec) -> Vec<ConfigRow>;
}

/// A row template. `{port}`, `{alias}`, `{speed}`, `{lanes}` and `{index}`
/// are substituted in the key and in field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowTemplate {
    /// Target table.
    pub table: String,
    /// Key template (e.g., "{port}|3-4").
    pub key: String,
    /// Field templates.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl RowTemplate {
    fn expand(&self, port: &ChildPortSpec) -> ConfigRow {
        let subst = |s: &str| {
            s.replace("{port}", &port.name)
                .replace("{alias}", &port.alias)
                .replace("{speed}", &port.speed.to_string())
                .replace("{lanes}", &port.lanes_field())
                .replace("{index}", &port.index.to_string())
        };

        let fields: FieldValues = self
            .fields
            .iter()
            .map(|(f, v)| (f.clone(), subst(v)))
            .collect();
        ConfigRow::new(&self.table, subst(&self.key), fields)
    }
}

/// Provider expanding a fixed list of row templates.
#[derive(Debug, Clone, Default)]
pub struct TemplatePortDefaults {
    templates: Vec<RowTemplate>,
}

impl TemplatePortDefaults {
    /// Creates a provider from templates.
    pub fn new(templates: Vec<RowTemplate>) -> Self {
        Self { templates }
    }

    /// True when no template is configured.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl PortDefaults for TemplatePortDefaults {
    fn default_rows(&self, port: &ChildPortSpec) -> Vec<ConfigRow> {
        self.templates.iter().map(|t| t.expand(port)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_config_db::field_values;

    #[test]
    fn test_template_expansion() {
        let provider = TemplatePortDefaults::new(vec![
            RowTemplate {
                table: "BUFFER_PG".to_string(),
                key: "{port}|3-4".to_string(),
                fields: BTreeMap::from([(
                    "profile".to_string(),
                    "pg_lossless_{speed}_5m_profile".to_string(),
                )]),
            },
            RowTemplate {
                table: "PORT_QOS_MAP".to_string(),
                key: "{port}".to_string(),
                fields: BTreeMap::from([("pfc_enable".to_string(), "3,4".to_string())]),
            },
        ]);
        let port = ChildPortSpec::new("Ethernet2", vec![67], 25000).with_alias("Eth1/3");

        let rows = provider.default_rows(&port);
        assert_eq!(
            rows,
            vec![
                ConfigRow::new(
                    "BUFFER_PG",
                    "Ethernet2|3-4",
                    field_values! { "profile" => "pg_lossless_25000_5m_profile" }
                ),
                ConfigRow::new("PORT_QOS_MAP", "Ethernet2", field_values! { "pfc_enable" => "3,4" }),
            ]
        );
    }

    #[test]
    fn test_empty_provider() {
        let provider = TemplatePortDefaults::default();
        assert!(provider.is_empty());
        assert!(provider
            .default_rows(&ChildPortSpec::new("Ethernet0", vec![0], 100000))
            .is_empty());
    }
}
