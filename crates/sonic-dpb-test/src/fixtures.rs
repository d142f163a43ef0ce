//! Test fixtures for breakout scenarios
//!
//! Provides CONFIG_DB rows and breakout descriptors shared by the dpb tests.

use serde_json::{json, Value};
use sonic_config_db::{ConfigRow, FieldValues, MemoryConfigStore};

/// Builder for a CONFIG_DB row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFixture {
    /// Table name (e.g., "PORT", "VLAN_MEMBER")
    pub table: String,
    /// Key within the table
    pub key: String,
    /// Field-value pairs, in insertion order
    pub fields: FieldValues,
}

impl RowFixture {
    /// Create a row
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields: FieldValues::new(),
        }
    }

    /// Add a field
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    /// Add multiple fields
    pub fn with_fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in fields {
            self.fields.push((k.into(), v.into()));
        }
        self
    }

    /// Get the Redis key for CONFIG_DB
    pub fn config_db_key(&self) -> String {
        format!("{}|{}", self.table, self.key)
    }

    /// Convert into a store row
    pub fn into_row(self) -> ConfigRow {
        ConfigRow::new(self.table, self.key, self.fields)
    }
}

/// Port rows
pub mod port_fixtures {
    use super::*;

    /// Administratively up port
    pub fn port_up(port_name: &str, lanes: &str, speed: u32) -> RowFixture {
        RowFixture::new("PORT", port_name)
            .with_field("lanes", lanes)
            .with_field("speed", speed.to_string())
            .with_field("mtu", "9100")
            .with_field("admin_status", "up")
    }

    /// Administratively down port
    pub fn port_down(port_name: &str, lanes: &str, speed: u32) -> RowFixture {
        RowFixture::new("PORT", port_name)
            .with_field("lanes", lanes)
            .with_field("speed", speed.to_string())
            .with_field("mtu", "9100")
            .with_field("admin_status", "down")
    }

    /// Recorded breakout mode of a parent port
    pub fn breakout_cfg(port_name: &str, mode: &str) -> RowFixture {
        RowFixture::new("BREAKOUT_CFG", port_name).with_field("brkout_mode", mode)
    }
}

/// Rows of tables that reference ports
pub mod dependency_fixtures {
    use super::*;

    /// VLAN
    pub fn vlan(vlan_id: u16) -> RowFixture {
        RowFixture::new("VLAN", format!("Vlan{}", vlan_id)).with_field("vlanid", vlan_id.to_string())
    }

    /// VLAN member
    pub fn vlan_member(vlan_id: u16, port: &str, tagging_mode: &str) -> RowFixture {
        RowFixture::new("VLAN_MEMBER", format!("Vlan{}|{}", vlan_id, port))
            .with_field("tagging_mode", tagging_mode)
    }

    /// Router interface with an IP prefix
    pub fn interface_ip(port: &str, prefix: &str) -> RowFixture {
        RowFixture::new("INTERFACE", format!("{}|{}", port, prefix))
    }

    /// ACL table bound to ports
    pub fn acl_table(name: &str, ports: &[&str]) -> RowFixture {
        RowFixture::new("ACL_TABLE", name)
            .with_field("type", "L3")
            .with_field("stage", "ingress")
            .with_field("ports@", ports.join(","))
    }

    /// Row of a table unknown to the dependency registry
    pub fn unmodeled(table: &str, key: &str, field: &str, value: &str) -> RowFixture {
        RowFixture::new(table, key).with_field(field, value)
    }
}

fn child(name: &str, lanes: &[u32], speed: u32, alias: &str, index: u32) -> Value {
    let lanes: Vec<String> = lanes.iter().map(u32::to_string).collect();
    json!({
        "name": name,
        "lanes": lanes.join(","),
        "speed": speed,
        "alias": alias,
        "index": index,
    })
}

/// Four-lane port group named `EthernetN` using lanes `first_lane..first_lane+4`.
///
/// Modes: `1x100G[40G]`, `4x25G[10G]`, `2x50G` and `1x50G(2)+2x25G(2)`.
pub fn quad_lane_group(port_number: u32, first_lane: u32, front_panel: u32) -> Value {
    let name = |offset: u32| format!("Ethernet{}", port_number + offset);
    let alias = |sub: u32| format!("Eth{}/{}", front_panel, sub);
    let lane = |offset: u32| first_lane + offset;
    let lanes: Vec<String> = (0..4).map(|o| lane(o).to_string()).collect();

    json!({
        "lanes": lanes.join(","),
        "default_brkout_mode": "1x100G[40G]",
        "breakout_modes": {
            "1x100G[40G]": [
                child(&name(0), &[lane(0), lane(1), lane(2), lane(3)], 100000, &alias(1), front_panel),
            ],
            "4x25G[10G]": [
                child(&name(0), &[lane(0)], 25000, &alias(1), front_panel),
                child(&name(1), &[lane(1)], 25000, &alias(2), front_panel),
                child(&name(2), &[lane(2)], 25000, &alias(3), front_panel),
                child(&name(3), &[lane(3)], 25000, &alias(4), front_panel),
            ],
            "2x50G": [
                child(&name(0), &[lane(0), lane(1)], 50000, &alias(1), front_panel),
                child(&name(2), &[lane(2), lane(3)], 50000, &alias(3), front_panel),
            ],
            "1x50G(2)+2x25G(2)": [
                child(&name(0), &[lane(0), lane(1)], 50000, &alias(1), front_panel),
                child(&name(2), &[lane(2)], 25000, &alias(3), front_panel),
                child(&name(3), &[lane(3)], 25000, &alias(4), front_panel),
            ],
        },
    })
}

/// Descriptor with two four-lane ports: Ethernet0 (lanes 65-68) and
/// Ethernet4 (lanes 69-72).
pub fn two_port_descriptor_json() -> String {
    json!({
        "interfaces": {
            "Ethernet0": quad_lane_group(0, 65, 1),
            "Ethernet4": quad_lane_group(4, 69, 2),
        }
    })
    .to_string()
}

/// Breakout scenario: initial CONFIG_DB contents.
#[derive(Debug, Clone, Default)]
pub struct TestScenario {
    /// Scenario name
    pub name: String,
    /// Rows present before the breakout
    pub rows: Vec<RowFixture>,
}

impl TestScenario {
    /// Create a new test scenario
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Add a row
    pub fn with_row(mut self, row: RowFixture) -> Self {
        self.rows.push(row);
        self
    }

    /// Ethernet0 in `1x100G[40G]`, administratively up.
    pub fn ethernet0_single() -> Self {
        Self::new("Ethernet0 1x100G")
            .with_row(port_fixtures::breakout_cfg("Ethernet0", "1x100G[40G]"))
            .with_row(port_fixtures::port_up("Ethernet0", "65,66,67,68", 100000))
    }

    /// Ethernet0 in `4x25G[10G]`, all four ports administratively up.
    pub fn ethernet0_quad() -> Self {
        Self::new("Ethernet0 4x25G")
            .with_row(port_fixtures::breakout_cfg("Ethernet0", "4x25G[10G]"))
            .with_row(port_fixtures::port_up("Ethernet0", "65", 25000))
            .with_row(port_fixtures::port_up("Ethernet1", "66", 25000))
            .with_row(port_fixtures::port_up("Ethernet2", "67", 25000))
            .with_row(port_fixtures::port_up("Ethernet3", "68", 25000))
    }

    /// Build an in-memory store holding the scenario rows
    pub fn store(&self) -> MemoryConfigStore {
        MemoryConfigStore::from_rows(self.rows.iter().cloned().map(RowFixture::into_row))
    }
}
