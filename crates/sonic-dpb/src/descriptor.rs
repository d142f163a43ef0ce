//! Platform breakout descriptor and topology resolution.
//!
//! The descriptor is a JSON file listing, for every physical port, the
//! SerDes lanes behind it and the child ports each breakout mode produces:
//!
//! ```json
//! {
//!   "interfaces": {
//!     "Ethernet0": {
//!       "lanes": "65,66,67,68",
//!       "default_brkout_mode": "1x100G[40G]",
//!       "breakout_modes": {
//!         "1x100G[40G]": [
//!           {"name": "Ethernet0", "lanes": "65,66,67,68", "speed": 100000,
//!            "alias": "Eth1/1", "index": 1}
//!         ]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Every mode is checked at load time: the child lane subsets must
//! partition the port's lanes exactly. A descriptor that fails the check is
//! rejected as a whole, before anything touches CONFIG_DB.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{DpbError, DpbResult};

/// One logical port produced by a breakout mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildPortSpec {
    /// Port name (e.g., "Ethernet2").
    pub name: String,
    /// Lanes assigned to this port.
    pub lanes: Vec<u32>,
    /// Speed in Mb/s.
    pub speed: u32,
    /// Port alias.
    pub alias: String,
    /// Front-panel index.
    pub index: u32,
}

impl ChildPortSpec {
    /// Creates a child port spec with an empty alias and index 0.
    pub fn new(name: impl Into<String>, lanes: Vec<u32>, speed: u32) -> Self {
        Self {
            name: name.into(),
            lanes,
            speed,
            alias: String::new(),
            index: 0,
        }
    }

    /// Sets the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Sets the index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Returns the lanes in CONFIG_DB form ("65,66").
    pub fn lanes_field(&self) -> String {
        format_lanes(&self.lanes)
    }

    /// Returns a short speed label ("25G").
    pub fn speed_label(&self) -> String {
        speed_label(self.speed)
    }
}

impl fmt::Display for ChildPortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.speed_label())
    }
}

/// A physical port and the breakout modes it supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLaneGroup {
    /// Parent port name.
    pub name: String,
    /// Lanes behind the port.
    pub lanes: Vec<u32>,
    /// Mode applied at first boot, if the platform declares one.
    pub default_mode: Option<String>,
    /// Mode name -> ordered child ports.
    pub modes: BTreeMap<String, Vec<ChildPortSpec>>,
}

impl PortLaneGroup {
    /// Creates a lane group with no modes.
    pub fn new(name: impl Into<String>, lanes: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            lanes,
            default_mode: None,
            modes: BTreeMap::new(),
        }
    }

    /// Adds a mode.
    pub fn with_mode(mut self, mode: impl Into<String>, children: Vec<ChildPortSpec>) -> Self {
        self.modes.insert(mode.into(), children);
        self
    }

    /// Sets the default mode.
    pub fn with_default_mode(mut self, mode: impl Into<String>) -> Self {
        self.default_mode = Some(mode.into());
        self
    }

    /// Number of lanes behind the port.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Supported mode names, sorted.
    pub fn supported_modes(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }

    fn validate(&self) -> DpbResult<()> {
        if self.lanes.is_empty() {
            return Err(DpbError::descriptor_corrupt(&self.name, "port has no lanes"));
        }
        let group: HashSet<u32> = self.lanes.iter().copied().collect();
        if group.len() != self.lanes.len() {
            return Err(DpbError::descriptor_corrupt(&self.name, "duplicate lane in port lanes"));
        }
        if self.modes.is_empty() {
            return Err(DpbError::descriptor_corrupt(&self.name, "no breakout modes"));
        }
        if let Some(default) = &self.default_mode {
            if !self.modes.contains_key(default) {
                return Err(DpbError::descriptor_corrupt(
                    &self.name,
                    format!("default mode '{}' is not a supported mode", default),
                ));
            }
        }

        for (mode, children) in &self.modes {
            let context = format!("{} mode {}", self.name, mode);
            if children.is_empty() {
                return Err(DpbError::descriptor_corrupt(context, "mode has no ports"));
            }

            let mut names = HashSet::new();
            let mut covered = HashSet::new();
            for child in children {
                if child.name.is_empty() {
                    return Err(DpbError::descriptor_corrupt(context, "port with empty name"));
                }
                if !names.insert(child.name.as_str()) {
                    return Err(DpbError::descriptor_corrupt(
                        context,
                        format!("duplicate port {}", child.name),
                    ));
                }
                if child.speed == 0 {
                    return Err(DpbError::descriptor_corrupt(
                        context,
                        format!("{} has zero speed", child.name),
                    ));
                }
                if child.lanes.is_empty() {
                    return Err(DpbError::descriptor_corrupt(
                        context,
                        format!("{} has no lanes", child.name),
                    ));
                }
                for lane in &child.lanes {
                    if !group.contains(lane) {
                        return Err(DpbError::descriptor_corrupt(
                            context,
                            format!("{} uses lane {} outside the port", child.name, lane),
                        ));
                    }
                    if !covered.insert(*lane) {
                        return Err(DpbError::descriptor_corrupt(
                            context,
                            format!("lane {} assigned twice (at {})", lane, child.name),
                        ));
                    }
                }
            }

            if covered.len() != group.len() {
                let mut missing: Vec<u32> = group.difference(&covered).copied().collect();
                missing.sort_unstable();
                return Err(DpbError::descriptor_corrupt(
                    context,
                    format!("lanes {} not assigned to any port", format_lanes(&missing)),
                ));
            }
        }

        Ok(())
    }
}

/// Read-only catalog of breakout topologies for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakoutDescriptor {
    groups: BTreeMap<String, PortLaneGroup>,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    interfaces: BTreeMap<String, RawLaneGroup>,
}

#[derive(Debug, Deserialize)]
struct RawLaneGroup {
    lanes: String,
    #[serde(default)]
    default_brkout_mode: Option<String>,
    breakout_modes: BTreeMap<String, Vec<RawChildPort>>,
}

#[derive(Debug, Deserialize)]
struct RawChildPort {
    name: String,
    lanes: String,
    speed: u32,
    #[serde(default)]
    alias: String,
    #[serde(default)]
    index: u32,
}

impl BreakoutDescriptor {
    /// Builds a descriptor from lane groups, checking every mode.
    pub fn from_groups(groups: impl IntoIterator<Item = PortLaneGroup>) -> DpbResult<Self> {
        let mut map = BTreeMap::new();
        for group in groups {
            group.validate()?;
            if map.contains_key(&group.name) {
                return Err(DpbError::descriptor_corrupt(&group.name, "port listed twice"));
            }
            map.insert(group.name.clone(), group);
        }
        Ok(Self { groups: map })
    }

    /// Parses a descriptor from JSON text.
    pub fn from_json(content: &str) -> DpbResult<Self> {
        let raw: RawDescriptor = serde_json::from_str(content)
            .map_err(|e| DpbError::descriptor_corrupt("descriptor", e.to_string()))?;

        let mut groups = Vec::with_capacity(raw.interfaces.len());
        for (name, raw_group) in raw.interfaces {
            let lanes = parse_lanes(&raw_group.lanes)
                .map_err(|reason| DpbError::descriptor_corrupt(&name, reason))?;

            let mut group = PortLaneGroup::new(&name, lanes);
            group.default_mode = raw_group.default_brkout_mode;

            for (mode, raw_children) in raw_group.breakout_modes {
                let mut children = Vec::with_capacity(raw_children.len());
                for raw_child in raw_children {
                    let lanes = parse_lanes(&raw_child.lanes).map_err(|reason| {
                        DpbError::descriptor_corrupt(
                            format!("{} mode {} port {}", name, mode, raw_child.name),
                            reason,
                        )
                    })?;
                    children.push(
                        ChildPortSpec::new(raw_child.name, lanes, raw_child.speed)
                            .with_alias(raw_child.alias)
                            .with_index(raw_child.index),
                    );
                }
                group.modes.insert(mode, children);
            }
            groups.push(group);
        }

        Self::from_groups(groups)
    }

    /// Loads a descriptor file.
    pub fn load(path: impl AsRef<Path>) -> DpbResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DpbError::descriptor_corrupt(path.display().to_string(), e.to_string())
        })?;
        let descriptor = Self::from_json(&content)?;
        debug!(
            "Loaded breakout descriptor {} ({} ports)",
            path.display(),
            descriptor.groups.len()
        );
        Ok(descriptor)
    }

    /// Returns the lane group of a port.
    pub fn group(&self, port: &str) -> DpbResult<&PortLaneGroup> {
        self.groups.get(port).ok_or_else(|| DpbError::UnknownPort {
            port: port.to_string(),
        })
    }

    /// Expands `(port, mode)` into its ordered child ports.
    pub fn resolve(&self, port: &str, mode: &str) -> DpbResult<&[ChildPortSpec]> {
        let group = self.group(port)?;
        group
            .modes
            .get(mode)
            .map(Vec::as_slice)
            .ok_or_else(|| DpbError::UnknownMode {
                port: port.to_string(),
                mode: mode.to_string(),
                supported: group.supported_modes(),
            })
    }

    /// Returns the names of all ports in the descriptor, sorted.
    pub fn ports(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

/// Parses a comma-separated lane list ("65,66,67,68").
pub fn parse_lanes(value: &str) -> Result<Vec<u32>, String> {
    value
        .split(',')
        .map(|s| {
            s.trim()
                .parse()
                .map_err(|_| format!("invalid lane '{}' in '{}'", s.trim(), value))
        })
        .collect()
}

/// Formats lanes in CONFIG_DB form.
pub fn format_lanes(lanes: &[u32]) -> String {
    lanes
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Formats a speed in Mb/s as a short label ("100G", "2500M").
pub fn speed_label(speed: u32) -> String {
    if speed >= 1000 && speed % 1000 == 0 {
        format!("{}G", speed / 1000)
    } else {
        format!("{}M", speed)
    }
}
