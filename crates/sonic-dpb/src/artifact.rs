//! New-port artifact written after a successful breakout.
//!
//! The file maps every created port to the configuration it was given, in
//! the same string form CONFIG_DB uses, so operators can audit a run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::descriptor::ChildPortSpec;
use crate::error::{DpbError, DpbResult};

/// Default artifact location.
pub const DEFAULT_ARTIFACT_PATH: &str = "/tmp/new_port_config.json";

/// Configuration recorded for one created port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPortEntry {
    /// Port alias.
    pub alias: String,
    /// Lanes (comma separated).
    pub lanes: String,
    /// Speed in Mb/s.
    pub speed: String,
    /// Front-panel index.
    pub index: String,
}

impl From<&ChildPortSpec> for NewPortEntry {
    fn from(spec: &ChildPortSpec) -> Self {
        Self {
            alias: spec.alias.clone(),
            lanes: spec.lanes_field(),
            speed: spec.speed.to_string(),
            index: spec.index.to_string(),
        }
    }
}

/// Port name -> created configuration.
pub type NewPortArtifact = BTreeMap<String, NewPortEntry>;

/// Builds the artifact for a set of created ports.
pub fn build(created: &[ChildPortSpec]) -> NewPortArtifact {
    created
        .iter()
        .map(|spec| (spec.name.clone(), NewPortEntry::from(spec)))
        .collect()
}

/// Writes the artifact as pretty JSON.
pub fn write(path: impl AsRef<Path>, artifact: &NewPortArtifact) -> DpbResult<()> {
    let content = serde_json::to_string_pretty(artifact)
        .map_err(|e| DpbError::Configuration(format!("Failed to serialize artifact: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}
