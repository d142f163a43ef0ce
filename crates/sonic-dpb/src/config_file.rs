//! Configuration file support for dpb
//!
//! Loads and validates breakout configuration from TOML files.
//! Default location: /etc/sonic/dpb.conf

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use sonic_config_db::{base_field_name, CONFIG_DB_ID};

use crate::artifact::DEFAULT_ARTIFACT_PATH;
use crate::defaults::{RowTemplate, TemplatePortDefaults};
use crate::error::{DpbError, DpbResult};
use crate::sequencer::{OrphanPolicy, SequencerOptions};
use crate::tables::{admin_status, MANAGED_TABLES};
use crate::validator::{ModeledTable, PortRef, TableRegistry};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/dpb.conf";

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number for CONFIG_DB
    #[serde(default = "default_config_db_number")]
    pub config_db_number: u32,
}

/// Breakout behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakoutConfig {
    /// Breakout descriptor (JSON)
    #[serde(default = "default_descriptor_path")]
    pub descriptor_path: PathBuf,

    /// New-port artifact written after a successful run
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// What happens to forced modeled references
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,

    /// Admin status of newly created ports ("up" or "down")
    #[serde(default = "default_new_port_admin_status")]
    pub new_port_admin_status: String,

    /// MTU written to newly created ports
    #[serde(default = "default_mtu")]
    pub default_mtu: u32,
}

/// Advisory lock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Directory holding per-port lock files
    #[serde(default = "default_lock_dir")]
    pub dir: PathBuf,

    /// Lease duration in seconds
    #[serde(default = "default_lock_ttl")]
    pub ttl_secs: u64,
}

/// Extra table whose port references are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeledTableConfig {
    /// Table name
    pub name: String,

    /// Key parts (0-based, split on `|`) holding port names
    #[serde(default)]
    pub key_parts: Vec<usize>,

    /// Fields holding a port or a port list
    #[serde(default)]
    pub fields: Vec<String>,

    /// Field names are port names
    #[serde(default)]
    pub field_names: bool,
}

impl ModeledTableConfig {
    /// Converts to a registry entry.
    pub fn to_modeled(&self) -> ModeledTable {
        let mut refs: Vec<PortRef> = self.key_parts.iter().map(|&i| PortRef::KeyPart(i)).collect();
        refs.extend(
            self.fields
                .iter()
                .map(|f| PortRef::Field(base_field_name(f).to_string())),
        );
        if self.field_names {
            refs.push(PortRef::FieldName);
        }
        ModeledTable::new(&self.name, refs)
    }
}

/// Complete dpb configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpbConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Breakout behavior
    #[serde(default)]
    pub breakout: BreakoutConfig,

    /// Advisory lock
    #[serde(default)]
    pub lock: LockConfig,

    /// Tables added to the built-in modeled set
    #[serde(default)]
    pub modeled_tables: Vec<ModeledTableConfig>,

    /// Default rows written for new ports with --load-defaults
    #[serde(default)]
    pub port_defaults: Vec<RowTemplate>,
}

// Default functions
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_config_db_number() -> u32 {
    CONFIG_DB_ID
}

fn default_descriptor_path() -> PathBuf {
    PathBuf::from("/usr/share/sonic/hwsku/breakout.json")
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT_PATH)
}

fn default_new_port_admin_status() -> String {
    admin_status::DOWN.to_string()
}

fn default_mtu() -> u32 {
    9100
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/run/dpb")
}

fn default_lock_ttl() -> u64 {
    300
}

// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            config_db_number: default_config_db_number(),
        }
    }
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            descriptor_path: default_descriptor_path(),
            artifact_path: default_artifact_path(),
            orphan_policy: OrphanPolicy::default(),
            new_port_admin_status: default_new_port_admin_status(),
            default_mtu: default_mtu(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            dir: default_lock_dir(),
            ttl_secs: default_lock_ttl(),
        }
    }
}

impl DpbConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> DpbResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                DpbError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(DpbError::Io(e)),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> DpbResult<()> {
        if self.database.redis_port == 0 {
            return Err(DpbError::Configuration(
                "redis_port must be > 0".to_string(),
            ));
        }

        let status = self.breakout.new_port_admin_status.as_str();
        if status != admin_status::UP && status != admin_status::DOWN {
            return Err(DpbError::Configuration(format!(
                "new_port_admin_status must be \"up\" or \"down\", got \"{}\"",
                status
            )));
        }

        if !(68..=9216).contains(&self.breakout.default_mtu) {
            return Err(DpbError::Configuration(
                "default_mtu must be 68-9216".to_string(),
            ));
        }

        if self.lock.ttl_secs == 0 {
            return Err(DpbError::Configuration(
                "lock ttl_secs must be > 0".to_string(),
            ));
        }

        for table in &self.modeled_tables {
            if table.name.is_empty() {
                return Err(DpbError::Configuration(
                    "modeled table with empty name".to_string(),
                ));
            }
            if MANAGED_TABLES.contains(&table.name.as_str()) {
                return Err(DpbError::Configuration(format!(
                    "{} is managed by breakout and cannot be modeled",
                    table.name
                )));
            }
            if table.key_parts.is_empty() && table.fields.is_empty() && !table.field_names {
                return Err(DpbError::Configuration(format!(
                    "modeled table {} declares no port reference",
                    table.name
                )));
            }
        }

        for template in &self.port_defaults {
            if template.table.is_empty() || template.key.is_empty() {
                return Err(DpbError::Configuration(
                    "port_defaults entries need a table and a key".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Built-in modeled tables plus the configured ones.
    pub fn registry(&self) -> TableRegistry {
        self.modeled_tables
            .iter()
            .map(ModeledTableConfig::to_modeled)
            .fold(TableRegistry::builtin(), TableRegistry::with_table)
    }

    /// Default-row provider built from `[[port_defaults]]`.
    pub fn port_defaults(&self) -> TemplatePortDefaults {
        TemplatePortDefaults::new(self.port_defaults.clone())
    }

    /// Sequencer options.
    pub fn sequencer_options(&self) -> SequencerOptions {
        SequencerOptions {
            orphan_policy: self.breakout.orphan_policy,
            new_port_admin_status: self.breakout.new_port_admin_status.clone(),
            default_mtu: Some(self.breakout.default_mtu),
            artifact_path: Some(self.breakout.artifact_path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::TableKind;
    use sonic_config_db::{field_values, ConfigRow};

    #[test]
    fn test_default_config() {
        let config = DpbConfig::default();
        assert_eq!(config.database.redis_host, "127.0.0.1");
        assert_eq!(config.database.config_db_number, 4);
        assert_eq!(config.breakout.orphan_policy, OrphanPolicy::Remove);
        assert_eq!(config.breakout.new_port_admin_status, "down");
        assert_eq!(
            config.breakout.artifact_path,
            PathBuf::from("/tmp/new_port_config.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[database]
redis_port = 6380

[breakout]
descriptor_path = "/tmp/breakout.json"
orphan_policy = "leave"
new_port_admin_status = "up"

[[modeled_tables]]
name = "MY_APP_TABLE"
key_parts = [0]
fields = ["peer_ports@"]

[[port_defaults]]
table = "PORT_QOS_MAP"
key = "{port}"
fields = { pfc_enable = "3,4" }
"#;
        let config: DpbConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.redis_port, 6380);
        assert_eq!(config.database.redis_host, "127.0.0.1");
        assert_eq!(config.breakout.orphan_policy, OrphanPolicy::Leave);
        assert_eq!(config.breakout.default_mtu, 9100);
        assert!(config.validate().is_ok());

        let options = config.sequencer_options();
        assert_eq!(options.new_port_admin_status, "up");

        assert_eq!(
            config.modeled_tables[0].to_modeled().refs,
            vec![PortRef::KeyPart(0), PortRef::Field("peer_ports".to_string())]
        );

        let registry = config.registry();
        let row = ConfigRow::new("MY_APP_TABLE", "x", field_values! { "peer_ports@" => "Ethernet4" });
        let kind = registry.kind("MY_APP_TABLE");
        assert!(matches!(kind, TableKind::Modeled(_)));
        assert!(kind.references_port(&row, "Ethernet4"));
        assert!(matches!(registry.kind("VLAN_MEMBER"), TableKind::Modeled(_)));

        assert!(!config.port_defaults().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DpbConfig::default();
        config.breakout.new_port_admin_status = "testing".to_string();
        assert!(config.validate().is_err());

        let mut config = DpbConfig::default();
        config.breakout.default_mtu = 10;
        assert!(config.validate().is_err());

        let mut config = DpbConfig::default();
        config.modeled_tables.push(ModeledTableConfig {
            name: "PORT".to_string(),
            key_parts: vec![0],
            fields: Vec::new(),
            field_names: false,
        });
        assert!(config.validate().is_err());

        let mut config = DpbConfig::default();
        config.modeled_tables.push(ModeledTableConfig {
            name: "EMPTY".to_string(),
            key_parts: Vec::new(),
            fields: Vec::new(),
            field_names: false,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dpb.conf");
        fs::write(&path, "[lock]\nttl_secs = 30\n").unwrap();

        let config = DpbConfig::load_or_default(&path).unwrap();
        assert_eq!(config.lock.ttl_secs, 30);

        let config = DpbConfig::load_or_default(dir.path().join("missing.conf")).unwrap();
        assert_eq!(config, DpbConfig::default());

        fs::write(&path, "[lock\n").unwrap();
        assert!(matches!(
            DpbConfig::load_or_default(&path),
            Err(DpbError::Configuration(_))
        ));
    }
}
