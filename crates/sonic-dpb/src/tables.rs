//! Table name constants for breakout.
//!
//! These match the CONFIG_DB schema used by the SONiC configuration tools.

/// CONFIG_DB table for port configuration.
pub const CFG_PORT_TABLE_NAME: &str = "PORT";

/// CONFIG_DB table recording the breakout mode of each parent port.
pub const CFG_BREAKOUT_CFG_TABLE_NAME: &str = "BREAKOUT_CFG";

/// Tables written by the breakout sequencer itself. The dependency scan
/// never reports rows of these tables.
pub const MANAGED_TABLES: &[&str] = &[CFG_PORT_TABLE_NAME, CFG_BREAKOUT_CFG_TABLE_NAME];

/// Field names used in breakout tables.
pub mod fields {
    /// Port admin status field (up/down).
    pub const ADMIN_STATUS: &str = "admin_status";

    /// Port alias field.
    pub const ALIAS: &str = "alias";

    /// Port lanes field (comma separated).
    pub const LANES: &str = "lanes";

    /// Port speed field (Mb/s).
    pub const SPEED: &str = "speed";

    /// Port index field.
    pub const INDEX: &str = "index";

    /// Port MTU field.
    pub const MTU: &str = "mtu";

    /// Recorded breakout mode in BREAKOUT_CFG.
    pub const BRKOUT_MODE: &str = "brkout_mode";
}

/// Admin status values.
pub mod admin_status {
    /// Administratively up.
    pub const UP: &str = "up";

    /// Administratively down.
    pub const DOWN: &str = "down";
}
