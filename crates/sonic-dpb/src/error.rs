//! Error types for breakout operations.
//!
//! Errors raised before `APPLY_DELETE` leave CONFIG_DB either untouched or
//! with only administrative-down writes on the ports that were about to be
//! removed; re-running the command is safe. [`DpbError::PartialApply`] is
//! the only kind raised after mutations began.

use std::fmt;
use std::io;

use sonic_config_db::{ConfigDbError, RowRef};
use thiserror::Error;

use crate::sequencer::Phase;

/// Result type alias for breakout operations.
pub type DpbResult<T> = Result<T, DpbError>;

/// Exit code for runs stopped before any destructive mutation.
pub const EXIT_ABORTED: u8 = 1;

/// Exit code for runs interrupted after deletion started.
pub const EXIT_PARTIAL_APPLY: u8 = 2;

/// A list of rows, rendered one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowList(pub Vec<RowRef>);

impl fmt::Display for RowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.0 {
            write!(f, "\n  {}", row)?;
        }
        Ok(())
    }
}

/// Errors that can occur while planning or applying a breakout.
#[derive(Debug, Error)]
pub enum DpbError {
    /// The port has no entry in the breakout descriptor.
    #[error("Port '{port}' is not present in the breakout descriptor")]
    UnknownPort {
        /// The requested port.
        port: String,
    },

    /// The mode is not supported by the port.
    #[error("Breakout mode '{mode}' is not supported by {port} (supported: {})", .supported.join(", "))]
    UnknownMode {
        /// The port.
        port: String,
        /// The requested mode.
        mode: String,
        /// Modes the port supports.
        supported: Vec<String>,
    },

    /// The breakout descriptor is malformed or violates lane coverage.
    #[error("Breakout descriptor is corrupt: {context}: {reason}")]
    DescriptorCorrupt {
        /// Where the problem was found (port / mode / file).
        context: String,
        /// What is wrong.
        reason: String,
    },

    /// CONFIG_DB holds no recorded breakout mode for the port.
    #[error("{port} is not present in the BREAKOUT_CFG table")]
    ModeNotRecorded {
        /// The port.
        port: String,
    },

    /// The operator declined to proceed.
    #[error("Breakout of {port} cancelled by operator")]
    ConfirmationDeclined {
        /// The port.
        port: String,
    },

    /// A port could not be brought administratively down.
    #[error("Failed to quiesce {port}: {reason}")]
    QuiesceFailure {
        /// The port that failed.
        port: String,
        /// Why it failed.
        reason: String,
    },

    /// Modeled configuration still references ports about to be deleted.
    #[error("Dependencies found for ports to be deleted, use --force to remove them:{rows}")]
    BlockingDependency {
        /// The blocking rows.
        rows: RowList,
    },

    /// The operator declined to proceed past unverifiable references.
    #[error("Breakout cancelled: configuration that cannot be verified references ports to be deleted:{rows}")]
    UnmodeledDependencyDeclined {
        /// The unmodeled rows.
        rows: RowList,
    },

    /// The run stopped after mutations began.
    #[error("Breakout interrupted in {phase} after {} completed mutation(s); recorded mode and port set may disagree, inspect before retrying: {message}", .completed.len())]
    PartialApply {
        /// The phase that failed.
        phase: Phase,
        /// Mutations that completed before the failure.
        completed: Vec<String>,
        /// The failure.
        message: String,
    },

    /// Another breakout run holds the port.
    #[error("Breakout of {port} is locked by {owner}")]
    LockHeld {
        /// The port.
        port: String,
        /// Description of the lock holder.
        owner: String,
    },

    /// CONFIG_DB access failed before any destructive mutation.
    #[error(transparent)]
    Store(#[from] ConfigDbError),

    /// Configuration file problem.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DpbError {
    /// Creates a descriptor corruption error.
    pub fn descriptor_corrupt(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DescriptorCorrupt {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Creates a quiesce failure.
    pub fn quiesce(port: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::QuiesceFailure {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if re-running the command is safe without manual
    /// inspection.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DpbError::PartialApply { .. })
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            DpbError::PartialApply { .. } => EXIT_PARTIAL_APPLY,
            _ => EXIT_ABORTED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mode_lists_supported() {
        let err = DpbError::UnknownMode {
            port: "Ethernet0".to_string(),
            mode: "8x10G".to_string(),
            supported: vec!["1x100G[40G]".to_string(), "4x25G[10G]".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Breakout mode '8x10G' is not supported by Ethernet0 (supported: 1x100G[40G], 4x25G[10G])"
        );
    }

    #[test]
    fn test_blocking_dependency_lists_rows() {
        let err = DpbError::BlockingDependency {
            rows: RowList(vec![
                RowRef::new("VLAN_MEMBER", "Vlan100|Ethernet2"),
                RowRef::new("INTERFACE", "Ethernet2"),
            ]),
        };
        let msg = err.to_string();
        assert!(msg.contains("\n  VLAN_MEMBER|Vlan100|Ethernet2"));
        assert!(msg.contains("\n  INTERFACE|Ethernet2"));
    }

    #[test]
    fn test_retryable_and_exit_codes() {
        let partial = DpbError::PartialApply {
            phase: Phase::ApplyAdd,
            completed: vec!["DEL PORT|Ethernet0".to_string()],
            message: "hset failed".to_string(),
        };
        assert!(!partial.is_retryable());
        assert_eq!(partial.exit_code(), EXIT_PARTIAL_APPLY);
        assert!(partial.to_string().contains("APPLY_ADD after 1 completed"));

        let quiesce = DpbError::quiesce("Ethernet0", "row missing");
        assert!(quiesce.is_retryable());
        assert_eq!(quiesce.exit_code(), EXIT_ABORTED);
    }
}
