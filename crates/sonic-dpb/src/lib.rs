//! Dynamic port breakout for SONiC.
//!
//! This crate implements the `dpb` tool, which changes how a physical
//! port's lanes are split into logical ports by reconciling CONFIG_DB from
//! one breakout mode to another.
//!
//! # Components
//!
//! - [`BreakoutDescriptor`]: platform lane groups and their modes
//! - [`planner::plan`]: minimal delete/add/preserve set between two modes
//! - [`DependencyValidator`]: configuration still referencing deleted ports
//! - [`SafetySequencer`]: phase-ordered application against a
//!   [`ConfigStore`](sonic_config_db::ConfigStore)
//!
//! # Tables
//!
//! | Database | Table | Purpose |
//! |----------|-------|---------|
//! | CONFIG_DB | PORT | Deleted, created and quiesced ports |
//! | CONFIG_DB | BREAKOUT_CFG | Recorded breakout mode per parent port |
//! | CONFIG_DB | (all others) | Scanned for references to deleted ports |
//!
//! # Example
//!
//! ```ignore
//! use sonic_dpb::{AutoConfirm, BreakoutDescriptor, BreakoutRequest, SafetySequencer, TableRegistry};
//!
//! let descriptor = BreakoutDescriptor::load("/usr/share/sonic/hwsku/breakout.json")?;
//! let registry = TableRegistry::builtin();
//! let mut sequencer = SafetySequencer::new(&descriptor, &registry, &store, &AutoConfirm(true));
//! sequencer.run(&BreakoutRequest::new("Ethernet0", "4x25G")).await?;
//! ```

pub mod artifact;
pub mod config_file;
pub mod defaults;
pub mod descriptor;
pub mod error;
pub mod lock;
pub mod planner;
pub mod sequencer;
mod tables;
pub mod validator;

pub use config_file::DpbConfig;
pub use defaults::{PortDefaults, RowTemplate, TemplatePortDefaults};
pub use descriptor::{BreakoutDescriptor, ChildPortSpec, PortLaneGroup};
pub use error::{DpbError, DpbResult, EXIT_ABORTED, EXIT_PARTIAL_APPLY};
pub use lock::BreakoutLock;
pub use planner::ReconciliationPlan;
pub use sequencer::{
    AutoConfirm, BreakoutOutcome, BreakoutPreview, BreakoutRequest, BreakoutSummary, Confirmer,
    OrphanPolicy, Phase, SafetySequencer, SequencerOptions, StdinConfirmer,
};
pub use tables::*;
pub use validator::{
    DependencyReport, DependencyValidator, ModeledTable, PortRef, TableKind, TableRegistry,
};
