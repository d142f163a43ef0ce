//! Test infrastructure for dynamic port breakout
//!
//! Provides:
//! - CONFIG_DB row fixtures for ports, breakout state and dependent tables
//! - Breakout descriptor fixtures
//! - Store and mutation-journal verification helpers

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
