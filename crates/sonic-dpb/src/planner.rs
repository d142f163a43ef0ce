//! Reconciliation planning between two breakout modes.
//!
//! A port survives a mode change untouched when both modes produce a child
//! with the same name and speed. Only `(name, speed)` is compared: a
//! surviving port whose lanes or alias moved is still preserved as-is.

use tracing::{debug, instrument};

use crate::descriptor::{BreakoutDescriptor, ChildPortSpec};
use crate::error::DpbResult;

/// Minimal change set for one breakout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Parent port.
    pub port: String,
    /// Mode currently recorded.
    pub current_mode: String,
    /// Mode requested.
    pub target_mode: String,
    /// Ports to remove, with their outgoing spec.
    pub delete: Vec<ChildPortSpec>,
    /// Ports to create, with their resolved spec.
    pub add: Vec<ChildPortSpec>,
    /// Ports left untouched.
    pub preserved: Vec<String>,
}

impl ReconciliationPlan {
    /// Names of the ports to remove.
    pub fn delete_names(&self) -> Vec<String> {
        self.delete.iter().map(|c| c.name.clone()).collect()
    }

    /// Names of the ports to create.
    pub fn add_names(&self) -> Vec<String> {
        self.add.iter().map(|c| c.name.clone()).collect()
    }

    /// True when the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty() && self.add.is_empty()
    }
}

fn find<'a>(children: &'a [ChildPortSpec], name: &str) -> Option<&'a ChildPortSpec> {
    children.iter().find(|c| c.name == name)
}

/// Computes the plan for moving `port` from `current_mode` to
/// `target_mode`.
#[instrument(skip(descriptor))]
pub fn plan(
    descriptor: &BreakoutDescriptor,
    port: &str,
    current_mode: &str,
    target_mode: &str,
) -> DpbResult<ReconciliationPlan> {
    let old_children = descriptor.resolve(port, current_mode)?;
    let new_children = descriptor.resolve(port, target_mode)?;

    let mut plan = ReconciliationPlan {
        port: port.to_string(),
        current_mode: current_mode.to_string(),
        target_mode: target_mode.to_string(),
        ..Default::default()
    };

    if current_mode == target_mode {
        return Ok(plan);
    }

    for old in old_children {
        match find(new_children, &old.name) {
            Some(new) if new.speed == old.speed => {
                if new.lanes != old.lanes || new.alias != old.alias {
                    debug!(
                        "Preserving {} although lanes/alias differ ({} -> {}, {} -> {})",
                        old.name,
                        old.lanes_field(),
                        new.lanes_field(),
                        old.alias,
                        new.alias
                    );
                }
                plan.preserved.push(old.name.clone());
            }
            _ => plan.delete.push(old.clone()),
        }
    }

    plan.add = new_children
        .iter()
        .filter(|new| !plan.preserved.contains(&new.name))
        .cloned()
        .collect();

    debug!(
        "Plan for {}: delete {:?}, add {:?}, preserve {:?}",
        port,
        plan.delete_names(),
        plan.add_names(),
        plan.preserved
    );

    Ok(plan)
}
