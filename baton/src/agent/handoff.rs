//! Handoff graph checks.
//!
//! Agents are compared by name: two distinct definitions sharing a name are
//! the same node, so a target that (transitively) hands back to an agent
//! named like one already on the current path forms a cycle.

use std::collections::HashSet;

use super::Agent;
use crate::error::ConfigError;

/// Walk the handoff graph rooted at `root` depth-first.
///
/// Returns [`ConfigError::CircularHandoff`] naming the first agent revisited
/// while still on the path.
pub(crate) fn check_acyclic(root: &Agent) -> Result<(), ConfigError> {
    let mut on_path = HashSet::new();
    visit(root, &mut on_path)
}

fn visit<'a>(agent: &'a Agent, on_path: &mut HashSet<&'a str>) -> Result<(), ConfigError> {
    if !on_path.insert(agent.name()) {
        return Err(ConfigError::CircularHandoff(agent.name().to_owned()));
    }
    for target in agent.handoffs() {
        visit(target, on_path)?;
    }
    on_path.remove(agent.name());
    Ok(())
}

/// Names of every agent reachable from `root`, root first, each once.
pub(crate) fn reachable(root: &Agent) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(agent) = stack.pop() {
        if !seen.insert(agent.name()) {
            continue;
        }
        order.push(agent.name());
        stack.extend(agent.handoffs().iter().rev().map(AsRef::as_ref));
    }
    order
}
