//! Name-keyed tool collections.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{BoxedTool, DynTool, ToolDefinition};

/// An agent's tool catalog.
///
/// Keeps declaration order for the provider-facing catalog and an index for
/// O(1) lookup by name. Adding a tool whose name is already present replaces
/// the earlier one in place.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<BoxedTool>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool.
    pub fn add<T: DynTool + 'static>(&mut self, tool: T) {
        self.add_shared(Arc::new(tool));
    }

    /// Add an already shared tool.
    pub fn add_shared(&mut self, tool: BoxedTool) {
        let name = tool.name().to_owned();
        if let Some(&slot) = self.index.get(&name) {
            self.tools[slot] = tool;
        } else {
            self.index.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Look up a tool by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    /// Check if a tool with the given name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Provider-facing definitions in declaration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Tool names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Iterate over the tools in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxedTool> {
        self.tools.iter()
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .finish()
    }
}

impl FromIterator<BoxedTool> for ToolSet {
    fn from_iter<I: IntoIterator<Item = BoxedTool>>(iter: I) -> Self {
        let mut set = Self::new();
        for tool in iter {
            set.add_shared(tool);
        }
        set
    }
}
