//! The mutable model graph sampled by the chain.

use indexmap::IndexMap;

use crate::errors::{BmcError, ErrorInfo};
use crate::parameter::Parameter;
use crate::tree::TreeGraph;

/// Named parameters plus named trees, each kept in insertion order.
///
/// Insertion order is the enumeration order used when checkpoints are
/// written; lookups on restore go through the names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationState {
    parameters: IndexMap<String, Parameter>,
    trees: IndexMap<String, TreeGraph>,
}

impl SimulationState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter; names must be unique.
    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<(), BmcError> {
        check_record_name("parameter", parameter.name()).map_err(BmcError::Model)?;
        if self.parameters.contains_key(parameter.name()) {
            return Err(BmcError::Model(
                ErrorInfo::new("duplicate-parameter", "parameter already registered")
                    .with_context("parameter", parameter.name()),
            ));
        }
        self.parameters
            .insert(parameter.name().to_string(), parameter);
        Ok(())
    }

    /// Registers a tree; its name, taxon labels and trait names must each fit
    /// in one checkpoint field.
    pub fn add_tree(&mut self, tree: TreeGraph) -> Result<(), BmcError> {
        check_record_name("tree", tree.name()).map_err(BmcError::Model)?;
        let labels = tree.nodes().iter().filter_map(|node| node.taxon.as_deref());
        for (kind, label) in labels
            .map(|taxon| ("taxon", taxon))
            .chain(tree.trait_names().iter().map(|name| ("trait", name.as_str())))
        {
            check_record_name(kind, label)
                .map_err(|info| BmcError::Model(info.with_context("tree", tree.name())))?;
        }
        if self.trees.contains_key(tree.name()) {
            return Err(BmcError::Model(
                ErrorInfo::new("duplicate-tree", "tree already registered")
                    .with_context("tree", tree.name()),
            ));
        }
        self.trees.insert(tree.name().to_string(), tree);
        Ok(())
    }

    /// Looks up a parameter by name.
    pub fn parameter(&self, name: &str) -> Result<&Parameter, BmcError> {
        self.parameters
            .get(name)
            .ok_or_else(|| missing("parameter-missing", "parameter", name))
    }

    /// Mutable parameter lookup.
    pub fn parameter_mut(&mut self, name: &str) -> Result<&mut Parameter, BmcError> {
        self.parameters
            .get_mut(name)
            .ok_or_else(|| missing("parameter-missing", "parameter", name))
    }

    /// Looks up a tree by name.
    pub fn tree(&self, name: &str) -> Result<&TreeGraph, BmcError> {
        self.trees
            .get(name)
            .ok_or_else(|| missing("tree-missing", "tree", name))
    }

    /// Mutable tree lookup.
    pub fn tree_mut(&mut self, name: &str) -> Result<&mut TreeGraph, BmcError> {
        self.trees
            .get_mut(name)
            .ok_or_else(|| missing("tree-missing", "tree", name))
    }

    /// Parameters in enumeration order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> + '_ {
        self.parameters.values()
    }

    /// Trees in enumeration order.
    pub fn trees(&self) -> impl Iterator<Item = &TreeGraph> + '_ {
        self.trees.values()
    }

    /// Number of registered parameters.
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Number of registered trees.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Rejects names that cannot be stored as a single field of a tab-separated
/// checkpoint record: empty, or containing a tab or a line break.
pub fn check_record_name(kind: &str, name: &str) -> Result<(), ErrorInfo> {
    if name.is_empty() || name.contains(|c: char| matches!(c, '\t' | '\n' | '\r')) {
        return Err(ErrorInfo::new(
            "invalid-name",
            format!("{kind} name must be non-empty without tabs or line breaks"),
        )
        .with_context(kind, name.escape_debug().to_string()));
    }
    Ok(())
}

fn missing(code: &str, kind: &str, name: &str) -> BmcError {
    BmcError::Model(ErrorInfo::new(code, format!("unknown {kind}")).with_context(kind, name))
}
