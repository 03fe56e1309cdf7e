//! Rooted tree graphs with node heights and optional per-edge trait values.

use serde::{Deserialize, Serialize};

use crate::errors::{BmcError, ErrorInfo};

/// A single node of a [`TreeGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Node height (time before present); never negative.
    pub height: f64,
    /// Leaf label, if any.
    pub taxon: Option<String>,
}

impl TreeNode {
    /// Creates an internal (unlabelled) node.
    pub fn internal(height: f64) -> Self {
        Self {
            height,
            taxon: None,
        }
    }

    /// Creates a labelled leaf node.
    pub fn leaf(height: f64, taxon: impl Into<String>) -> Self {
        Self {
            height,
            taxon: Some(taxon.into()),
        }
    }
}

/// Complete structural payload adopted by [`TreeGraph::adopt_structure`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStructure {
    /// Nodes indexed by id.
    pub nodes: Vec<TreeNode>,
    /// Parent id per node id; exactly one entry is `None` (the root).
    pub parents: Vec<Option<usize>>,
    /// Per-node trait values describing the edge above each node.
    pub traits: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
struct EditSnapshot {
    nodes: Vec<TreeNode>,
    parents: Vec<Option<usize>>,
    traits: Vec<Vec<f64>>,
}

/// Rooted tree with a parent relation, node heights and leaf labels.
///
/// Node ids are dense indices `0..node_count`. Structural replacement happens
/// inside a `begin_edit` / `adopt_structure` / `end_edit` transaction; closing
/// the transaction validates the topology and bumps [`TreeGraph::version`] so
/// dependent caches can detect the change in one step.
#[derive(Debug, Clone)]
pub struct TreeGraph {
    name: String,
    nodes: Vec<TreeNode>,
    parents: Vec<Option<usize>>,
    trait_names: Vec<String>,
    traits: Vec<Vec<f64>>,
    version: u64,
    pending: Option<Box<EditSnapshot>>,
}

impl TreeGraph {
    /// Builds and validates a tree.
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<TreeNode>,
        parents: Vec<Option<usize>>,
    ) -> Result<Self, BmcError> {
        let traits = vec![Vec::new(); nodes.len()];
        let tree = Self {
            name: name.into(),
            nodes,
            parents,
            trait_names: Vec::new(),
            traits,
            version: 0,
            pending: None,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Attaches named per-edge trait columns; `values[node]` holds one value per column.
    pub fn with_traits(
        mut self,
        names: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, BmcError> {
        if values.len() != self.nodes.len() || values.iter().any(|row| row.len() != names.len()) {
            return Err(BmcError::Model(
                ErrorInfo::new("tree-traits", "trait table does not match node count")
                    .with_context("tree", self.name.clone())
                    .with_context("columns", names.len().to_string()),
            ));
        }
        self.trait_names = names;
        self.traits = values;
        Ok(self)
    }

    /// Tree name used to match checkpoint blocks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes indexed by id.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Node height by id.
    pub fn height(&self, node: usize) -> Result<f64, BmcError> {
        self.nodes
            .get(node)
            .map(|n| n.height)
            .ok_or_else(|| self.unknown_node(node))
    }

    /// Parent of `node`, `None` for the root.
    pub fn parent(&self, node: usize) -> Result<Option<usize>, BmcError> {
        self.parents
            .get(node)
            .copied()
            .ok_or_else(|| self.unknown_node(node))
    }

    /// Children of `node` in ascending id order.
    pub fn children(&self, node: usize) -> Vec<usize> {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| **parent == Some(node))
            .map(|(child, _)| child)
            .collect()
    }

    /// Root node id.
    pub fn root(&self) -> usize {
        self.parents
            .iter()
            .position(Option::is_none)
            .unwrap_or_default()
    }

    /// Whether `node` has no children.
    pub fn is_external(&self, node: usize) -> bool {
        !self.parents.contains(&Some(node))
    }

    /// `(child, parent)` pairs ordered by child id.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter_map(|(child, parent)| parent.map(|p| (child, p)))
    }

    /// Names of the per-edge trait columns.
    pub fn trait_names(&self) -> &[String] {
        &self.trait_names
    }

    /// Trait values stored for the edge above `node`.
    pub fn edge_traits(&self, node: usize) -> &[f64] {
        self.traits.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Monotone counter bumped whenever the structure or a height changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether an edit transaction is open.
    pub fn is_editing(&self) -> bool {
        self.pending.is_some()
    }

    /// Moves a single node, keeping `child <= node <= parent` intact.
    pub fn set_height(&mut self, node: usize, height: f64) -> Result<(), BmcError> {
        if node >= self.nodes.len() {
            return Err(self.unknown_node(node));
        }
        if !height.is_finite() || height < 0.0 {
            return Err(self.structure_error("node height must be finite and non-negative", node));
        }
        if let Some(parent) = self.parents[node] {
            if height > self.nodes[parent].height {
                return Err(self.structure_error("node height exceeds parent height", node));
            }
        }
        if self
            .children(node)
            .iter()
            .any(|&child| self.nodes[child].height > height)
        {
            return Err(self.structure_error("node height below a child height", node));
        }
        self.nodes[node].height = height;
        self.version += 1;
        Ok(())
    }

    /// Opens an edit transaction.
    pub fn begin_edit(&mut self) -> Result<(), BmcError> {
        if self.pending.is_some() {
            return Err(BmcError::Model(
                ErrorInfo::new("tree-edit-open", "edit transaction already open")
                    .with_context("tree", self.name.clone()),
            ));
        }
        self.pending = Some(Box::new(EditSnapshot {
            nodes: self.nodes.clone(),
            parents: self.parents.clone(),
            traits: self.traits.clone(),
        }));
        Ok(())
    }

    /// Replaces heights, labels, topology and traits wholesale.
    pub fn adopt_structure(&mut self, structure: TreeStructure) -> Result<(), BmcError> {
        if self.pending.is_none() {
            return Err(BmcError::Model(
                ErrorInfo::new("tree-edit-closed", "adopt_structure outside an edit transaction")
                    .with_context("tree", self.name.clone()),
            ));
        }
        if structure.parents.len() != structure.nodes.len()
            || structure.traits.len() != structure.nodes.len()
        {
            return Err(BmcError::Model(
                ErrorInfo::new("tree-structure", "node, parent and trait tables differ in length")
                    .with_context("tree", self.name.clone()),
            ));
        }
        let columns = self.trait_names.len();
        if structure.traits.iter().any(|row| row.len() != columns) {
            return Err(BmcError::Model(
                ErrorInfo::new("tree-traits", "trait row width differs from declared columns")
                    .with_context("tree", self.name.clone())
                    .with_context("columns", columns.to_string()),
            ));
        }
        self.nodes = structure.nodes;
        self.parents = structure.parents;
        self.traits = structure.traits;
        Ok(())
    }

    /// Closes the transaction; an invalid result rolls back to the pre-edit tree.
    pub fn end_edit(&mut self) -> Result<(), BmcError> {
        let Some(snapshot) = self.pending.take() else {
            return Err(BmcError::Model(
                ErrorInfo::new("tree-edit-closed", "no edit transaction to close")
                    .with_context("tree", self.name.clone()),
            ));
        };
        if let Err(err) = self.validate() {
            self.nodes = snapshot.nodes;
            self.parents = snapshot.parents;
            self.traits = snapshot.traits;
            return Err(err);
        }
        self.version += 1;
        Ok(())
    }

    /// Runs `edit` inside a transaction, rolling back on any error.
    pub fn edit<F>(&mut self, edit: F) -> Result<(), BmcError>
    where
        F: FnOnce(&mut Self) -> Result<(), BmcError>,
    {
        self.begin_edit()?;
        if let Err(err) = edit(self) {
            if let Some(snapshot) = self.pending.take() {
                self.nodes = snapshot.nodes;
                self.parents = snapshot.parents;
                self.traits = snapshot.traits;
            }
            return Err(err);
        }
        self.end_edit()
    }

    /// Checks single root, acyclicity, parent range and height ordering.
    pub fn validate(&self) -> Result<(), BmcError> {
        let count = self.nodes.len();
        if count == 0 {
            return Err(self.structure_error("tree has no nodes", 0));
        }
        if self.parents.len() != count {
            return Err(self.structure_error("parent table length differs from node count", 0));
        }
        let roots = self.parents.iter().filter(|p| p.is_none()).count();
        if roots != 1 {
            return Err(BmcError::Model(
                ErrorInfo::new("tree-structure", "tree must have exactly one root")
                    .with_context("tree", self.name.clone())
                    .with_context("roots", roots.to_string()),
            ));
        }
        for (node, record) in self.nodes.iter().enumerate() {
            if !record.height.is_finite() || record.height < 0.0 {
                return Err(self.structure_error("node height must be finite and non-negative", node));
            }
            if let Some(parent) = self.parents[node] {
                if parent >= count || parent == node {
                    return Err(self.structure_error("parent id out of range", node));
                }
                if record.height > self.nodes[parent].height {
                    return Err(self.structure_error("child height exceeds parent height", node));
                }
            }
        }
        for start in 0..count {
            let mut cursor = start;
            let mut hops = 0usize;
            while let Some(parent) = self.parents[cursor] {
                hops += 1;
                if hops > count {
                    return Err(self.structure_error("parent relation contains a cycle", start));
                }
                cursor = parent;
            }
        }
        Ok(())
    }

    fn unknown_node(&self, node: usize) -> BmcError {
        BmcError::Model(
            ErrorInfo::new("tree-node", "unknown node id")
                .with_context("tree", self.name.clone())
                .with_context("node", node.to_string()),
        )
    }

    fn structure_error(&self, message: &str, node: usize) -> BmcError {
        BmcError::Model(
            ErrorInfo::new("tree-structure", message)
                .with_context("tree", self.name.clone())
                .with_context("node", node.to_string()),
        )
    }
}

/// Structural equality; edit bookkeeping and the version counter are ignored.
impl PartialEq for TreeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.nodes == other.nodes
            && self.parents == other.parents
            && self.trait_names == other.trait_names
            && self.traits == other.traits
    }
}
