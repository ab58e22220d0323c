//! Resolved dependency graphs and their differences.

use std::collections::{BTreeSet, HashSet};

/// A package in a [`DependencyGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    /// Package name, including any scope.
    pub name: String,
    /// Locked version.
    pub version: String,
    /// Indices of the packages this one depends on.
    pub children: Vec<usize>,
}

/// A rooted dependency graph stored as an arena of nodes.
///
/// Node 0 is the project itself. The graph may be cyclic; it is never
/// mutated once built, only compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
}

impl DependencyGraph {
    /// Creates a graph holding only the root project node.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            nodes: vec![DependencyNode {
                name: name.into(),
                version: version.into(),
                children: Vec::new(),
            }],
        }
    }

    /// Index of the root node.
    #[must_use]
    pub const fn root(&self) -> usize {
        0
    }

    /// Adds a package node and returns its index.
    pub fn add_node(&mut self, name: impl Into<String>, version: impl Into<String>) -> usize {
        self.nodes.push(DependencyNode {
            name: name.into(),
            version: version.into(),
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Records that `from` depends on `to`.
    ///
    /// # Panics
    ///
    /// Panics if `from` is not a valid node index.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        let children = &mut self.nodes[from].children;
        if !children.contains(&to) {
            children.push(to);
        }
    }

    /// Returns the node at `index`.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&DependencyNode> {
        self.nodes.get(index)
    }

    /// Number of nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the graph holds only the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Every `(name, version)` reachable from the root, excluding the root.
    #[must_use]
    pub fn flatten(&self) -> BTreeSet<(String, String)> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.root()];
        let mut flat = BTreeSet::new();

        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            let node = &self.nodes[index];
            if index != self.root() {
                flat.insert((node.name.clone(), node.version.clone()));
            }
            stack.extend(node.children.iter().copied());
        }
        flat
    }

    /// Names of packages present in `self` at a version `other` does not have.
    ///
    /// Only additions relative to `other` show up; call it both ways to
    /// catch removals.
    #[must_use]
    pub fn diff(&self, other: &Self) -> BTreeSet<String> {
        let theirs = other.flatten();
        self.flatten()
            .into_iter()
            .filter(|entry| !theirs.contains(entry))
            .map(|(name, _)| name)
            .collect()
    }
}

/// Names of packages that were added, removed, or changed version between
/// two graphs.
#[must_use]
pub fn changed_dependency_names(head: &DependencyGraph, base: &DependencyGraph) -> BTreeSet<String> {
    let mut names = head.diff(base);
    names.extend(base.diff(head));
    names
}
