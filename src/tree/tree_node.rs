use std::fmt::{Debug, Display};

use crate::partitions::BranchLengths;
use crate::tree::NodeIdx::{self, Internal as Int, Leaf};

/// One directed side of a branch: the `slot`-th link of `node`.
///
/// Internal nodes own three half-edges (slots 0, 1, 2) that form a cycle under
/// [`crate::tree::Tree::next`], leaves own a single one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalfEdge {
    pub node: NodeIdx,
    pub slot: usize,
}

impl HalfEdge {
    pub fn new(node: NodeIdx, slot: usize) -> Self {
        Self { node, slot }
    }
}

impl Display for HalfEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.node, self.slot)
    }
}

/// Connection stored on one side of a branch, the other side holds the mirror image.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Link {
    pub(crate) to: HalfEdge,
    pub(crate) blens: BranchLengths,
}

#[derive(Clone, PartialEq)]
pub struct Node {
    pub idx: NodeIdx,
    pub id: String,
    pub(crate) links: Vec<Link>,
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.idx)
        } else {
            write!(f, "{} with id {}", self.idx, self.id)
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let neighbours: Vec<_> = self
            .links
            .iter()
            .map(|l| (l.to.node, l.blens.clone()))
            .collect();
        if self.id.is_empty() {
            writeln!(f, "{:?}, neighbours: {:?}", self.idx, neighbours)
        } else {
            writeln!(f, "({}) {:?}, neighbours: {:?}", self.id, self.idx, neighbours)
        }
    }
}

impl Node {
    pub(crate) fn new_leaf(idx: usize, id: String) -> Self {
        Self {
            idx: Leaf(idx),
            id,
            links: Vec::with_capacity(1),
        }
    }

    pub(crate) fn new_internal(idx: usize, id: String) -> Self {
        Self {
            idx: Int(idx),
            id,
            links: Vec::with_capacity(3),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.idx, Leaf(_))
    }

    pub fn degree(&self) -> usize {
        self.links.len()
    }

    /// Indices of the adjacent nodes in slot order.
    pub fn neighbours(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.links.iter().map(|l| l.to.node)
    }
}
