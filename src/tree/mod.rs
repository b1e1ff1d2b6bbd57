use std::error::Error;
use std::fmt::{self, Display};

use anyhow::bail;
use fixedbitset::FixedBitSet;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use rand::Rng;

use crate::partitions::BranchLengths;
use crate::Result;

pub mod tree_node;
pub mod tree_parser;
pub use tree_node::*;
use NodeIdx::{Internal as Int, Leaf};

/// Branch length used when the input does not provide one.
pub const DEFAULT_BLEN: f64 = 0.1;
pub const MIN_BLEN: f64 = 1e-6;
pub const MAX_BLEN: f64 = 100.0;

#[derive(Debug, PartialEq, Clone, Copy, PartialOrd, Eq, Ord, Hash)]
pub enum NodeIdx {
    Internal(usize),
    Leaf(usize),
}

impl From<NodeIdx> for usize {
    fn from(node_idx: NodeIdx) -> usize {
        match node_idx {
            Int(idx) => idx,
            Leaf(idx) => idx,
        }
    }
}

impl From<&NodeIdx> for usize {
    fn from(node_idx: &NodeIdx) -> usize {
        usize::from(*node_idx)
    }
}

impl Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int(idx) => write!(f, "Internal node {}", idx),
            Leaf(idx) => write!(f, "Leaf node {}", idx),
        }
    }
}

/// Structural problems with a tree or with a request made against it.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyError {
    LeafPivot { pivot: HalfEdge },
    PartitionMismatch { expected: usize, found: usize },
    SnapshotMismatch { expected: usize, found: usize },
    BrokenLink { half_edge: HalfEdge },
    InvalidBranchLength { half_edge: HalfEdge, value: f64 },
    NonBinary { node: String, children: usize },
    TooFewTaxa(usize),
    DuplicateLeaf(String),
    UnnamedLeaf,
    UnknownLeaf(String),
    Disconnected,
}

impl Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TopologyError::*;
        match self {
            LeafPivot { pivot } => write!(
                f,
                "NNI pivot edge at {} must join two internal nodes, found a leaf endpoint",
                pivot
            ),
            PartitionMismatch { expected, found } => write!(
                f,
                "Branch length vectors hold {} value(s), the partitioning requires {}",
                found, expected
            ),
            SnapshotMismatch { expected, found } => write!(
                f,
                "Snapshot of a tree with {} nodes cannot restore a tree with {} nodes",
                found, expected
            ),
            BrokenLink { half_edge } => write!(f, "Inconsistent link at {}", half_edge),
            InvalidBranchLength { half_edge, value } => {
                write!(f, "Invalid branch length {} at {}", value, half_edge)
            }
            NonBinary { node, children } => write!(
                f,
                "Only binary trees are supported, node '{}' has {} children",
                node, children
            ),
            TooFewTaxa(n) => write!(f, "A tree needs at least three taxa, found {}", n),
            DuplicateLeaf(id) => write!(f, "Duplicate leaf id '{}'", id),
            UnnamedLeaf => write!(f, "All leaves must be named"),
            UnknownLeaf(id) => write!(f, "Leaf '{}' is not part of the tree", id),
            Disconnected => write!(f, "The tree is not connected"),
        }
    }
}

impl Error for TopologyError {}

/// Unrooted binary tree stored as an arena of nodes joined by half-edges.
///
/// Leaves occupy arena positions `0..n`, internal nodes `n..2n - 2`. Every
/// branch is stored twice, once per direction, and both copies always carry
/// the same branch length vector.
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n: usize,
    pub(crate) start: NodeIdx,
    pub(crate) leaf_ids: HashMap<String, NodeIdx>,
    pub(crate) num_branches: usize,
    revision: u64,
}

/// Deep copy of the topology and all branch lengths of a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSnapshot {
    links: Vec<Vec<Link>>,
    num_branches: usize,
}

impl Tree {
    pub(crate) fn from_nodes(nodes: Vec<Node>, n: usize) -> Result<Self> {
        if n < 3 {
            bail!(TopologyError::TooFewTaxa(n));
        }
        let mut leaf_ids = HashMap::with_capacity(n);
        for node in &nodes[..n] {
            if node.id.is_empty() {
                bail!(TopologyError::UnnamedLeaf);
            }
            if leaf_ids.insert(node.id.clone(), node.idx).is_some() {
                bail!(TopologyError::DuplicateLeaf(node.id.clone()));
            }
        }
        let num_branches = nodes[0].links.first().map_or(1, |l| l.blens.len());
        let tree = Self {
            nodes,
            n,
            start: Leaf(0),
            leaf_ids,
            num_branches,
            revision: 0,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Builds a random unrooted binary tree over `ids` by inserting the leaves one by one
    /// on uniformly chosen branches. All branches get [`DEFAULT_BLEN`].
    pub fn random(ids: &[String], rng: &mut impl Rng) -> Result<Self> {
        let n = ids.len();
        if n < 3 {
            bail!(TopologyError::TooFewTaxa(n));
        }
        let mut nodes: Vec<Node> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| Node::new_leaf(i, id.clone()))
            .collect();
        let mut centre = Node::new_internal(n, String::new());
        for (slot, leaf) in nodes.iter_mut().take(3).enumerate() {
            leaf.links.push(Link {
                to: HalfEdge::new(Int(n), slot),
                blens: vec![DEFAULT_BLEN],
            });
            centre.links.push(Link {
                to: HalfEdge::new(leaf.idx, 0),
                blens: vec![DEFAULT_BLEN],
            });
        }
        nodes.push(centre);

        for leaf in 3..n {
            let edges: Vec<HalfEdge> = nodes
                .iter()
                .flat_map(|node| {
                    node.links
                        .iter()
                        .enumerate()
                        .map(move |(slot, link)| (HalfEdge::new(node.idx, slot), link.to))
                })
                .filter(|(h, to)| h < to)
                .map(|(h, _)| h)
                .collect();
            let h = edges[rng.gen_range(0..edges.len())];
            let hb = nodes[usize::from(h.node)].links[h.slot].to;
            let half = nodes[usize::from(h.node)].links[h.slot].blens[0] / 2.0;

            let w = Int(nodes.len());
            let mut inserted = Node::new_internal(nodes.len(), String::new());
            inserted.links = vec![
                Link {
                    to: h,
                    blens: vec![half],
                },
                Link {
                    to: hb,
                    blens: vec![half],
                },
                Link {
                    to: HalfEdge::new(Leaf(leaf), 0),
                    blens: vec![DEFAULT_BLEN],
                },
            ];
            nodes[usize::from(h.node)].links[h.slot] = Link {
                to: HalfEdge::new(w, 0),
                blens: vec![half],
            };
            nodes[usize::from(hb.node)].links[hb.slot] = Link {
                to: HalfEdge::new(w, 1),
                blens: vec![half],
            };
            nodes[leaf].links.push(Link {
                to: HalfEdge::new(w, 2),
                blens: vec![DEFAULT_BLEN],
            });
            nodes.push(inserted);
        }
        Self::from_nodes(nodes, n)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.n
    }

    /// Number of values stored per branch, one per partition or a single shared one.
    pub fn num_branches(&self) -> usize {
        self.num_branches
    }

    /// Counter bumped by every mutation, lets likelihood engines detect stale caches.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The leaf from which traversals start.
    pub fn start(&self) -> NodeIdx {
        self.start
    }

    pub fn start_edge(&self) -> HalfEdge {
        HalfEdge::new(self.start, 0)
    }

    pub fn node(&self, idx: &NodeIdx) -> &Node {
        &self.nodes[usize::from(idx)]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> &[Node] {
        &self.nodes[..self.n]
    }

    pub fn internals(&self) -> &[Node] {
        &self.nodes[self.n..]
    }

    pub fn idx(&self, id: &str) -> Result<NodeIdx> {
        match self.leaf_ids.get(id) {
            Some(idx) => Ok(*idx),
            None => bail!(TopologyError::UnknownLeaf(id.to_string())),
        }
    }

    pub fn node_id(&self, idx: &NodeIdx) -> &str {
        &self.node(idx).id
    }

    /// Leaf ids in arena order.
    pub fn leaf_ids(&self) -> Vec<String> {
        self.leaves().iter().map(|node| node.id.clone()).collect()
    }

    pub fn back(&self, half_edge: HalfEdge) -> HalfEdge {
        self.link(half_edge).to
    }

    /// Cyclic successor of `half_edge` at the same node.
    pub fn next(&self, half_edge: HalfEdge) -> HalfEdge {
        let degree = self.node(&half_edge.node).degree();
        HalfEdge::new(half_edge.node, (half_edge.slot + 1) % degree)
    }

    pub fn neighbour(&self, half_edge: HalfEdge) -> NodeIdx {
        self.link(half_edge).to.node
    }

    pub fn blens(&self, half_edge: HalfEdge) -> &BranchLengths {
        &self.link(half_edge).blens
    }

    /// All half-edges owned by `node`, in slot order.
    pub fn half_edges(&self, node: &NodeIdx) -> impl Iterator<Item = HalfEdge> + '_ {
        let node = *node;
        (0..self.node(&node).degree()).map(move |slot| HalfEdge::new(node, slot))
    }

    /// The half-edge at `from` pointing to `to`, if the two nodes are adjacent.
    pub fn half_edge(&self, from: &NodeIdx, to: &NodeIdx) -> Option<HalfEdge> {
        self.half_edges(from).find(|h| self.neighbour(*h) == *to)
    }

    pub fn is_internal_edge(&self, half_edge: HalfEdge) -> bool {
        matches!(half_edge.node, Int(_)) && matches!(self.neighbour(half_edge), Int(_))
    }

    /// Every branch once, as the half-edge with the smaller index.
    pub fn edges(&self) -> Vec<HalfEdge> {
        self.nodes
            .iter()
            .flat_map(|node| self.half_edges(&node.idx))
            .filter(|h| *h < self.back(*h))
            .collect()
    }

    /// Every internal branch once, in depth-first order away from the start leaf.
    ///
    /// Each branch is reported as the half-edge on the side away from the start leaf,
    /// pointing back towards it. A tree with `n` leaves has `n - 3` internal branches.
    pub fn internal_edges(&self) -> Vec<HalfEdge> {
        let root_edge = self.back(self.start_edge());
        let mut edges = Vec::with_capacity(self.n.saturating_sub(3));
        let mut stack = Vec::with_capacity(self.n);

        let mut q = self.next(root_edge);
        let mut children = Vec::with_capacity(2);
        while q != root_edge {
            children.push(self.back(q));
            q = self.next(q);
        }
        stack.extend(children.into_iter().rev());

        while let Some(p) = stack.pop() {
            if matches!(p.node, Leaf(_)) {
                continue;
            }
            edges.push(p);
            let first = self.next(p);
            let second = self.next(first);
            stack.push(self.back(second));
            stack.push(self.back(first));
        }
        edges
    }

    fn link(&self, half_edge: HalfEdge) -> &Link {
        &self.nodes[usize::from(half_edge.node)].links[half_edge.slot]
    }

    fn link_mut(&mut self, half_edge: HalfEdge) -> &mut Link {
        &mut self.nodes[usize::from(half_edge.node)].links[half_edge.slot]
    }

    /// Joins `a` and `b` into one branch carrying `blens` in both directions.
    pub(crate) fn hookup(&mut self, a: HalfEdge, b: HalfEdge, blens: &[f64]) {
        *self.link_mut(a) = Link {
            to: b,
            blens: blens.to_vec(),
        };
        *self.link_mut(b) = Link {
            to: a,
            blens: blens.to_vec(),
        };
        self.revision += 1;
        debug_assert!(self.check_link(a));
    }

    /// Sets the length vector of the branch containing `half_edge`, on both sides.
    pub fn set_blens(&mut self, half_edge: HalfEdge, blens: &[f64]) {
        debug_assert_eq!(blens.len(), self.num_branches);
        let back = self.back(half_edge);
        self.link_mut(half_edge).blens.copy_from_slice(blens);
        self.link_mut(back).blens.copy_from_slice(blens);
        self.revision += 1;
        debug_assert!(self.check_link(half_edge));
    }

    /// Exchanges the subtrees hanging off `a` and `c`, each keeping its own branch length.
    ///
    /// Applying the same exchange twice restores the original tree.
    pub(crate) fn swap_subtrees(&mut self, a: HalfEdge, c: HalfEdge) {
        debug_assert_ne!(a.node, c.node);
        let a_back = self.back(a);
        let c_back = self.back(c);
        let a_blens = self.blens(a).clone();
        let c_blens = self.blens(c).clone();
        self.hookup(a, c_back, &c_blens);
        self.hookup(c, a_back, &a_blens);
        debug_assert!(self.check_link(a) && self.check_link(c));
    }

    /// Both directions of the branch at `half_edge` point at each other and agree on length.
    pub(crate) fn check_link(&self, half_edge: HalfEdge) -> bool {
        let back = self.back(half_edge);
        let Some(partner) = self.nodes.get(usize::from(back.node)) else {
            return false;
        };
        back.slot < partner.degree()
            && self.back(back) == half_edge
            && self.blens(back) == self.blens(half_edge)
            && self.blens(half_edge).len() == self.num_branches
    }

    /// Checks node degrees, link symmetry, branch lengths and connectivity.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            let expected = if node.is_leaf() { 1 } else { 3 };
            if node.degree() != expected {
                bail!(TopologyError::NonBinary {
                    node: node.to_string(),
                    children: node.degree().saturating_sub(1),
                });
            }
            for h in self.half_edges(&node.idx) {
                if !self.check_link(h) {
                    bail!(TopologyError::BrokenLink { half_edge: h });
                }
                if let Some(&value) = self.blens(h).iter().find(|b| !(**b > 0.0 && b.is_finite()))
                {
                    bail!(TopologyError::InvalidBranchLength {
                        half_edge: h,
                        value
                    });
                }
            }
        }
        let mut seen = FixedBitSet::with_capacity(self.nodes.len());
        let mut stack = vec![self.start];
        while let Some(node) = stack.pop() {
            if seen.put(usize::from(node)) {
                continue;
            }
            stack.extend(self.node(&node).neighbours());
        }
        if seen.count_ones(..) != self.nodes.len() {
            bail!(TopologyError::Disconnected);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            links: self.nodes.iter().map(|node| node.links.clone()).collect(),
            num_branches: self.num_branches,
        }
    }

    /// Resets topology and branch lengths to the state captured in `snapshot`.
    pub fn restore(&mut self, snapshot: &TreeSnapshot) -> Result<()> {
        if snapshot.links.len() != self.nodes.len() {
            bail!(TopologyError::SnapshotMismatch {
                expected: self.nodes.len(),
                found: snapshot.links.len(),
            });
        }
        for (node, links) in self.nodes.iter_mut().zip(&snapshot.links) {
            node.links.clone_from(links);
        }
        self.num_branches = snapshot.num_branches;
        self.revision += 1;
        debug_assert!(self.validate().is_ok());
        Ok(())
    }

    /// Broadcasts single branch lengths to `num_branches` values per branch.
    pub fn resize_branch_lengths(&mut self, num_branches: usize) -> Result<()> {
        if num_branches == self.num_branches {
            return Ok(());
        }
        if self.num_branches != 1 {
            bail!(TopologyError::PartitionMismatch {
                expected: num_branches,
                found: self.num_branches,
            });
        }
        for link in self.nodes.iter_mut().flat_map(|node| node.links.iter_mut()) {
            link.blens = vec![link.blens[0]; num_branches];
        }
        self.num_branches = num_branches;
        self.revision += 1;
        Ok(())
    }

    /// Branch length vectors in [`Tree::edges`] order.
    pub fn all_branch_lengths(&self) -> Vec<BranchLengths> {
        self.edges()
            .into_iter()
            .map(|h| self.blens(h).clone())
            .collect()
    }

    /// Sum of the branch lengths of the first partition.
    pub fn total_length(&self) -> f64 {
        self.edges().into_iter().map(|h| self.blens(h)[0]).sum()
    }

    /// Leaves on the `half_edge.node` side of the branch, normalised so that the
    /// start leaf is never part of the set.
    pub fn split(&self, half_edge: HalfEdge) -> FixedBitSet {
        let mut bits = FixedBitSet::with_capacity(self.n);
        let mut stack = Vec::new();
        match half_edge.node {
            Leaf(idx) => bits.insert(idx),
            Int(_) => stack.extend(
                self.half_edges(&half_edge.node)
                    .filter(|h| *h != half_edge)
                    .map(|h| self.back(h)),
            ),
        }
        while let Some(h) = stack.pop() {
            match h.node {
                Leaf(idx) => bits.insert(idx),
                Int(_) => {
                    let first = self.next(h);
                    stack.push(self.back(first));
                    stack.push(self.back(self.next(first)));
                }
            }
        }
        normalise_split(&mut bits, usize::from(self.start));
        bits
    }

    /// Non-trivial splits of the tree, one per internal branch.
    pub fn splits(&self) -> HashSet<FixedBitSet> {
        self.internal_edges()
            .into_iter()
            .map(|h| self.split(h))
            .collect()
    }

    /// Robinson-Foulds distance to a tree over the same leaf set.
    pub fn robinson_foulds(&self, other: &Tree) -> Result<usize> {
        if self.n != other.n {
            bail!(
                "Trees over {} and {} leaves cannot be compared",
                self.n,
                other.n
            );
        }
        let mapping = other
            .leaves()
            .iter()
            .map(|leaf| self.idx(&leaf.id).map(usize::from))
            .collect::<Result<Vec<_>>>()?;
        let own = self.splits();
        let mapped: HashSet<FixedBitSet> = other
            .splits()
            .into_iter()
            .map(|split| {
                let mut bits = FixedBitSet::with_capacity(self.n);
                split.ones().for_each(|i| bits.insert(mapping[i]));
                normalise_split(&mut bits, usize::from(self.start));
                bits
            })
            .collect();
        Ok(own.symmetric_difference(&mapped).count())
    }

    /// Newick representation rooted at the internal neighbour of the start leaf.
    /// Only the first partition's branch lengths are written.
    pub fn to_newick(&self) -> String {
        let root = self.back(self.start_edge()).node;
        let children = self
            .half_edges(&root)
            .map(|h| self.subtree_newick(self.back(h)))
            .join(",");
        format!("({}){};", children, self.node_id(&root))
    }

    fn subtree_newick(&self, towards_root: HalfEdge) -> String {
        let node = self.node(&towards_root.node);
        let label = if node.is_leaf() {
            node.id.clone()
        } else {
            let first = self.next(towards_root);
            let second = self.next(first);
            format!(
                "({},{}){}",
                self.subtree_newick(self.back(first)),
                self.subtree_newick(self.back(second)),
                node.id
            )
        };
        format!("{}:{}", label, self.blens(towards_root)[0])
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_newick())
    }
}

fn normalise_split(bits: &mut FixedBitSet, anchor: usize) {
    if bits.contains(anchor) {
        bits.toggle_range(..);
    }
}

#[cfg(test)]
mod tree_tests;
