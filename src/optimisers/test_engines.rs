use fixedbitset::FixedBitSet;

use crate::likelihood::{BranchRefiner, LikelihoodEngine};
use crate::partitions::BranchLengths;
use crate::tree::{HalfEdge, Tree};
use crate::Result;

/// Scores a tree by the splits it contains, ignoring branch lengths.
#[derive(Debug, Clone, Default)]
pub(crate) struct SplitScore {
    base: f64,
    weights: Vec<(FixedBitSet, f64)>,
    // Added when none of the listed splits is present.
    joint_absence: Option<(Vec<FixedBitSet>, f64)>,
}

/// Leaf set of `ids`, normalised the way [`Tree::split`] normalises splits.
pub(crate) fn split_of(tree: &Tree, ids: &[&str]) -> FixedBitSet {
    let n = tree.leaf_count();
    let mut bits = FixedBitSet::with_capacity(n);
    for id in ids {
        bits.insert(usize::from(tree.idx(id).unwrap()));
    }
    if bits.contains(usize::from(tree.start())) {
        bits.toggle_range(..);
    }
    bits
}

impl SplitScore {
    pub(crate) fn new(base: f64) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    pub(crate) fn weight(mut self, tree: &Tree, ids: &[&str], value: f64) -> Self {
        self.weights.push((split_of(tree, ids), value));
        self
    }

    pub(crate) fn joint_absence(mut self, tree: &Tree, splits: &[&[&str]], value: f64) -> Self {
        let splits = splits.iter().map(|ids| split_of(tree, ids)).collect();
        self.joint_absence = Some((splits, value));
        self
    }

    pub(crate) fn score(&self, tree: &Tree) -> f64 {
        let present = tree.splits();
        let mut score = self.base
            + self
                .weights
                .iter()
                .filter(|(split, _)| present.contains(split))
                .map(|(_, value)| value)
                .sum::<f64>();
        if let Some((splits, value)) = &self.joint_absence {
            if splits.iter().all(|split| !present.contains(split)) {
                score += value;
            }
        }
        score
    }
}

impl LikelihoodEngine for SplitScore {
    fn update_partials(&mut self, _: &Tree, _: HalfEdge) {}

    fn evaluate(&mut self, tree: &Tree, _: HalfEdge) -> f64 {
        self.score(tree)
    }
}

impl BranchRefiner for SplitScore {
    fn refine(&mut self, tree: &mut Tree, edge: HalfEdge, _: usize) -> Result<BranchLengths> {
        Ok(tree.blens(edge).clone())
    }
}

/// Reports a lower score whenever the whole tree is evaluated from the start leaf.
#[derive(Debug, Clone)]
pub(crate) struct StartEdgePenalty {
    pub(crate) inner: SplitScore,
    pub(crate) penalty: f64,
}

impl LikelihoodEngine for StartEdgePenalty {
    fn update_partials(&mut self, _: &Tree, _: HalfEdge) {}

    fn evaluate(&mut self, tree: &Tree, edge: HalfEdge) -> f64 {
        let score = self.inner.score(tree);
        if edge == tree.start_edge() {
            score - self.penalty
        } else {
            score
        }
    }
}

impl BranchRefiner for StartEdgePenalty {
    fn refine(&mut self, tree: &mut Tree, edge: HalfEdge, _: usize) -> Result<BranchLengths> {
        Ok(tree.blens(edge).clone())
    }
}
