use std::fmt;

use anyhow::bail;
use log::debug;

use crate::likelihood::{BranchRefiner, LikelihoodEngine};
use crate::optimisers::{BlenOptimisation, NniConfig};
use crate::partitions::BranchLengths;
use crate::tree::{HalfEdge, NodeIdx::Leaf, TopologyError, Tree};
use crate::Result;

/// Which of the two subtrees at the pivot node gets exchanged with the first subtree at its
/// partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NniSwap {
    First,
    Second,
}

impl fmt::Display for NniSwap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NniSwap::First => write!(f, "first"),
            NniSwap::Second => write!(f, "second"),
        }
    }
}

/// A scored candidate NNI at the internal branch `pivot`–`partner`.
///
/// `blens` holds the lengths of the five branches around the pivot after the exchange, in
/// the order of [`five_branches`].
#[derive(Debug, Clone, PartialEq)]
pub struct NniMove {
    pub pivot: HalfEdge,
    pub partner: HalfEdge,
    pub swap: NniSwap,
    pub blens: [BranchLengths; 5],
    pub logl: f64,
}

impl NniMove {
    /// Two moves conflict when their pivot branches share a node.
    pub fn conflicts(&self, other: &NniMove) -> bool {
        let nodes = [self.pivot.node, self.partner.node];
        nodes.contains(&other.pivot.node) || nodes.contains(&other.partner.node)
    }

    /// Re-applies the exchange on a tree with the topology the move was scored on and
    /// installs the recorded branch lengths.
    pub fn apply(&self, tree: &mut Tree) {
        exchange(tree, self.pivot, self.swap);
        for (h, blens) in five_branches(tree, self.pivot).into_iter().zip(&self.blens) {
            tree.set_blens(h, blens);
        }
    }
}

impl fmt::Display for NniMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} NNI at {} - {}, logl {:.5}",
            self.swap, self.pivot, self.partner, self.logl
        )
    }
}

/// The pivot branch followed by the two other branches at the pivot node and the two other
/// branches at its partner.
pub fn five_branches(tree: &Tree, pivot: HalfEdge) -> [HalfEdge; 5] {
    let partner = tree.back(pivot);
    let p1 = tree.next(pivot);
    let q1 = tree.next(partner);
    [pivot, p1, tree.next(p1), q1, tree.next(q1)]
}

/// Exchanges a subtree of the pivot node with a subtree of its partner, branch lengths move
/// along with their subtrees. Exchanging twice restores the tree.
pub(crate) fn exchange(tree: &mut Tree, pivot: HalfEdge, swap: NniSwap) {
    let partner = tree.back(pivot);
    let own = match swap {
        NniSwap::First => tree.next(pivot),
        NniSwap::Second => tree.next(tree.next(pivot)),
    };
    let other = tree.next(partner);
    tree.swap_subtrees(own, other);
}

/// Scores both NNIs at the internal branch of `pivot` and leaves the tree exactly as it was.
///
/// Returns the two moves and whether one of them beats `cur_logl` by more than
/// `config.epsilon`.
pub fn evaluate_nni_moves<E: LikelihoodEngine + BranchRefiner>(
    tree: &mut Tree,
    engine: &mut E,
    pivot: HalfEdge,
    cur_logl: f64,
    config: &NniConfig,
) -> Result<([NniMove; 2], bool)> {
    let partner = tree.back(pivot);
    if matches!(pivot.node, Leaf(_)) || matches!(partner.node, Leaf(_)) {
        bail!(TopologyError::LeafPivot { pivot });
    }
    let branches = five_branches(tree, pivot);
    let saved = branches.map(|h| tree.blens(h).clone());

    let first = evaluate_swap(tree, engine, pivot, NniSwap::First, &saved, config)?;
    let second = evaluate_swap(tree, engine, pivot, NniSwap::Second, &saved, config)?;
    let improving = first.logl > cur_logl + config.epsilon || second.logl > cur_logl + config.epsilon;
    debug!(
        "NNIs at {}: logl {:.5} and {:.5}, current {:.5}",
        pivot, first.logl, second.logl, cur_logl
    );
    Ok(([first, second], improving))
}

fn evaluate_swap<E: LikelihoodEngine + BranchRefiner>(
    tree: &mut Tree,
    engine: &mut E,
    pivot: HalfEdge,
    swap: NniSwap,
    saved: &[BranchLengths; 5],
    config: &NniConfig,
) -> Result<NniMove> {
    let partner = tree.back(pivot);
    let branches = five_branches(tree, pivot);
    exchange(tree, pivot, swap);
    let scored = score_exchanged(tree, engine, &branches, config);
    let blens = branches.map(|h| tree.blens(h).clone());

    exchange(tree, pivot, swap);
    for (h, blens) in branches.into_iter().zip(saved) {
        tree.set_blens(h, blens);
    }
    Ok(NniMove {
        pivot,
        partner,
        swap,
        blens,
        logl: scored?,
    })
}

fn score_exchanged<E: LikelihoodEngine + BranchRefiner>(
    tree: &mut Tree,
    engine: &mut E,
    branches: &[HalfEdge; 5],
    config: &NniConfig,
) -> Result<f64> {
    let pivot = branches[0];
    engine.update_partials(tree, pivot);
    engine.update_partials(tree, tree.back(pivot));
    match config.blen_opt {
        BlenOptimisation::Fixed => Ok(engine.evaluate(tree, pivot)),
        BlenOptimisation::Single => {
            engine.refine(tree, pivot, config.max_nr_iterations)?;
            Ok(engine.evaluate(tree, pivot))
        }
        BlenOptimisation::Five => {
            engine.refine(tree, pivot, config.max_nr_iterations)?;
            for &h in &branches[1..] {
                engine.update_partials(tree, h);
                engine.refine(tree, h, config.max_nr_iterations)?;
            }
            Ok(engine.evaluate(tree, branches[4]))
        }
    }
}
