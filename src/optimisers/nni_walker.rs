use log::debug;

use crate::likelihood::{BranchRefiner, LikelihoodEngine};
use crate::optimisers::{evaluate_nni_moves, NniConfig, NniMove};
use crate::tree::Tree;
use crate::Result;

/// Evaluates both NNIs at every internal branch, walking the tree depth first from the start
/// leaf, and stores them in `moves` in walk order.
///
/// `moves` is cleared first and ends up holding `2 * (n - 3)` moves for `n` leaves. Returns
/// the number of branches with at least one improving move.
pub fn evaluate_all_nnis<E>(
    tree: &mut Tree,
    engine: &mut E,
    cur_logl: f64,
    config: &NniConfig,
    moves: &mut Vec<NniMove>,
) -> Result<usize>
where
    E: LikelihoodEngine + BranchRefiner + Clone + Send + Sync,
{
    let pivots = tree.internal_edges();
    moves.clear();
    moves.reserve(2 * pivots.len());

    cfg_if::cfg_if! {
    if #[cfg(feature = "par-nni")] {
        use rayon::prelude::*;
        let shared_tree: &Tree = tree;
        let shared_engine: &E = engine;
        let evaluated = pivots
            .par_iter()
            .map(|pivot| {
                let mut tree = shared_tree.clone();
                let mut engine = shared_engine.clone();
                evaluate_nni_moves(&mut tree, &mut engine, *pivot, cur_logl, config)
            })
            .collect::<Result<Vec<_>>>()?;
    } else {
        let evaluated = pivots
            .iter()
            .map(|pivot| evaluate_nni_moves(tree, engine, *pivot, cur_logl, config))
            .collect::<Result<Vec<_>>>()?;
    }
    }

    let mut improving_edges = 0;
    for (pair, improving) in evaluated {
        moves.extend(pair);
        if improving {
            improving_edges += 1;
        }
    }
    debug_assert_eq!(moves.len(), 2 * tree.leaf_count().saturating_sub(3));
    debug!(
        "Evaluated {} NNIs, {} branch(es) improving",
        moves.len(),
        improving_edges
    );
    Ok(improving_edges)
}
