use fixedbitset::FixedBitSet;
use log::debug;

use crate::f64_h;
use crate::optimisers::NniMove;

/// Greedily picks mutually non-conflicting moves among the `improving_edges` best ones.
///
/// Moves are ranked by likelihood with a stable sort, the best move always comes first and
/// the rest follow in descending likelihood. No two selected moves share a node. Returns an
/// empty selection when nothing improves.
pub fn select_independent_moves(moves: &[NniMove], improving_edges: usize) -> Vec<NniMove> {
    if improving_edges == 0 || moves.is_empty() {
        return Vec::new();
    }
    let mut ranked: Vec<&NniMove> = moves.iter().collect();
    ranked.sort_by_key(|m| f64_h::from(m.logl));

    let mut used = FixedBitSet::new();
    let mut selected: Vec<NniMove> = Vec::new();
    for candidate in ranked.into_iter().rev().take(improving_edges) {
        let ends = [
            usize::from(candidate.pivot.node),
            usize::from(candidate.partner.node),
        ];
        if ends.iter().any(|&i| used.contains(i)) {
            continue;
        }
        for i in ends {
            used.grow(i + 1);
            used.insert(i);
        }
        selected.push(candidate.clone());
    }
    debug_assert!(selected
        .iter()
        .enumerate()
        .all(|(i, a)| selected[i + 1..].iter().all(|b| !a.conflicts(b))));
    debug!(
        "Selected {} non-conflicting NNI(s) out of {} improving branch(es)",
        selected.len(),
        improving_edges
    );
    selected
}
