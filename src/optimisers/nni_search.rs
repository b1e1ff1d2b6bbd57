use anyhow::bail;
use log::{debug, info, warn};

use crate::likelihood::{BranchRefiner, LikelihoodEngine};
use crate::optimisers::{
    evaluate_all_nnis, select_independent_moves, NniConfig, NniMove, SearchError,
    TopologyOptimiserPredicate,
};
use crate::partitions::Partitions;
use crate::tree::Tree;
use crate::Result;

/// Outcome of one NNI round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NniRoundResult {
    pub initial_logl: f64,
    pub final_logl: f64,
    pub moves_applied: usize,
    pub rolled_back: bool,
}

impl NniRoundResult {
    /// Average likelihood gain per applied move, `None` when the round changed nothing.
    pub fn delta_per_move(&self) -> Option<f64> {
        (self.moves_applied > 0)
            .then(|| (self.final_logl - self.initial_logl) / self.moves_applied as f64)
    }
}

/// NNI local search over an unrooted tree.
///
/// The optimiser owns the move buffer reused across rounds and across calls to
/// [`NniOptimiser::run`], so one instance can serve many trees one after the other.
#[derive(Debug, Clone)]
pub struct NniOptimiser {
    pub(crate) config: NniConfig,
    pub(crate) predicate: TopologyOptimiserPredicate,
    moves: Vec<NniMove>,
}

impl NniOptimiser {
    pub fn new(config: NniConfig) -> Self {
        Self::new_with_pred(config, TopologyOptimiserPredicate::GtEpsilon(config.epsilon))
    }

    pub fn new_with_pred(config: NniConfig, predicate: TopologyOptimiserPredicate) -> Self {
        Self {
            config,
            predicate,
            moves: Vec::new(),
        }
    }

    pub fn config(&self) -> &NniConfig {
        &self.config
    }

    /// Runs one round: scores every NNI, picks a non-conflicting batch of improving ones and
    /// applies it, falling back to the single best move if the batch does not verify.
    ///
    /// `cur_logl` must be the likelihood of `tree` as given. The returned likelihood is never
    /// below it; without improving moves the tree is left alone and no moves are reported.
    ///
    /// # Errors
    /// * [`crate::tree::TopologyError::PartitionMismatch`] if the tree's branch length
    ///   vectors do not fit `partitions`.
    /// * [`SearchError::IrreproducibleMove`] if the best move alone does not reproduce its
    ///   recorded likelihood.
    pub fn run_local_search<E>(
        &mut self,
        tree: &mut Tree,
        engine: &mut E,
        partitions: &Partitions,
        cur_logl: f64,
    ) -> Result<NniRoundResult>
    where
        E: LikelihoodEngine + BranchRefiner + Clone + Send + Sync,
    {
        partitions.check_tree(tree)?;
        let improving_edges =
            evaluate_all_nnis(tree, engine, cur_logl, &self.config, &mut self.moves)?;
        let selected = select_independent_moves(&self.moves, improving_edges);
        if selected.is_empty() {
            info!("No improving NNI found, logl stays at {:.5}", cur_logl);
            return Ok(NniRoundResult {
                initial_logl: cur_logl,
                final_logl: cur_logl,
                moves_applied: 0,
                rolled_back: false,
            });
        }
        apply_and_verify(tree, engine, &selected, cur_logl, &self.config)
    }
}

/// Applies `selected` as one batch and checks the result against the best move, which comes
/// first. A batch scoring below the best move is rolled back and replaced by the best move
/// alone, which must then reproduce its recorded likelihood up to `epsilon`.
pub(crate) fn apply_and_verify<E: LikelihoodEngine>(
    tree: &mut Tree,
    engine: &mut E,
    selected: &[NniMove],
    cur_logl: f64,
    config: &NniConfig,
) -> Result<NniRoundResult> {
    let Some(best) = selected.first() else {
        bail!("Cannot apply an empty NNI batch");
    };
    let snapshot = tree.snapshot();
    let mut batch = selected.len();
    let mut rolled_back = false;
    for step in 1..=config.max_rollback_steps {
        for mv in &selected[..batch] {
            debug!("Applying {}", mv);
            mv.apply(tree);
            engine.update_partials(tree, mv.pivot);
            engine.update_partials(tree, mv.partner);
        }
        let logl = engine.evaluate(tree, tree.start_edge());
        // A batch must reach the best move, the best move alone only has to reproduce it.
        let verified = if batch > 1 {
            logl >= best.logl
        } else {
            logl >= best.logl - config.epsilon
        };
        if verified {
            if rolled_back {
                info!("New logl {:.5} after rolling back", logl);
            }
            info!(
                "Applied {} NNI(s) in {} step(s), logl {:.5} -> {:.5}",
                batch, step, cur_logl, logl
            );
            return Ok(NniRoundResult {
                initial_logl: cur_logl,
                final_logl: logl,
                moves_applied: batch,
                rolled_back,
            });
        }
        if batch == 1 {
            bail!(SearchError::IrreproducibleMove {
                logl,
                expected: best.logl,
            });
        }
        warn!(
            "{} NNIs logl {:.5} below best NNI logl {:.5}, rolling back",
            batch, logl, best.logl
        );
        tree.restore(&snapshot)?;
        rolled_back = true;
        batch = 1;
    }
    bail!(SearchError::RetryBudgetExhausted {
        steps: config.max_rollback_steps,
    })
}
