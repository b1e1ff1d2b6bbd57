use log::{debug, info};

use crate::likelihood::{BranchRefiner, LikelihoodEngine};
use crate::optimisers::PhyloOptimisationResult;
use crate::tree::Tree;
use crate::Result;

/// Smooths all branch lengths of a tree by refining one branch at a time.
#[derive(Debug, Clone, Copy)]
pub struct BranchOptimiser {
    pub(crate) epsilon: f64,
    pub(crate) max_iterations: usize,
}

impl Default for BranchOptimiser {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchOptimiser {
    pub fn new() -> Self {
        BranchOptimiser {
            epsilon: 1e-3,
            max_iterations: 10,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sweeps over all branches until a full pass gains less than `epsilon`.
    pub fn run<E: LikelihoodEngine + BranchRefiner>(
        &self,
        tree: &mut Tree,
        engine: &mut E,
    ) -> Result<PhyloOptimisationResult> {
        info!("Optimising branch lengths.");
        let initial_logl = engine.evaluate(tree, tree.start_edge());
        info!("Initial logl: {}.", initial_logl);

        let mut curr_logl = initial_logl;
        let mut prev_logl = f64::NEG_INFINITY;
        let mut iterations = 0;
        let branches = tree.edges();
        while (curr_logl - prev_logl) > self.epsilon {
            iterations += 1;
            debug!("Iteration: {}", iterations);
            prev_logl = curr_logl;
            for &branch in &branches {
                let blens = engine.refine(tree, branch, self.max_iterations)?;
                debug!("Optimised {} branch length to {:.5?}", branch, blens);
            }
            curr_logl = engine.evaluate(tree, tree.start_edge());
        }
        info!(
            "Final logl: {}, achieved in {} iteration(s).",
            curr_logl, iterations
        );
        Ok(PhyloOptimisationResult {
            initial_logl,
            final_logl: curr_logl,
            iterations,
            moves_applied: 0,
        })
    }
}
