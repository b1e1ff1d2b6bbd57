use std::num::NonZeroUsize;

use log::{debug, info};

use crate::likelihood::{BranchRefiner, LikelihoodEngine};
use crate::optimisers::{NniOptimiser, PhyloOptimisationResult};
use crate::partitions::Partitions;
use crate::tree::Tree;
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub enum TopologyOptimiserPredicate {
    GtEpsilon(f64),
    FixedIter(NonZeroUsize),
    // `fn` pointers keep the predicate `Copy`, closures capturing state are not supported.
    Custom(fn(usize, f64) -> bool),
}

impl TopologyOptimiserPredicate {
    fn test(&self, iteration: usize, delta: f64) -> bool {
        use TopologyOptimiserPredicate::*;
        match *self {
            GtEpsilon(min_delta) => delta > min_delta,
            FixedIter(max) => max.get() > iteration,
            Custom(pred) => pred(iteration, delta),
        }
    }
    pub fn gt_epsilon(epsilon: f64) -> Self {
        Self::GtEpsilon(epsilon)
    }
    pub fn fixed_iter(num: NonZeroUsize) -> Self {
        Self::FixedIter(num)
    }
    pub fn custom(pred: fn(usize, f64) -> bool) -> Self {
        Self::Custom(pred)
    }
}

impl NniOptimiser {
    /// Repeats NNI rounds while they apply moves and the predicate holds.
    ///
    /// # Example
    /// ```rust
    /// # fn main() -> std::result::Result<(), anyhow::Error> {
    /// use nni_search::alignment::Alignment;
    /// use nni_search::likelihood::SubstitutionLikelihood;
    /// use nni_search::optimisers::{NniConfig, NniOptimiser};
    /// use nni_search::partitions::Partitions;
    /// use nni_search::phylo_info::PhyloInfo;
    /// use nni_search::substitution_models::{DNAModelType, SubstModel};
    /// use nni_search::{record, tree};
    ///
    /// let msa = Alignment::new(vec![
    ///     record!("A", b"GGGGAAAA"),
    ///     record!("B", b"TTTTAAAA"),
    ///     record!("C", b"GGGGAAAA"),
    ///     record!("D", b"TTTTCCCC"),
    ///     record!("E", b"TTTTCCCC"),
    /// ])?;
    /// let info = PhyloInfo { msa, tree: tree!("((A,B),C,(D,E));") };
    /// let partitions = Partitions::single(info.msa_length());
    /// let model = SubstModel::new(DNAModelType::K80, &[], &[2.0])?;
    /// let mut engine = SubstitutionLikelihood::new(model, partitions.clone(), &info)?;
    /// let mut tree = info.tree.clone();
    ///
    /// let result = NniOptimiser::new(NniConfig::default()).run(&mut tree, &mut engine, &partitions)?;
    /// assert!(result.final_logl > result.initial_logl);
    /// assert!(result.moves_applied >= 1);
    /// # Ok(()) }
    /// ```
    pub fn run<E>(
        &mut self,
        tree: &mut Tree,
        engine: &mut E,
        partitions: &Partitions,
    ) -> Result<PhyloOptimisationResult>
    where
        E: LikelihoodEngine + BranchRefiner + Clone + Send + Sync,
    {
        info!(
            "Optimising tree topology with NNIs, {} branch length optimisation",
            self.config.blen_opt
        );
        let initial_logl = engine.evaluate(tree, tree.start_edge());
        info!("Initial logl: {initial_logl}");
        debug!("Initial tree: \n{tree}");

        let mut curr_logl = initial_logl;
        let mut prev_logl = f64::NEG_INFINITY;
        let mut iterations = 0;
        let mut moves_applied = 0;
        while self.predicate.test(iterations, curr_logl - prev_logl) {
            iterations += 1;
            prev_logl = curr_logl;
            let round = self.run_local_search(tree, engine, partitions, curr_logl)?;
            if round.moves_applied == 0 {
                break;
            }
            curr_logl = round.final_logl;
            moves_applied += round.moves_applied;
            info!(
                "Round {}: {} NNI(s), logl {:.5}",
                iterations, round.moves_applied, curr_logl
            );
            debug!("Tree after round {}: \n{}", iterations, tree);
        }
        info!("Done optimising tree topology");
        info!("Final logl: {curr_logl}, achieved in {iterations} round(s)");
        Ok(PhyloOptimisationResult {
            initial_logl,
            final_logl: curr_logl,
            iterations,
            moves_applied,
        })
    }
}
