use std::error::Error;
use std::fmt;

mod blen_optimiser;
pub use blen_optimiser::*;
mod nni_move;
pub use nni_move::*;
mod nni_walker;
pub use nni_walker::*;
mod nni_selection;
pub use nni_selection::*;
mod nni_search;
pub use nni_search::*;
mod topo_optimiser;
pub use topo_optimiser::*;

/// Branch length re-optimisation done while scoring a candidate NNI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlenOptimisation {
    /// Score the rearranged tree with the lengths it already carries.
    Fixed,
    /// Refine the pivot branch only.
    #[default]
    Single,
    /// Refine the pivot branch, then the four branches around it.
    Five,
}

impl fmt::Display for BlenOptimisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlenOptimisation::Fixed => write!(f, "fixed"),
            BlenOptimisation::Single => write!(f, "single branch"),
            BlenOptimisation::Five => write!(f, "five branches"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NniConfig {
    pub blen_opt: BlenOptimisation,
    /// Likelihood gain a move needs to count as improving, also the slack allowed when the
    /// best move alone is checked against its recorded likelihood.
    pub epsilon: f64,
    pub max_nr_iterations: usize,
    /// Upper bound on batch applications per round. A round needs at most two, the batch and
    /// the best move alone after a rollback, so values below 2 make rounds that need a
    /// rollback fail with [`SearchError::RetryBudgetExhausted`] and 0 fails every improving
    /// round.
    pub max_rollback_steps: usize,
}

impl Default for NniConfig {
    fn default() -> Self {
        Self {
            blen_opt: BlenOptimisation::default(),
            epsilon: 1e-3,
            max_nr_iterations: 10,
            max_rollback_steps: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    /// The best move alone scored below its recorded likelihood once applied.
    IrreproducibleMove { logl: f64, expected: f64 },
    RetryBudgetExhausted { steps: usize },
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::IrreproducibleMove { logl, expected } => write!(
                f,
                "New logl {:.4} after applying only the best NNI is below its recorded logl {:.4}",
                logl, expected
            ),
            SearchError::RetryBudgetExhausted { steps } => {
                write!(f, "No NNI batch verified after {} attempts", steps)
            }
        }
    }
}

impl Error for SearchError {}

#[derive(Debug, Clone, PartialEq)]
pub struct PhyloOptimisationResult {
    pub initial_logl: f64,
    pub final_logl: f64,
    pub iterations: usize,
    pub moves_applied: usize,
}

#[cfg(test)]
pub(crate) mod test_engines;
