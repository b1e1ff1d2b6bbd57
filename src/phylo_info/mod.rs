use nalgebra::DMatrix;

use crate::alignment::Alignment;
use crate::substitution_models::FreqVector;
use crate::tree::Tree;
use crate::Result;

mod phyloinfo_builder;
pub use phyloinfo_builder::*;

/// The PhyloInfo struct holds the input of a tree search: the alignment and the start tree.
///
/// The struct can be built using the PhyloInfoBuilder from at least a fasta sequence file.
/// Tree leaves and sequence ids are guaranteed to match.
#[derive(Debug, Clone)]
pub struct PhyloInfo {
    /// Multiple sequence alignment of the sequences
    pub msa: Alignment,
    /// Phylogenetic tree.
    pub tree: Tree,
}

impl PhyloInfo {
    /// Returns the number of sites in the alignment.
    pub fn msa_length(&self) -> usize {
        self.msa.len()
    }

    /// Returns the empirical nucleotide frequencies of the alignment.
    pub fn freqs(&self) -> FreqVector {
        self.msa.freqs()
    }

    /// Leaf state encodings in leaf index order of the tree.
    pub fn leaf_encodings(&self) -> Result<Vec<DMatrix<f64>>> {
        self.msa.leaf_encodings(&self.tree)
    }
}
