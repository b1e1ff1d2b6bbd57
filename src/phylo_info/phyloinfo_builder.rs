use std::path::{Path, PathBuf};

use anyhow::bail;
use hashbrown::HashSet;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::alignment::Alignment;
use crate::io::{self, DataError};
use crate::phylo_info::PhyloInfo;
use crate::tree::Tree;
use crate::Result;

pub struct PhyloInfoBuilder {
    sequence_file: PathBuf,
    tree_file: Option<PathBuf>,
    seed: u64,
}

impl PhyloInfoBuilder {
    /// Creates a new PhyloInfoBuilder with only the sequence file path set.
    ///
    /// # Arguments
    /// * `sequence_file` - File path to the sequence fasta file.
    pub fn new(sequence_file: PathBuf) -> PhyloInfoBuilder {
        PhyloInfoBuilder {
            sequence_file,
            tree_file: None,
            seed: 0,
        }
    }

    /// Creates a new PhyloInfoBuilder with the sequence and tree file paths set.
    pub fn with_attrs(sequence_file: PathBuf, tree_file: PathBuf) -> PhyloInfoBuilder {
        PhyloInfoBuilder {
            sequence_file,
            tree_file: Some(tree_file),
            seed: 0,
        }
    }

    /// Sets the tree file path. Without a tree file a random tree is generated.
    pub fn tree_file(mut self, path: Option<PathBuf>) -> PhyloInfoBuilder {
        self.tree_file = path;
        self
    }

    /// Seed of the random start tree.
    pub fn seed(mut self, seed: u64) -> PhyloInfoBuilder {
        self.seed = seed;
        self
    }

    /// Builds the PhyloInfo struct from the sequence file and the tree file (if provided).
    /// If the provided tree file has more than one tree, only the first tree is used.
    /// Bails if the sequences are not aligned DNA or if the ids of the tree leaves and the
    /// sequences do not match.
    pub fn build(self) -> Result<PhyloInfo> {
        let msa = Alignment::new(io::read_sequences(&self.sequence_file)?)?;
        info!("{}", msa);

        let tree = match &self.tree_file {
            Some(tree_file) => read_tree(tree_file)?,
            None => {
                info!("No tree provided, building a random tree with seed {}", self.seed);
                let mut ids: Vec<String> = msa.seqs().iter().map(|r| r.id().to_string()).collect();
                ids.sort();
                Tree::random(&ids, &mut StdRng::seed_from_u64(self.seed))?
            }
        };
        validate_taxa_ids(&tree, &msa)?;
        Ok(PhyloInfo { msa, tree })
    }
}

fn read_tree(tree_file: &Path) -> Result<Tree> {
    let mut trees = io::read_newick_from_file(tree_file)?;
    if trees.is_empty() {
        bail!(DataError {
            message: String::from("No trees in the tree file, aborting")
        });
    }
    if trees.len() > 1 {
        warn!("More than one tree in the tree file, only the first tree will be processed");
    }
    Ok(trees.remove(0))
}

/// Checks that the ids of the tree leaves and the sequences match, bails with an error otherwise.
fn validate_taxa_ids(tree: &Tree, msa: &Alignment) -> Result<()> {
    let tip_ids: HashSet<String> = tree.leaf_ids().into_iter().collect();
    let sequence_ids = msa.ids();
    info!("Checking that tree tip and sequence IDs match");
    let mut missing_tips = sequence_ids.difference(&tip_ids).collect::<Vec<_>>();
    if !missing_tips.is_empty() {
        missing_tips.sort();
        bail!(DataError {
            message: format!("Mismatched IDs found, missing tree tip IDs: {missing_tips:?}")
        });
    }
    let mut missing_seqs = tip_ids.difference(&sequence_ids).collect::<Vec<_>>();
    if !missing_seqs.is_empty() {
        missing_seqs.sort();
        bail!(DataError {
            message: format!("Mismatched IDs found, missing sequence IDs: {missing_seqs:?}")
        });
    }
    Ok(())
}
