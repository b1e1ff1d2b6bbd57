use std::fmt::Display;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use log::LevelFilter;

use nni_search::optimisers::{BlenOptimisation, NniConfig};
use nni_search::partitions::parse_range;
use nni_search::substitution_models::DNAModelType;

use crate::Result;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Cli {
    /// Sequence file in fasta format
    #[arg(short, long, value_name = "SEQ_FILE")]
    pub(super) seq_file: PathBuf,

    /// Start tree file in newick format, a random tree is used if missing
    #[arg(short, long, value_name = "TREE_FILE")]
    pub(super) tree_file: Option<PathBuf>,

    /// Output tree file in newick format
    #[arg(short, long, value_name = "OUT_TREE_FILE")]
    pub(super) out_tree: PathBuf,

    /// Output file for the final log-likelihood, defaults to the tree file with a .logl extension
    #[arg(short = 'l', long, value_name = "OUT_LOGL_FILE")]
    pub(super) out_logl: Option<PathBuf>,

    /// Substitution model
    #[arg(short, long, value_name = "MODEL", default_value = "GTR")]
    pub(super) model: String,

    /// Substitution model parameters, e.g. kappa for K80 and HKY
    #[arg(short = 'p', long, value_name = "MODEL_PARAMS")]
    pub(super) model_params: Vec<f64>,

    /// Stationary frequencies in T, C, A, G order, empirical if missing
    #[arg(short, long, value_name = "FREQS")]
    pub(super) freqs: Vec<f64>,

    /// Branch lengths optimised while scoring each NNI
    #[arg(long, value_enum, default_value_t = NniEval::Single)]
    pub(super) nni_eval: NniEval,

    /// Alignment partition as a 1-based inclusive column range, e.g. 1-300
    #[arg(long = "partition", value_name = "START-END")]
    pub(super) partitions: Vec<String>,

    /// Estimate separate branch lengths for every partition
    #[arg(long)]
    pub(super) per_partition_blens: bool,

    /// Smooth all branch lengths before the NNI search
    #[arg(long)]
    pub(super) smooth: bool,

    /// Maximum number of NNI rounds
    #[arg(long, default_value_t = 100)]
    pub(super) max_rounds: usize,

    /// Minimum log-likelihood gain of an NNI
    #[arg(short, long, default_value_t = 1e-3)]
    pub(super) epsilon: f64,

    /// Seed of the random start tree
    #[arg(long, default_value_t = 0)]
    pub(super) seed: u64,

    /// Logging level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub(super) log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(super) enum NniEval {
    Fixed,
    Single,
    Five,
}

impl From<NniEval> for BlenOptimisation {
    fn from(eval: NniEval) -> Self {
        match eval {
            NniEval::Fixed => BlenOptimisation::Fixed,
            NniEval::Single => BlenOptimisation::Single,
            NniEval::Five => BlenOptimisation::Five,
        }
    }
}

pub(super) struct ConfigBuilder {
    seq_file: PathBuf,
    input_tree: Option<PathBuf>,
    out_tree: PathBuf,
    out_logl: Option<PathBuf>,
    model: String,
    params: Vec<f64>,
    freqs: Vec<f64>,
    nni_eval: NniEval,
    partitions: Vec<String>,
    per_partition_blens: bool,
    smooth: bool,
    max_rounds: usize,
    epsilon: f64,
    seed: u64,
    log_level: String,
}

impl From<Cli> for ConfigBuilder {
    fn from(cli: Cli) -> Self {
        ConfigBuilder {
            seq_file: cli.seq_file,
            input_tree: cli.tree_file,
            out_tree: cli.out_tree,
            out_logl: cli.out_logl,
            model: cli.model,
            params: cli.model_params,
            freqs: cli.freqs,
            nni_eval: cli.nni_eval,
            partitions: cli.partitions,
            per_partition_blens: cli.per_partition_blens,
            smooth: cli.smooth,
            max_rounds: cli.max_rounds,
            epsilon: cli.epsilon,
            seed: cli.seed,
            log_level: cli.log_level,
        }
    }
}

impl ConfigBuilder {
    pub(super) fn setup(self) -> Result<Config> {
        let model = DNAModelType::from_str(&self.model)?;
        let Some(max_rounds) = NonZeroUsize::new(self.max_rounds) else {
            bail!("At least one NNI round is required");
        };
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            bail!("Epsilon must be positive, got {}", self.epsilon);
        }
        let log_level = LevelFilter::from_str(&self.log_level)?;
        let partitions = self
            .partitions
            .iter()
            .map(|range| parse_range(range))
            .collect::<Result<Vec<_>>>()?;
        if self.per_partition_blens && partitions.len() < 2 {
            bail!("Per partition branch lengths need at least two partitions");
        }
        let out_logl = self
            .out_logl
            .unwrap_or_else(|| self.out_tree.with_extension("logl"));
        Ok(Config {
            seq_file: self.seq_file,
            input_tree: self.input_tree,
            out_tree: self.out_tree,
            out_logl,
            model,
            params: self.params,
            freqs: self.freqs,
            partitions,
            per_partition_blens: self.per_partition_blens,
            smooth: self.smooth,
            max_rounds,
            nni: NniConfig {
                blen_opt: self.nni_eval.into(),
                epsilon: self.epsilon,
                ..Default::default()
            },
            seed: self.seed,
            log_level,
        })
    }
}

#[derive(Debug)]
pub(super) struct Config {
    pub(super) seq_file: PathBuf,
    pub(super) input_tree: Option<PathBuf>,
    pub(super) out_tree: PathBuf,
    pub(super) out_logl: PathBuf,
    pub(super) model: DNAModelType,
    pub(super) params: Vec<f64>,
    pub(super) freqs: Vec<f64>,
    pub(super) partitions: Vec<Range<usize>>,
    pub(super) per_partition_blens: bool,
    pub(super) smooth: bool,
    pub(super) max_rounds: NonZeroUsize,
    pub(super) nni: NniConfig,
    pub(super) seed: u64,
    pub(super) log_level: LevelFilter,
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  sequences: {}", self.seq_file.display())?;
        match &self.input_tree {
            Some(tree) => writeln!(f, "  start tree: {}", tree.display())?,
            None => writeln!(f, "  start tree: random, seed {}", self.seed)?,
        }
        writeln!(f, "  output tree: {}", self.out_tree.display())?;
        writeln!(f, "  output logl: {}", self.out_logl.display())?;
        writeln!(f, "  model: {} {:?}", self.model, self.params)?;
        if !self.freqs.is_empty() {
            writeln!(f, "  frequencies: {:?}", self.freqs)?;
        }
        if !self.partitions.is_empty() {
            writeln!(
                f,
                "  partitions: {:?}, {} branch lengths",
                self.partitions,
                if self.per_partition_blens {
                    "per partition"
                } else {
                    "shared"
                }
            )?;
        }
        writeln!(f, "  smoothing: {}", self.smooth)?;
        writeln!(f, "  NNI branch lengths: {}", self.nni.blen_opt)?;
        write!(
            f,
            "  max rounds: {}, epsilon: {}",
            self.max_rounds, self.nni.epsilon
        )
    }
}
