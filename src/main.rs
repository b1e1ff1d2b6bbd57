use std::fs::File;
use std::io::Write;

use anyhow::{anyhow, bail, Error};
use clap::Parser;
use ftail::Ftail;
use log::info;

use nni_search::io::write_newick_to_file;
use nni_search::likelihood::SubstitutionLikelihood;
use nni_search::optimisers::{BranchOptimiser, NniOptimiser, TopologyOptimiserPredicate};
use nni_search::partitions::Partitions;
use nni_search::phylo_info::PhyloInfoBuilder;
use nni_search::substitution_models::{DNAModelType, SubstModel};

mod cli;
use crate::cli::{Cli, ConfigBuilder};

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            bail!("Unable to parse command line arguments: \n {}", error)
        }
    };
    let cfg_build: ConfigBuilder = cli.into();
    let cfg = cfg_build.setup()?;
    Ftail::new()
        .console(cfg.log_level)
        .init()
        .map_err(|e| anyhow!("{:?}", e))?;

    info!("NNI search run started.");
    info!("{}", cfg);

    let mut info = PhyloInfoBuilder::new(cfg.seq_file.clone())
        .tree_file(cfg.input_tree.clone())
        .seed(cfg.seed)
        .build()?;
    let partitions = if cfg.partitions.is_empty() {
        Partitions::single(info.msa_length())
    } else {
        Partitions::from_ranges(
            cfg.partitions.clone(),
            info.msa_length(),
            cfg.per_partition_blens,
        )?
    };
    info.tree.resize_branch_lengths(partitions.num_branches())?;

    let freqs = match (cfg.model, cfg.freqs.is_empty()) {
        (DNAModelType::HKY | DNAModelType::GTR, true) => info.freqs().as_slice().to_vec(),
        _ => cfg.freqs.clone(),
    };
    let model = SubstModel::new(cfg.model, &freqs, &cfg.params)?;
    let mut engine = SubstitutionLikelihood::new(model, partitions.clone(), &info)?;
    let mut tree = info.tree.clone();

    if cfg.smooth {
        let o = BranchOptimiser::new()
            .with_epsilon(cfg.nni.epsilon)
            .run(&mut tree, &mut engine)?;
        info!("Smoothed branch lengths, logl {}", o.final_logl);
    }

    let o = NniOptimiser::new_with_pred(
        cfg.nni,
        TopologyOptimiserPredicate::fixed_iter(cfg.max_rounds),
    )
    .run(&mut tree, &mut engine, &partitions)?;
    info!(
        "Applied {} NNI(s) in {} round(s), logl {} -> {}",
        o.moves_applied, o.iterations, o.initial_logl, o.final_logl
    );

    info!("Putting resulting tree in {}", cfg.out_tree.display());
    write_newick_to_file(&[tree], &cfg.out_tree)?;
    let mut out_logl = File::create(&cfg.out_logl)?;
    writeln!(out_logl, "{}", o.final_logl)?;

    Ok(())
}
