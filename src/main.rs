use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::info;

use genregraph::builder::GraphBuilder;
use genregraph::config::ExperimentConfig;
use genregraph::dictionary::{DictionaryLearner, DictionaryModel};
use genregraph::features::FeatureMatrix;
use genregraph::io;
use genregraph::reference::{ReferenceSolution, compare};

#[derive(Parser)]
#[command(name = "genregraph", version, about = "Audio feature graphs and dictionary learning")]
struct Cli {
    /// TOML experiment configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the k-NN graph and its Laplacian
    Graph {
        /// features, CSV or `label; v1,v2,...` lines
        features: PathBuf,
        #[arg(short, long, default_value = "out/graph")]
        out: PathBuf,
        /// override graph.k
        #[arg(short)]
        k: Option<usize>,
    },
    /// Learn a dictionary, optionally regularised by the sample graph
    Learn {
        features: PathBuf,
        #[arg(short, long, default_value = "out/model")]
        out: PathBuf,
        /// build the sample graph first and use it for the smoothness term
        #[arg(long)]
        with_graph: bool,
    },
    /// Learn a dictionary and compare it with a reference solution
    Compare {
        features: PathBuf,
        /// directory with D.csv, E.csv, Z.csv and optionally objective.csv
        reference: PathBuf,
        #[arg(short, long, default_value = "out/model")]
        out: PathBuf,
        #[arg(long, default_value_t = 1e-2)]
        tolerance: f64,
        #[arg(long)]
        with_graph: bool,
    },
}

fn graph_builder(config: &ExperimentConfig) -> GraphBuilder {
    let builder = GraphBuilder::from_params(config.graph.clone());
    if config.lmax_iterations > 0 {
        builder.with_lmax(config.lmax_iterations)
    } else {
        builder
    }
}

fn learn(
    config: &ExperimentConfig,
    features: &Path,
    with_graph: bool,
) -> anyhow::Result<DictionaryModel> {
    let fm = FeatureMatrix::load(features)
        .with_context(|| format!("loading features from {}", features.display()))?;
    let scaled = fm.scale(config.graph.scaling)?;

    let graph = if with_graph {
        Some(graph_builder(config).build(&fm)?.laplacian)
    } else {
        if config.dictionary.lg > 0.0 {
            bail!("dictionary.lg > 0 needs --with-graph");
        }
        None
    };

    let model = DictionaryLearner::from_params(config.dictionary.clone())
        .fit(&scaled.to_sample_columns(), graph.as_ref())?;
    Ok(model)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = ExperimentConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Graph { features, out, k } => {
            if let Some(k) = k {
                config.graph.k = k;
            }
            let fm = FeatureMatrix::load(&features)
                .with_context(|| format!("loading features from {}", features.display()))?;
            let built = graph_builder(&config).build(&fm)?;

            let validation = built.laplacian.verify_properties(1e-9);
            if !validation.is_valid {
                bail!("Laplacian failed validation: {:?}", validation);
            }
            println!("{}", built.laplacian.statistics());
            io::save_graph(&out, &built.laplacian, built.lmax, &fm.labels)?;
        }
        Command::Learn {
            features,
            out,
            with_graph,
        } => {
            let model = learn(&config, &features, with_graph)?;
            info!("Final objective {:.6e}", model.final_objective());
            io::save_model(&out, &model)?;
        }
        Command::Compare {
            features,
            reference,
            out,
            tolerance,
            with_graph,
        } => {
            let model = learn(&config, &features, with_graph)?;
            let reference = ReferenceSolution::load(&reference)?;
            let cmp = compare(&model, &reference, tolerance)?;
            println!("{}", cmp);
            io::save_model(&out, &model)?;
            io::write_json(out.join("comparison.json"), &cmp)?;
        }
    }

    Ok(())
}
