//! gnn4co CLI - train and evaluate GNN relaxations from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Train max-cut on 10000 random G(100, 0.15) graphs
//! gnn4co train --problem-type max_cut --epochs 100
//!
//! # Step-wise training of vertex cover with periodic validation and saves
//! gnn4co train --problem-type vertex_cover --steps 5000 --valid-every 500 --save-every 1000
//!
//! # Train on graphs from a JSON file
//! gnn4co generate -o graphs.json --num-graphs 500 --num-nodes 50
//! gnn4co train --dataset file --graphs graphs.json --problem-type max_clique
//!
//! # Score a checkpoint on the test split of its run
//! gnn4co test --model-folder training_runs/2024-05-01_12:00:00 --model-file model_ep100.safetensors
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `gnn4co=info`).

use anyhow::{bail, Context, Result};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use clap::{Parser, Subcommand, ValueEnum};
use gnn4co_core::dataset::{erdos_renyi, load_graphs_json, save_graphs_json, split_dataset};
use gnn4co_core::{BatchSource, DatasetSplit, Graph, GraphBatch, GraphLoader, RandomGraphConfig};
use gnn4co_nn::{
    load_model, predict, DeviceSpec, Featurizer, ModelConfig, ModelType, Objective, ProblemType,
    RelaxationModel, RelaxationNet, Trainer, TrainingConfig,
};
use gnn4co_nn::training::unbatch_rows;
use indicatif::ProgressBar;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(name = "gnn4co")]
#[command(about = "GNN relaxations for combinatorial optimization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a relaxation model
    Train(TrainArgs),

    /// Score a saved checkpoint on the test split of its run
    Test {
        /// Run directory holding config.json and checkpoints
        #[arg(long)]
        model_folder: PathBuf,

        /// Checkpoint file name inside the run directory
        #[arg(long)]
        model_file: String,
    },

    /// Write random graphs to a JSON file
    Generate {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of graphs
        #[arg(long, default_value = "1000")]
        num_graphs: usize,

        /// Nodes per graph
        #[arg(long, default_value = "100")]
        num_nodes: usize,

        /// Probability of each edge
        #[arg(long, default_value = "0.15")]
        edge_probability: f64,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(clap::Args)]
struct TrainArgs {
    /// max_cut, vertex_cover or max_clique
    #[arg(long, default_value = "max_cut")]
    problem_type: String,

    /// Penalty for uncovered edges (vertex_cover, max_clique)
    #[arg(long, default_value = "2.0")]
    vc_penalty: f64,

    /// Columns of the solution matrix
    #[arg(long, default_value = "2")]
    rank: usize,

    /// mp, gin, gcn or sage
    #[arg(long, default_value = "mp")]
    model_type: String,

    /// Message-passing layers
    #[arg(long, default_value = "12")]
    num_layers: usize,

    /// Hidden width
    #[arg(long, default_value = "32")]
    hidden_dim: usize,

    /// Dropout between layers
    #[arg(long, default_value = "0.1")]
    dropout: f32,

    /// Learning rate
    #[arg(long, default_value = "0.001")]
    lr: f64,

    /// Training epochs
    #[arg(long, default_value = "100")]
    epochs: usize,

    /// Stop after this many optimizer steps (switches to step-wise mode)
    #[arg(long)]
    steps: Option<usize>,

    /// Validate every N epochs (or steps); 0 disables
    #[arg(long, default_value = "0")]
    valid_every: usize,

    /// Checkpoint every N epochs (or steps); 0 disables
    #[arg(long, default_value = "0")]
    save_every: usize,

    /// Graph source
    #[arg(long, default_value = "random")]
    dataset: DatasetKind,

    /// Graph file for --dataset file
    #[arg(long)]
    graphs: Option<PathBuf>,

    /// Random graphs to generate
    #[arg(long, default_value = "10000")]
    num_graphs: usize,

    /// Nodes per random graph
    #[arg(long, default_value = "100")]
    num_nodes: usize,

    /// Edge probability of random graphs
    #[arg(long, default_value = "0.15")]
    edge_probability: f64,

    /// Graphs per batch
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Seed for data, parameters and featurization
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Compute target
    #[arg(long, default_value = "cpu")]
    device: DeviceKind,

    /// Output directory (default: training_runs/<timestamp>)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DatasetKind {
    /// Erdős–Rényi G(n, p) graphs
    Random,
    /// Graphs from a JSON file
    File,
}

#[derive(Clone, Copy, ValueEnum)]
enum DeviceKind {
    Cpu,
    /// First CUDA device, CPU when unavailable
    Cuda,
}

/// How a run obtains and splits its graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DataConfig {
    dataset: DatasetKind,
    graphs: Option<PathBuf>,
    num_graphs: usize,
    num_nodes: usize,
    edge_probability: f64,
    batch_size: usize,
    train_frac: f64,
    valid_frac: f64,
    seed: u64,
}

/// Everything needed to rebuild a run; written to `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunConfig {
    training: TrainingConfig,
    model: ModelConfig,
    data: DataConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gnn4co=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => cmd_train(args),
        Commands::Test {
            model_folder,
            model_file,
        } => cmd_test(&model_folder, &model_file),
        Commands::Generate {
            output,
            num_graphs,
            num_nodes,
            edge_probability,
            seed,
        } => cmd_generate(
            &output,
            RandomGraphConfig {
                num_graphs,
                num_nodes,
                edge_probability,
            },
            seed,
        ),
    }
}

fn run_config(args: TrainArgs) -> Result<RunConfig> {
    // Fail before any data is built.
    let problem_type: ProblemType = args.problem_type.parse()?;
    let model_type: ModelType = args.model_type.parse()?;

    let log_dir = args.log_dir.unwrap_or_else(|| {
        PathBuf::from("training_runs").join(chrono::Local::now().format("%Y-%m-%d_%H:%M:%S").to_string())
    });
    let device = match args.device {
        DeviceKind::Cpu => DeviceSpec::Cpu,
        DeviceKind::Cuda => DeviceSpec::Cuda(0),
    };

    let mut training = TrainingConfig::default()
        .with_problem_type(problem_type)
        .with_penalty(args.vc_penalty)
        .with_rank(args.rank)
        .with_device(device)
        .with_learning_rate(args.lr)
        .with_seed(args.seed)
        .with_log_dir(log_dir)
        .with_epochs(args.epochs);
    if let Some(steps) = args.steps {
        training = training.with_steps(steps);
    }
    training = training
        .with_validation_every(args.valid_every)
        .with_save_every(args.save_every);
    training.validate()?;

    let model = ModelConfig::default()
        .with_model_type(model_type)
        .with_num_layers(args.num_layers)
        .with_hidden_dim(args.hidden_dim)
        .with_dropout(args.dropout);
    model.validate()?;

    if args.dataset == DatasetKind::File && args.graphs.is_none() {
        bail!("--dataset file requires --graphs <path>");
    }

    Ok(RunConfig {
        training,
        model,
        data: DataConfig {
            dataset: args.dataset,
            graphs: args.graphs,
            num_graphs: args.num_graphs,
            num_nodes: args.num_nodes,
            edge_probability: args.edge_probability,
            batch_size: args.batch_size,
            train_frac: 0.8,
            valid_frac: 0.1,
            seed: args.seed,
        },
    })
}

/// Build the dataset of a run and split it. Max-clique graphs are replaced
/// by their complements.
fn build_splits(data: &DataConfig, problem_type: ProblemType) -> Result<DatasetSplit> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();

    let graphs = match data.dataset {
        DatasetKind::Random => {
            pb.set_message(format!(
                "Generating {} random graphs (n={}, p={})...",
                data.num_graphs, data.num_nodes, data.edge_probability
            ));
            let config = RandomGraphConfig {
                num_graphs: data.num_graphs,
                num_nodes: data.num_nodes,
                edge_probability: data.edge_probability,
            };
            erdos_renyi(&config, &mut XorShiftRng::seed_from_u64(data.seed))?
        }
        DatasetKind::File => {
            let path = data
                .graphs
                .as_deref()
                .context("--dataset file requires --graphs <path>")?;
            pb.set_message(format!("Loading {}...", path.display()));
            load_graphs_json(path).with_context(|| format!("Failed to load graphs from {}", path.display()))?
        }
    };

    let graphs: Vec<Graph> = if problem_type.needs_complement() {
        graphs.iter().map(Graph::complement).collect()
    } else {
        graphs
    };
    let split = split_dataset(graphs, data.train_frac, data.valid_frac)?;

    pb.finish_with_message(format!(
        "Prepared {} train / {} valid / {} test graphs in {:.2?}",
        split.train.len(),
        split.valid.len(),
        split.test.len(),
        start.elapsed()
    ));
    Ok(split)
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let run = run_config(args)?;
    let log_dir = run.training.log_dir.clone();

    fs::create_dir_all(&log_dir).with_context(|| format!("Failed to create {}", log_dir.display()))?;
    let config_path = log_dir.join(CONFIG_FILE);
    let file = File::create(&config_path).with_context(|| format!("Failed to write {}", config_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &run)?;
    tracing::info!(path = %config_path.display(), "wrote run config");

    let split = build_splits(&run.data, run.training.problem_type)?;
    let mut train_loader =
        GraphLoader::new(split.train, run.data.batch_size)?.with_shuffle(run.data.seed.wrapping_add(1));
    let mut valid_loader = GraphLoader::new(split.valid, run.data.batch_size)?;

    let mut trainer = Trainer::new(run.training.clone())?;
    let model = RelaxationNet::new(&run.model, run.training.rank, trainer.device(), run.training.seed)?;
    let params = ParamsAdamW {
        lr: run.training.learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut optimizer = AdamW::new(model.varmap().all_vars(), params)?;

    let valid: Option<&mut dyn BatchSource> = if run.training.validation_frequency() != 0 {
        Some(&mut valid_loader)
    } else {
        None
    };
    let outcome = trainer
        .fit(&model, &mut optimizer, &mut train_loader, valid)
        .context("Training failed")?;

    println!("Training finished");
    println!("=================");
    println!("Problem:          {}", run.training.problem_type);
    println!("Epochs:           {}", outcome.epochs_completed);
    println!("Steps:            {}", outcome.steps);
    if let Some(loss) = outcome.train_losses.last() {
        println!("Final train loss: {loss:.4}");
    }
    if let Some(loss) = outcome.valid_losses.last() {
        println!("Final valid loss: {loss:.4}");
    }
    println!("Checkpoint:       {}", outcome.final_checkpoint.display());
    Ok(())
}

fn cmd_test(model_folder: &Path, model_file: &str) -> Result<()> {
    let config_path = model_folder.join(CONFIG_FILE);
    let file = File::open(&config_path).with_context(|| format!("Failed to open {}", config_path.display()))?;
    let run: RunConfig = serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    let split = build_splits(&run.data, run.training.problem_type)?;
    if split.test.is_empty() {
        bail!("test split of {} is empty", model_folder.display());
    }

    let device = run.training.device.resolve()?;
    let mut model = RelaxationNet::new(&run.model, run.training.rank, &device, run.training.seed)?;
    let checkpoint = model_folder.join(model_file);
    load_model(&mut model, &checkpoint).with_context(|| format!("Failed to load {}", checkpoint.display()))?;

    let mut loader = GraphLoader::new(split.test, run.data.batch_size)?;
    let mut batches: Vec<GraphBatch> = loader.batches().collect();
    let mut featurizer = Featurizer::new(run.training.rank, device, run.training.seed)?;
    let predictions = predict(&model, &mut batches, &mut featurizer)?;

    // Scores are per example, so split each batch back into its graphs.
    let objective = Objective::new(run.training.problem_type, run.training.vc_penalty)?;
    let mut total = 0.0f64;
    let mut count = 0usize;
    for ((out, _), batch) in predictions.iter().zip(&batches) {
        let rows = unbatch_rows(batch, out)?;
        for (x, graph) in rows.into_iter().zip(batch.unbatch()?) {
            total += objective.score(x, &GraphBatch::from_graph(graph))? as f64;
            count += 1;
        }
    }
    let mean = total / count as f64;

    println!("Problem:    {}", run.training.problem_type);
    println!("Checkpoint: {}", checkpoint.display());
    println!("Graphs:     {count}");
    println!("Mean score: {mean:.4}");
    Ok(())
}

fn cmd_generate(output: &Path, config: RandomGraphConfig, seed: u64) -> Result<()> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Generating {} graphs...", config.num_graphs));

    let graphs = erdos_renyi(&config, &mut XorShiftRng::seed_from_u64(seed))?;
    save_graphs_json(output, &graphs).with_context(|| format!("Failed to write {}", output.display()))?;

    pb.finish_with_message(format!("Generated in {:.2?}", start.elapsed()));
    println!("Wrote {} graphs to {}", graphs.len(), output.display());
    Ok(())
}
