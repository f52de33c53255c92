//! Graph datasets: random generation, JSON files, and splits.

use crate::error::{Error, Result};
use crate::graph::Graph;
use rand::Rng;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

/// Parameters for G(n, p) random graphs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomGraphConfig {
    /// Number of graphs to generate (default: 10000).
    pub num_graphs: usize,
    /// Nodes per graph (default: 100).
    pub num_nodes: usize,
    /// Independent probability of each undirected edge (default: 0.15).
    pub edge_probability: f64,
}

impl Default for RandomGraphConfig {
    fn default() -> Self {
        Self {
            num_graphs: 10000,
            num_nodes: 100,
            edge_probability: 0.15,
        }
    }
}

/// Sample Erdős–Rényi graphs. Each undirected edge is stored in both
/// directions.
pub fn erdos_renyi<R: Rng>(config: &RandomGraphConfig, rng: &mut R) -> Result<Vec<Graph>> {
    let p = config.edge_probability;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidArgument(format!(
            "edge_probability must be in [0, 1], got {p}"
        )));
    }

    let n = config.num_nodes;
    let graphs = (0..config.num_graphs)
        .map(|_| {
            let mut edges = Vec::new();
            for u in 0..n {
                for v in (u + 1)..n {
                    if rng.gen_bool(p) {
                        edges.push((u, v));
                        edges.push((v, u));
                    }
                }
            }
            Graph {
                num_nodes: n,
                edges,
                edge_weight: None,
                node_weight: None,
            }
        })
        .collect::<Vec<_>>();

    debug!(count = graphs.len(), n, p, "generated random graphs");
    Ok(graphs)
}

/// Read a JSON array of graphs, validating each one.
pub fn load_graphs_json(path: impl AsRef<Path>) -> Result<Vec<Graph>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let graphs: Vec<Graph> = serde_json::from_reader(reader)?;
    for g in &graphs {
        g.validate()?;
    }
    Ok(graphs)
}

/// Write graphs as a JSON array.
pub fn save_graphs_json(path: impl AsRef<Path>, graphs: &[Graph]) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(writer, graphs)?;
    Ok(())
}

/// Train / validation / test partition of a dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    pub train: Vec<Graph>,
    pub valid: Vec<Graph>,
    pub test: Vec<Graph>,
}

/// Split graphs in order: the first `train_frac` go to training, the next
/// `valid_frac` to validation, the rest to test.
pub fn split_dataset(mut graphs: Vec<Graph>, train_frac: f64, valid_frac: f64) -> Result<DatasetSplit> {
    if train_frac < 0.0 || valid_frac < 0.0 || train_frac + valid_frac > 1.0 {
        return Err(Error::InvalidArgument(format!(
            "split fractions must be non-negative and sum to at most 1 (train={train_frac}, valid={valid_frac})"
        )));
    }

    let n = graphs.len();
    let n_train = (n as f64 * train_frac).round() as usize;
    let n_valid = ((n as f64 * valid_frac).round() as usize).min(n - n_train);

    let test = graphs.split_off(n_train + n_valid);
    let valid = graphs.split_off(n_train);
    Ok(DatasetSplit {
        train: graphs,
        valid,
        test,
    })
}
