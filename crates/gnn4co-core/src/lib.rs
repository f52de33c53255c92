//! Graph data model for gnn4co.
//!
//! - [`Graph`] - a single graph as an edge list, with optional edge and node
//!   weights
//! - [`GraphBatch`] - several graphs packed into one disjoint union, the unit
//!   every objective and model consumes
//! - [`BatchSource`] / [`GraphLoader`] - restartable batch iteration
//! - [`dataset`] - random G(n, p) graphs, JSON graph files, splits
//!
//! # Example
//!
//! ```rust
//! use gnn4co_core::{BatchSource, Graph, GraphLoader};
//!
//! let path = Graph::new(4, vec![(0, 1), (1, 2), (2, 3)]).unwrap().to_undirected();
//! let mut loader = GraphLoader::new(vec![path.clone(), path], 2).unwrap();
//!
//! let batch = loader.batches().next().unwrap();
//! assert_eq!(batch.num_graphs(), 2);
//! assert_eq!(batch.num_nodes(), 8);
//! assert_eq!(batch.edge_count(), 12);
//! ```

mod batch;
pub mod dataset;
mod error;
mod graph;
mod loader;

pub use batch::GraphBatch;
pub use dataset::{DatasetSplit, RandomGraphConfig};
pub use error::{Error, Result};
pub use graph::Graph;
pub use loader::{BatchSource, GraphLoader};
