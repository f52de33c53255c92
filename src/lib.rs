//! `gnn4co` trains graph neural networks to produce relaxed solutions of
//! combinatorial problems on graphs, with the relaxed objective as the loss.
//!
//! - [`graph`]: graphs, batches, loaders, datasets
//! - [`nn`]: objectives, models, the training loop
//!
//! The most used types are re-exported at the top level.

pub use gnn4co_core as graph;
pub use gnn4co_nn as nn;

pub use gnn4co_core::{BatchSource, Graph, GraphBatch, GraphLoader};
pub use gnn4co_nn::{
    load_model, predict, save_model, validate, ModelConfig, ModelType, Objective, ProblemType,
    RelaxationModel, RelaxationNet, TrainOutcome, Trainer, TrainingConfig,
};
