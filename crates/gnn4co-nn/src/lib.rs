//! Graph neural relaxations for combinatorial optimization.
//!
//! `gnn4co-nn` trains message-passing networks to output relaxed solutions
//! of max-cut, vertex cover and max-clique, using the relaxed objective
//! itself as the loss. It sits on top of the data model in `gnn4co-core`.
//!
//! # Modules
//!
//! - [`objective`]: Losses and scores for each problem, [`Objective`] selector
//! - [`featurize`]: Random unit-row inputs per batch
//! - [`conv`]: Scatter-sum message-passing layers (GCN, GIN, GraphSAGE)
//! - [`model`]: [`RelaxationModel`] trait and [`RelaxationNet`]
//! - [`training`]: [`Trainer`], [`validate`], [`predict`]
//! - [`checkpoint`] / [`history`]: On-disk artifacts
//!
//! # Example: Max-cut Loss
//!
//! ```rust
//! use candle_core::{Device, Tensor};
//! use gnn4co_core::GraphBatch;
//! use gnn4co_nn::objective::max_cut_loss;
//!
//! // Triangle, both directions per edge.
//! let triangle = GraphBatch::new(3, vec![(0, 1), (1, 0), (1, 2), (2, 1), (0, 2), (2, 0)]).unwrap();
//!
//! // Node 0 alone on one side: two edges cut, one uncut.
//! let x = Tensor::new(&[[1f32], [-1.0], [-1.0]], &Device::Cpu).unwrap();
//! let loss = max_cut_loss(&x, &triangle).unwrap().to_scalar::<f32>().unwrap();
//! assert!((loss + 1.0).abs() < 1e-5);
//! ```
//!
//! # Example: Training
//!
//! ```rust,ignore
//! use candle_nn::{AdamW, ParamsAdamW};
//! use gnn4co_nn::{ModelConfig, RelaxationModel, RelaxationNet, Trainer, TrainingConfig};
//!
//! let mut trainer = Trainer::new(TrainingConfig::default().with_epochs(20))?;
//! let model = RelaxationNet::new(&ModelConfig::default(), 2, trainer.device(), 0)?;
//! let mut opt = AdamW::new(model.varmap().all_vars(), ParamsAdamW::default())?;
//! trainer.fit(&model, &mut opt, &mut train_loader, None)?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod conv;
pub mod embedding;
pub mod error;
pub mod featurize;
pub mod history;
pub mod model;
pub mod objective;
pub mod problem;
pub mod training;

pub use checkpoint::{load_model, save_model};
pub use config::{DeviceSpec, TrainingConfig};
pub use embedding::{normalize_embedding, EmbeddingInput};
pub use error::{Error, Result};
pub use featurize::{Features, Featurizer};
pub use model::{ModelConfig, ModelType, RelaxationModel, RelaxationNet};
pub use objective::Objective;
pub use problem::ProblemType;
pub use training::{predict, validate, TrainOutcome, Trainer};
