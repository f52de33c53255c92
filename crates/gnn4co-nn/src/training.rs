//! Training orchestration: the epoch/step loop, validation and inference.
//!
//! One state machine covers both control modes of [`TrainingConfig`]:
//!
//! - **Epoch mode**: runs `epochs` passes over the training source. After
//!   each pass the 0-based epoch index is checked against `valid_epochs` and
//!   `save_epochs`.
//! - **Step-wise mode** (`stepwise`): counts optimizer steps across epochs
//!   and stops once `steps` is reached. After each step the 1-based step
//!   count is checked against `valid_freq` and `save_freq`. The epoch count
//!   still bounds the run.
//!
//! Each step:
//!
//! ```text
//! featurize -> forward(train) -> objective -> backward -> optimizer step
//! ```
//!
//! At the end the final model is always written (`model_ep{epochs}` or
//! `model_step{steps}`) together with `train_losses.npy` and
//! `valid_losses.npy`, even when a periodic save already hit that boundary.
//!
//! # Example
//!
//! ```rust,ignore
//! use candle_nn::{AdamW, Optimizer, ParamsAdamW};
//! use gnn4co_nn::{ModelConfig, RelaxationModel, RelaxationNet, Trainer, TrainingConfig};
//!
//! let config = TrainingConfig::default().with_epochs(10).with_log_dir("runs/demo");
//! let mut trainer = Trainer::new(config)?;
//! let model = RelaxationNet::new(&ModelConfig::default(), 2, trainer.device(), 0)?;
//! let mut opt = AdamW::new(model.varmap().all_vars(), ParamsAdamW::default())?;
//! let outcome = trainer.fit(&model, &mut opt, &mut train_loader, Some(&mut valid_loader))?;
//! ```

use crate::checkpoint::{epoch_checkpoint_path, save_model, step_checkpoint_path};
use crate::config::TrainingConfig;
use crate::error::{Error, Result};
use crate::featurize::{Featurizer, Features};
use crate::history::{save_losses, train_losses_path, valid_losses_path};
use crate::model::RelaxationModel;
use crate::objective::Objective;
use candle_core::{Device, Tensor};
use candle_nn::Optimizer;
use gnn4co_core::{BatchSource, GraphBatch};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Whether a periodic action fires at `counter`. A frequency of 0 never fires.
pub fn is_trigger(counter: usize, freq: usize) -> bool {
    freq != 0 && counter % freq == 0
}

/// Result of [`Trainer::fit`].
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Per-step loss divided by the number of graphs in the batch.
    pub train_losses: Vec<f32>,
    /// Mean validation loss at each validation trigger.
    pub valid_losses: Vec<f32>,
    /// Optimizer steps taken.
    pub steps: usize,
    /// Full passes over the training source.
    pub epochs_completed: usize,
    /// Path of the final checkpoint.
    pub final_checkpoint: PathBuf,
}

/// Drives featurization, optimization, validation and checkpointing.
///
/// The objective is resolved once from the configuration, so an unknown or
/// invalid problem setup fails in [`Trainer::new`].
#[derive(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    objective: Objective,
    featurizer: Featurizer,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let device = config.device.resolve()?;
        let objective = Objective::new(config.problem_type, config.vc_penalty)?;
        let featurizer = Featurizer::new(config.rank, device, config.seed)?;
        Ok(Self {
            config,
            objective,
            featurizer,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn device(&self) -> &Device {
        self.featurizer.device()
    }

    /// One optimizer update on `batch`. Returns the summed batch loss.
    pub fn train_step<M, O>(&mut self, model: &M, optimizer: &mut O, batch: &GraphBatch) -> Result<f32>
    where
        M: RelaxationModel + ?Sized,
        O: Optimizer,
    {
        let Features {
            x,
            edge_index,
            edge_weight,
        } = self.featurizer.featurize_batch(batch)?;
        let out = model.forward_t(&x, &edge_index, &edge_weight, true)?;
        let loss = self.objective.loss(&out, batch)?;

        // candle builds a fresh gradient store per backward pass.
        let grads = loss.backward()?;
        optimizer.step(&grads)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    /// Train `model` on `train` until the configured epoch or step budget.
    ///
    /// `valid` is required when a validation frequency is set.
    pub fn fit<M, O>(
        &mut self,
        model: &M,
        optimizer: &mut O,
        train: &mut dyn BatchSource,
        mut valid: Option<&mut dyn BatchSource>,
    ) -> Result<TrainOutcome>
    where
        M: RelaxationModel + ?Sized,
        O: Optimizer,
    {
        let stepwise = self.config.stepwise;
        let valid_freq = self.config.validation_frequency();
        let save_freq = self.config.save_frequency();
        let log_dir = self.config.log_dir.clone();

        if valid_freq != 0 && valid.is_none() {
            return Err(Error::InvalidConfig(
                "validation frequency is set but no validation source was given".into(),
            ));
        }
        if train.num_batches() == 0 {
            return Err(Error::InvalidConfig("training source yields no batches".into()));
        }
        std::fs::create_dir_all(&log_dir)?;

        let mode = if stepwise { "steps" } else { "epochs" };
        info!(
            problem = %self.objective.problem(),
            mode,
            epochs = self.config.epochs,
            steps = self.config.steps,
            log_dir = %log_dir.display(),
            "starting training"
        );

        let mut train_losses = Vec::new();
        let mut valid_losses = Vec::new();
        let mut steps = 0usize;
        let mut epochs_completed = 0usize;

        'epochs: for epoch in 0..self.config.epochs {
            let start = Instant::now();
            let mut epoch_loss = 0.0f64;
            let mut epoch_graphs = 0usize;

            for batch in train.batches() {
                if batch.num_nodes() == 0 {
                    warn!(step = steps, "training batch has no nodes");
                }
                let loss = self.train_step(model, optimizer, &batch)?;
                let graphs = batch.num_graphs().max(1);
                train_losses.push(loss / graphs as f32);
                epoch_loss += loss as f64;
                epoch_graphs += graphs;
                steps += 1;
                debug!(epoch, step = steps, loss = loss / graphs as f32, "step");

                if stepwise {
                    if steps >= self.config.steps {
                        break 'epochs;
                    }
                    if is_trigger(steps, valid_freq) {
                        if let Some(source) = valid.as_deref_mut() {
                            let mean = validate(&mut self.featurizer, model, source, &self.objective)?;
                            valid_losses.push(mean);
                            info!(step = steps, valid_loss = mean, "validation");
                        }
                    }
                    if is_trigger(steps, save_freq) {
                        save_model(model, step_checkpoint_path(&log_dir, steps))?;
                    }
                }
            }

            epochs_completed += 1;
            info!(
                epoch,
                steps,
                secs = start.elapsed().as_secs_f32(),
                epoch_avg_loss = epoch_loss / epoch_graphs.max(1) as f64,
                "epoch finished"
            );

            if !stepwise {
                if is_trigger(epoch, valid_freq) {
                    if let Some(source) = valid.as_deref_mut() {
                        let mean = validate(&mut self.featurizer, model, source, &self.objective)?;
                        valid_losses.push(mean);
                        info!(epoch, steps, valid_loss = mean, "validation");
                    }
                }
                if is_trigger(epoch, save_freq) {
                    save_model(model, epoch_checkpoint_path(&log_dir, epoch))?;
                }
            }
        }

        let final_checkpoint = if stepwise {
            step_checkpoint_path(&log_dir, steps)
        } else {
            epoch_checkpoint_path(&log_dir, self.config.epochs)
        };
        save_model(model, &final_checkpoint)?;
        save_losses(train_losses_path(&log_dir), &train_losses)?;
        save_losses(valid_losses_path(&log_dir), &valid_losses)?;
        info!(
            steps,
            epochs = epochs_completed,
            checkpoint = %final_checkpoint.display(),
            "training finished"
        );

        Ok(TrainOutcome {
            train_losses,
            valid_losses,
            steps,
            epochs_completed,
            final_checkpoint,
        })
    }
}

/// Mean loss per graph over every batch of `source`, without updating `model`.
///
/// Batch losses are summed and divided by the total graph count, so batches
/// holding more graphs weigh proportionally more.
pub fn validate<M>(
    featurizer: &mut Featurizer,
    model: &M,
    source: &mut dyn BatchSource,
    objective: &Objective,
) -> Result<f32>
where
    M: RelaxationModel + ?Sized,
{
    let mut total_loss = 0.0f64;
    let mut total_graphs = 0usize;
    for batch in source.batches() {
        let feats = featurizer.featurize_batch(&batch)?;
        let out = model
            .forward_t(&feats.x, &feats.edge_index, &feats.edge_weight, false)?
            .detach();
        total_loss += objective.loss(&out, &batch)?.to_scalar::<f32>()? as f64;
        total_graphs += batch.num_graphs();
    }
    if total_graphs == 0 {
        return Err(Error::InvalidConfig("validation source yields no graphs".into()));
    }
    Ok((total_loss / total_graphs as f64) as f32)
}

/// Run `model` over `source` in order, returning `(output, edge_index)` per
/// batch. Dropout is disabled.
pub fn predict<M>(
    model: &M,
    source: &mut dyn BatchSource,
    featurizer: &mut Featurizer,
) -> Result<Vec<(Tensor, Tensor)>>
where
    M: RelaxationModel + ?Sized,
{
    source
        .batches()
        .map(|batch| {
            let feats = featurizer.featurize_batch(&batch)?;
            let out = model
                .forward_t(&feats.x, &feats.edge_index, &feats.edge_weight, false)?
                .detach();
            Ok((out, feats.edge_index))
        })
        .collect()
}

/// Split batched node rows back into one tensor per graph.
pub fn unbatch_rows(batch: &GraphBatch, x: &Tensor) -> Result<Vec<Tensor>> {
    let (rows, _) = x.dims2()?;
    if rows != batch.num_nodes() {
        return Err(Error::DimensionMismatch {
            expected: batch.num_nodes(),
            got: rows,
        });
    }
    batch
        .graph_ranges()
        .map(|range| Ok(x.narrow(0, range.start, range.len())?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelConfig, RelaxationNet};
    use crate::problem::ProblemType;
    use candle_nn::SGD;
    use gnn4co_core::{Graph, GraphLoader};

    fn path_graph() -> Graph {
        Graph::new(4, vec![(0, 1), (1, 2), (2, 3)]).unwrap().to_undirected()
    }

    fn tiny_model(device: &Device) -> RelaxationNet {
        let config = ModelConfig::default()
            .with_num_layers(2)
            .with_hidden_dim(8)
            .with_dropout(0.0);
        RelaxationNet::new(&config, 2, device, 0).unwrap()
    }

    #[test]
    fn test_is_trigger() {
        assert!(!is_trigger(0, 0));
        assert!(!is_trigger(5, 0));
        assert!(is_trigger(0, 3));
        assert!(is_trigger(6, 3));
        assert!(!is_trigger(7, 3));
    }

    #[test]
    fn test_validation_required_when_frequency_set() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TrainingConfig::default()
            .with_epochs(1)
            .with_validation_every(1)
            .with_log_dir(tmp.path());
        let mut trainer = Trainer::new(config).unwrap();
        let model = tiny_model(trainer.device());
        let mut opt = SGD::new(model.varmap().all_vars(), 0.01).unwrap();
        let mut train = GraphLoader::new(vec![path_graph()], 1).unwrap();
        let err = trainer.fit(&model, &mut opt, &mut train, None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_training_source_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TrainingConfig::default().with_steps(5).with_log_dir(tmp.path());
        let mut trainer = Trainer::new(config).unwrap();
        let model = tiny_model(trainer.device());
        let mut opt = SGD::new(model.varmap().all_vars(), 0.01).unwrap();
        let mut train: Vec<GraphBatch> = Vec::new();
        assert!(trainer.fit(&model, &mut opt, &mut train, None).is_err());
    }

    #[test]
    fn test_epoch_mode_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TrainingConfig::default()
            .with_epochs(3)
            .with_save_every(2)
            .with_log_dir(tmp.path());
        let mut trainer = Trainer::new(config).unwrap();
        let model = tiny_model(trainer.device());
        let mut opt = SGD::new(model.varmap().all_vars(), 0.01).unwrap();
        let mut train = GraphLoader::new(vec![path_graph(), path_graph(), path_graph()], 2).unwrap();

        let outcome = trainer.fit(&model, &mut opt, &mut train, None).unwrap();
        assert_eq!(outcome.steps, 6);
        assert_eq!(outcome.epochs_completed, 3);
        assert_eq!(outcome.train_losses.len(), 6);
        assert!(outcome.valid_losses.is_empty());
        // epochs 0 and 2 trigger, plus the final save.
        assert!(tmp.path().join("model_ep0.safetensors").exists());
        assert!(!tmp.path().join("model_ep1.safetensors").exists());
        assert!(tmp.path().join("model_ep2.safetensors").exists());
        assert_eq!(outcome.final_checkpoint, tmp.path().join("model_ep3.safetensors"));
        assert!(outcome.final_checkpoint.exists());
    }

    #[test]
    fn test_stepwise_stops_before_target_step_actions() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TrainingConfig::default()
            .with_problem_type(ProblemType::VertexCover)
            .with_steps(4)
            .with_validation_every(2)
            .with_save_every(2)
            .with_log_dir(tmp.path());
        let mut trainer = Trainer::new(config).unwrap();
        let model = tiny_model(trainer.device());
        let mut opt = SGD::new(model.varmap().all_vars(), 0.01).unwrap();
        let mut train = GraphLoader::new(vec![path_graph(); 3], 1).unwrap();
        let mut valid = GraphLoader::new(vec![path_graph()], 1).unwrap();

        let outcome = trainer
            .fit(&model, &mut opt, &mut train, Some(&mut valid))
            .unwrap();
        assert_eq!(outcome.steps, 4);
        assert_eq!(outcome.epochs_completed, 1);
        // step 2 validates and saves; step 4 ends the run first.
        assert_eq!(outcome.valid_losses.len(), 1);
        assert!(tmp.path().join("model_step2.safetensors").exists());
        assert_eq!(outcome.final_checkpoint, tmp.path().join("model_step4.safetensors"));
        assert!(outcome.final_checkpoint.exists());
    }

    #[test]
    fn test_validate_leaves_parameters_untouched() {
        let model = tiny_model(&Device::Cpu);
        let before: Vec<Vec<f32>> = model
            .varmap()
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap())
            .collect();

        let mut featurizer = Featurizer::new(2, Device::Cpu, 0).unwrap();
        let objective = Objective::new(ProblemType::MaxCut, 2.0).unwrap();
        let mut source = GraphLoader::new(vec![path_graph(); 2], 1).unwrap();
        validate(&mut featurizer, &model, &mut source, &objective).unwrap();

        let after: Vec<Vec<f32>> = model
            .varmap()
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_predict_preserves_order_and_shapes() {
        let model = tiny_model(&Device::Cpu);
        let mut featurizer = Featurizer::new(2, Device::Cpu, 0).unwrap();
        let small = Graph::new(2, vec![(0, 1), (1, 0)]).unwrap();
        let mut source = vec![
            GraphBatch::from_graph(path_graph()),
            GraphBatch::from_graph(small),
        ];
        let out = predict(&model, &mut source, &mut featurizer).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0.dims(), &[4, 2]);
        assert_eq!(out[0].1.dims(), &[2, 6]);
        assert_eq!(out[1].0.dims(), &[2, 2]);
        assert_eq!(out[1].1.dims(), &[2, 2]);
    }

    #[test]
    fn test_unbatch_rows() {
        let batch = GraphBatch::from_graphs(&[path_graph(), Graph::empty(2)]);
        let x = Tensor::arange(0f32, 12.0, &Device::Cpu).unwrap().reshape((6, 2)).unwrap();
        let parts = unbatch_rows(&batch, &x).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].dims(), &[4, 2]);
        assert_eq!(parts[1].to_vec2::<f32>().unwrap(), vec![vec![8.0, 9.0], vec![10.0, 11.0]]);
    }

    #[test]
    fn test_train_step_changes_parameters() {
        let model = tiny_model(&Device::Cpu);
        let mut trainer = Trainer::new(TrainingConfig::default()).unwrap();
        let mut opt = SGD::new(model.varmap().all_vars(), 0.1).unwrap();
        let snapshot = |m: &RelaxationNet| -> Vec<Vec<f32>> {
            m.varmap()
                .all_vars()
                .iter()
                .map(|v| v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap())
                .collect()
        };

        let before = snapshot(&model);
        let loss = trainer
            .train_step(&model, &mut opt, &GraphBatch::from_graph(path_graph()))
            .unwrap();
        assert!(loss.is_finite());
        assert_ne!(before, snapshot(&model));
    }
}
