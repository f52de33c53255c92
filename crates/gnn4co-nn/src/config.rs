//! Training configuration.

use crate::error::{Error, Result};
use crate::problem::{ProblemType, DEFAULT_PENALTY};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Compute target for tensors and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    /// CUDA device by ordinal; falls back to CPU when CUDA is not compiled in.
    Cuda(usize),
}

impl DeviceSpec {
    pub fn resolve(&self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(ordinal) => Ok(Device::cuda_if_available(*ordinal)?),
        }
    }
}

/// Training configuration.
///
/// Periodic actions use a frequency of 0 to mean "never". In epoch mode
/// `valid_epochs` / `save_epochs` apply; in step-wise mode (`stepwise`)
/// training stops after `steps` optimizer steps and `valid_freq` /
/// `save_freq` count steps instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Problem to relax (default: max_cut).
    pub problem_type: ProblemType,
    /// Penalty coefficient for vertex cover / max clique (default: 2.0).
    pub vc_penalty: f64,
    /// Columns r of the embedding matrix (default: 2).
    pub rank: usize,
    /// Compute target (default: CPU).
    pub device: DeviceSpec,
    /// Number of epochs in epoch mode (default: 100).
    pub epochs: usize,
    /// Target optimizer steps in step-wise mode (default: 1000).
    pub steps: usize,
    /// Validate every N epochs (default: 0, never).
    pub valid_epochs: usize,
    /// Validate every N steps in step-wise mode (default: 0, never).
    pub valid_freq: usize,
    /// Checkpoint every N epochs (default: 0, never).
    pub save_epochs: usize,
    /// Checkpoint every N steps in step-wise mode (default: 0, never).
    pub save_freq: usize,
    /// Step-wise instead of epoch-wise control (default: false).
    pub stepwise: bool,
    /// Directory for checkpoints and loss histories.
    pub log_dir: PathBuf,
    /// Optimizer learning rate (default: 0.001).
    pub learning_rate: f64,
    /// Seed for featurization, parameter initialisation and dropout masks
    /// (default: 0).
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            problem_type: ProblemType::MaxCut,
            vc_penalty: DEFAULT_PENALTY,
            rank: 2,
            device: DeviceSpec::Cpu,
            epochs: 100,
            steps: 1000,
            valid_epochs: 0,
            valid_freq: 0,
            save_epochs: 0,
            save_freq: 0,
            stepwise: false,
            log_dir: PathBuf::from("training_runs"),
            learning_rate: 0.001,
            seed: 0,
        }
    }
}

impl TrainingConfig {
    pub fn with_problem_type(mut self, problem_type: ProblemType) -> Self {
        self.problem_type = problem_type;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.vc_penalty = penalty;
        self
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self.stepwise = false;
        self
    }

    /// Switch to step-wise control with a target step count.
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self.stepwise = true;
        self
    }

    /// Validation frequency in the active unit (epochs or steps).
    pub fn with_validation_every(mut self, n: usize) -> Self {
        if self.stepwise {
            self.valid_freq = n;
        } else {
            self.valid_epochs = n;
        }
        self
    }

    /// Checkpoint frequency in the active unit (epochs or steps).
    pub fn with_save_every(mut self, n: usize) -> Self {
        if self.stepwise {
            self.save_freq = n;
        } else {
            self.save_epochs = n;
        }
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validation frequency of the active mode.
    pub fn validation_frequency(&self) -> usize {
        if self.stepwise {
            self.valid_freq
        } else {
            self.valid_epochs
        }
    }

    /// Checkpoint frequency of the active mode.
    pub fn save_frequency(&self) -> usize {
        if self.stepwise {
            self.save_freq
        } else {
            self.save_epochs
        }
    }

    /// Reject configurations that cannot train, before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.rank == 0 {
            return Err(Error::InvalidConfig("rank must be > 0".into()));
        }
        if !self.vc_penalty.is_finite() || self.vc_penalty < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "vc_penalty must be finite and >= 0, got {}",
                self.vc_penalty
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if self.stepwise && self.steps == 0 {
            return Err(Error::InvalidConfig("steps must be > 0 in step-wise mode".into()));
        }
        Ok(())
    }
}
