//! Relaxation models: (embeddings, edge list, edge weights) -> embeddings.

use crate::conv::{normalize_rows, Aggregator, GCNConv, GINConv, SAGEConv};
use crate::error::{Error, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// A differentiable map from relaxation inputs to relaxation outputs.
///
/// Parameters live in a [`VarMap`] owned by the model; checkpointing and the
/// optimizer both go through it.
pub trait RelaxationModel {
    /// Forward pass. `train` enables dropout.
    ///
    /// - `x`: (N, r) input embeddings
    /// - `edge_index`: (2, E) `u32` edge list
    /// - `edge_weight`: (E,) edge weights
    ///
    /// Returns an (N, r) output embedding.
    fn forward_t(&self, x: &Tensor, edge_index: &Tensor, edge_weight: &Tensor, train: bool) -> Result<Tensor>;

    /// Parameter store.
    fn varmap(&self) -> &VarMap;

    /// Mutable parameter store, for loading checkpoints in place.
    fn varmap_mut(&mut self) -> &mut VarMap;

    /// Device the parameters live on.
    fn device(&self) -> &Device;
}

/// Message-passing architecture of a [`RelaxationNet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Plain message passing: self transform plus summed neighbours.
    #[default]
    Mp,
    Gin,
    Gcn,
    /// GraphSAGE with mean aggregation.
    Sage,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [Self::Mp, Self::Gin, Self::Gcn, Self::Sage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp => "mp",
            Self::Gin => "gin",
            Self::Gcn => "gcn",
            Self::Sage => "sage",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| Error::UnknownModelType(s.to_string()))
    }
}

/// Architecture hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Layer type (default: mp).
    pub model_type: ModelType,
    /// Number of message-passing layers (default: 12).
    pub num_layers: usize,
    /// Hidden width (default: 32).
    pub hidden_dim: usize,
    /// Dropout probability between layers (default: 0.1).
    pub dropout: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::Mp,
            num_layers: 12,
            hidden_dim: 32,
            dropout: 0.1,
        }
    }
}

impl ModelConfig {
    pub fn with_model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hidden_dim == 0 {
            return Err(Error::InvalidConfig("hidden_dim must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

enum Layer {
    Gcn(GCNConv),
    Gin(GINConv),
    Sage(SAGEConv),
}

impl Layer {
    fn new(model_type: ModelType, dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(match model_type {
            ModelType::Mp => Self::Sage(SAGEConv::new(dim, dim, Aggregator::Sum, vb)?),
            ModelType::Sage => Self::Sage(SAGEConv::new(dim, dim, Aggregator::Mean, vb)?),
            ModelType::Gcn => Self::Gcn(GCNConv::new(dim, dim, vb)?),
            ModelType::Gin => Self::Gin(GINConv::new(dim, dim, dim, true, vb)?),
        })
    }

    fn forward(&self, x: &Tensor, edge_index: &Tensor, edge_weight: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Gcn(l) => l.forward(x, edge_index, edge_weight),
            Self::Gin(l) => l.forward(x, edge_index, edge_weight),
            Self::Sage(l) => l.forward(x, edge_index, edge_weight),
        }
    }
}

/// Inverted dropout whose masks come from a seeded RNG, so a training run is
/// reproducible from its seed.
struct SeededDropout {
    p: f32,
    rng: Mutex<XorShiftRng>,
}

impl SeededDropout {
    fn new(p: f32, seed: u64) -> Self {
        Self {
            p,
            rng: Mutex::new(XorShiftRng::seed_from_u64(seed)),
        }
    }

    fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        if !train {
            return Ok(x.clone());
        }
        let keep = 1.0 - self.p;
        let mask: Vec<f32> = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| Error::Training("dropout RNG lock poisoned".into()))?;
            (0..x.elem_count())
                .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
                .collect()
        };
        let mask = Tensor::from_vec(mask, x.shape().clone(), x.device())?.to_dtype(x.dtype())?;
        Ok((x * mask)?)
    }
}

/// Stack of message-passing layers between rank-r input and output
/// projections.
///
/// ```text
/// x (N, r) -> Linear -> [conv -> ReLU -> dropout, + residual] x L -> Linear -> unit rows (N, r)
/// ```
///
/// Output rows are scaled to unit length, the feasible set of the vector
/// relaxation. Parameter initialisation and dropout masks both derive from
/// the construction seed.
pub struct RelaxationNet {
    input: Linear,
    layers: Vec<Layer>,
    output: Linear,
    dropout: Option<SeededDropout>,
    varmap: VarMap,
    device: Device,
    rank: usize,
}

impl RelaxationNet {
    /// Build a model on `device`, initialising parameters from `seed`.
    pub fn new(config: &ModelConfig, rank: usize, device: &Device, seed: u64) -> Result<Self> {
        config.validate()?;
        if rank == 0 {
            return Err(Error::InvalidConfig("rank must be > 0".into()));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let dim = config.hidden_dim;

        let input = linear(rank, dim, vb.pp("input"))?;
        let layers = (0..config.num_layers)
            .map(|i| Layer::new(config.model_type, dim, vb.pp(format!("layer_{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let output = linear(dim, rank, vb.pp("output"))?;
        let mut rng = XorShiftRng::seed_from_u64(seed);
        reseed_parameters(&varmap, &mut rng)?;
        let dropout = (config.dropout > 0.0).then(|| SeededDropout::new(config.dropout, rng.gen()));

        Ok(Self {
            input,
            layers,
            output,
            dropout,
            varmap,
            device: device.clone(),
            rank,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl RelaxationModel for RelaxationNet {
    fn forward_t(&self, x: &Tensor, edge_index: &Tensor, edge_weight: &Tensor, train: bool) -> Result<Tensor> {
        let (_, r) = x.dims2()?;
        if r != self.rank {
            return Err(Error::DimensionMismatch {
                expected: self.rank,
                got: r,
            });
        }

        let mut h = self.input.forward(x)?;
        for layer in &self.layers {
            let mut update = layer.forward(&h, edge_index, edge_weight)?.relu()?;
            if let Some(dropout) = &self.dropout {
                update = dropout.forward(&update, train)?;
            }
            h = (h + update)?;
        }
        let out = self.output.forward(&h)?;
        Ok(normalize_rows(&out)?)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Overwrite every parameter with seeded values.
///
/// Weights and biases get U(-1/√fan_in, 1/√fan_in) with fan_in the last
/// dimension; GIN's ε starts at 0. Variables are visited in name order so a
/// seed always produces the same model.
pub fn reseed_parameters<R: Rng>(varmap: &VarMap, rng: &mut R) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| Error::Training("parameter store lock poisoned".into()))?;

    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    for name in names {
        let var = &data[name];
        let shape = var.shape().clone();
        let count = shape.elem_count();
        let values: Vec<f32> = if name.ends_with("eps") {
            vec![0.0; count]
        } else {
            let fan_in = shape.dims().last().copied().unwrap_or(1).max(1);
            let bound = 1.0 / (fan_in as f32).sqrt();
            (0..count).map(|_| rng.gen_range(-bound..=bound)).collect()
        };
        var.set(&Tensor::from_vec(values, shape, var.device())?)?;
    }
    Ok(())
}
