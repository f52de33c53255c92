//! Random initial embeddings for each batch.

use crate::error::{Error, Result};
use candle_core::{Device, Tensor};
use gnn4co_core::GraphBatch;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xorshift::XorShiftRng;

/// Model inputs for one batch.
#[derive(Debug, Clone)]
pub struct Features {
    /// Random unit rows, shape (N, r). Never receives gradients.
    pub x: Tensor,
    /// Edge list, shape (2, E), `u32`.
    pub edge_index: Tensor,
    /// Unit edge weights, shape (E,).
    pub edge_weight: Tensor,
}

/// Draws fresh featurizations from an explicit, seeded RNG.
///
/// Normal samples are drawn on the host and uploaded, so the same seed
/// reproduces the same inputs on every device.
#[derive(Debug, Clone)]
pub struct Featurizer {
    rank: usize,
    device: Device,
    rng: XorShiftRng,
}

impl Featurizer {
    pub fn new(rank: usize, device: Device, seed: u64) -> Result<Self> {
        if rank == 0 {
            return Err(Error::InvalidConfig("rank must be > 0".into()));
        }
        Ok(Self {
            rank,
            device,
            rng: XorShiftRng::seed_from_u64(seed),
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Featurize a batch: N x r standard-normal rows scaled to unit length,
    /// the edge list on the target device, and all-ones edge weights.
    pub fn featurize_batch(&mut self, batch: &GraphBatch) -> Result<Features> {
        batch.validate()?;
        let n = batch.num_nodes();
        let e = batch.edge_count();

        let x = Tensor::from_vec(self.unit_rows(n), (n, self.rank), &self.device)?;
        let edge_index = Tensor::from_vec(batch.edge_index_u32(), (2, e), &self.device)?;
        let edge_weight = Tensor::ones(e, candle_core::DType::F32, &self.device)?;

        Ok(Features {
            x,
            edge_index,
            edge_weight,
        })
    }

    fn unit_rows(&mut self, n: usize) -> Vec<f32> {
        let r = self.rank;
        let mut data: Vec<f32> = (0..n * r).map(|_| self.rng.sample(StandardNormal)).collect();
        for row in data.chunks_mut(r) {
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-12);
            row.iter_mut().for_each(|v| *v /= norm);
        }
        data
    }
}
