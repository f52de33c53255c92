//! Message-passing layers over an edge list.
//!
//! Layers take node features `x` (N x d), an edge list `edge_index`
//! (2 x E, `u32`, row 0 = source, row 1 = target) and per-edge weights
//! (E,). Aggregation is a scatter-sum along targets, so no N x N matrix is
//! ever built and gradients flow through `index_select` / `index_add`.
//!
//! ```text
//! h_i^{(l+1)} = UPDATE(h_i^{(l)}, Σ_{(j, i) ∈ E} w_ji · MESSAGE(h_j^{(l)}))
//! ```

use candle_core::{DType, Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Weighted sum of source features into each target node.
///
/// `out_i = Σ_{(j, i) ∈ E} w_ji · x_j`, shape (N, d).
pub fn scatter_sum(x: &Tensor, edge_index: &Tensor, edge_weight: &Tensor) -> Result<Tensor> {
    let (n, d) = x.dims2()?;
    let zeros = Tensor::zeros((n, d), x.dtype(), x.device())?;
    if edge_index.dim(1)? == 0 {
        return Ok(zeros);
    }

    let src = edge_index.get(0)?;
    let dst = edge_index.get(1)?;
    let messages = x
        .index_select(&src, 0)?
        .broadcast_mul(&edge_weight.unsqueeze(1)?)?;
    zeros.index_add(&dst, &messages, 0)
}

/// Weighted in-degree per node, shape (N,).
pub fn weighted_degree(n: usize, edge_index: &Tensor, edge_weight: &Tensor) -> Result<Tensor> {
    let zeros = Tensor::zeros(n, edge_weight.dtype(), edge_weight.device())?;
    if edge_index.dim(1)? == 0 {
        return Ok(zeros);
    }
    zeros.index_add(&edge_index.get(1)?, edge_weight, 0)
}

/// Scale each row to unit L2 norm.
pub fn normalize_rows(x: &Tensor) -> Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?;
    x.broadcast_div(&(norm + 1e-6)?)
}

/// Graph Convolutional Network layer.
///
/// Implements: H' = D^{-1/2} (A + I) D^{-1/2} H W
///
/// with `D` the weighted degree including the self-loop.
///
/// # Reference
///
/// Kipf & Welling, "Semi-Supervised Classification with Graph Convolutional
/// Networks", ICLR 2017.
pub struct GCNConv {
    linear: Linear,
}

impl GCNConv {
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let linear = linear(in_features, out_features, vb)?;
        Ok(Self { linear })
    }

    pub fn forward(&self, x: &Tensor, edge_index: &Tensor, edge_weight: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;
        let h = self.linear.forward(x)?;

        // Self-loops contribute weight 1 to every degree.
        let deg = (weighted_degree(n, edge_index, edge_weight)? + 1.0)?;
        let inv_sqrt = deg.sqrt()?.recip()?;

        let self_term = h.broadcast_mul(&inv_sqrt.sqr()?.unsqueeze(1)?)?;
        if edge_index.dim(1)? == 0 {
            return Ok(self_term);
        }

        let src = edge_index.get(0)?;
        let dst = edge_index.get(1)?;
        let coef = ((inv_sqrt.index_select(&src, 0)? * edge_weight)? * inv_sqrt.index_select(&dst, 0)?)?;
        let neighbors = scatter_sum(&h, edge_index, &coef)?;
        self_term + neighbors
    }
}

/// Graph Isomorphism Network layer.
///
/// ```text
/// h_v' = MLP((1 + ε) · h_v + Σ_{u∈N(v)} w_uv · h_u)
/// ```
///
/// Sum aggregation keeps neighbour multisets distinguishable, and the
/// 2-layer MLP makes the update injective.
///
/// # Reference
///
/// Xu et al., "How Powerful are Graph Neural Networks?", ICLR 2019.
pub struct GINConv {
    mlp: [Linear; 2],
    eps: Tensor,
}

impl GINConv {
    /// Create a GIN layer. `learn_eps = false` fixes ε at 0.
    pub fn new(
        in_features: usize,
        hidden_features: usize,
        out_features: usize,
        learn_eps: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mlp = [
            linear(in_features, hidden_features, vb.pp("mlp_0"))?,
            linear(hidden_features, out_features, vb.pp("mlp_1"))?,
        ];
        let eps = if learn_eps {
            vb.get_with_hints(1, "eps", candle_nn::Init::Const(0.0))?
        } else {
            Tensor::zeros(1, DType::F32, vb.device())?
        };
        Ok(Self { mlp, eps })
    }

    pub fn forward(&self, x: &Tensor, edge_index: &Tensor, edge_weight: &Tensor) -> Result<Tensor> {
        let neighbor_sum = scatter_sum(x, edge_index, edge_weight)?;
        // Broadcast keeps ε differentiable.
        let self_contrib = x.broadcast_mul(&(&self.eps + 1.0)?)?;
        let combined = (self_contrib + neighbor_sum)?;

        let h = self.mlp[0].forward(&combined)?.relu()?;
        self.mlp[1].forward(&h)
    }
}

/// Aggregation function for [`SAGEConv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    /// Weighted mean of neighbour features.
    Mean,
    /// Weighted sum of neighbour features.
    Sum,
}

/// GraphSAGE layer: separate transforms for self and aggregated neighbours.
///
/// ```text
/// h_i' = W_self h_i + W_neigh AGG({w_ji h_j : (j, i) ∈ E})
/// ```
///
/// # Reference
///
/// Hamilton et al., "Inductive Representation Learning on Large Graphs",
/// NeurIPS 2017.
pub struct SAGEConv {
    lin_self: Linear,
    lin_neighbor: Linear,
    aggregator: Aggregator,
}

impl SAGEConv {
    pub fn new(
        in_features: usize,
        out_features: usize,
        aggregator: Aggregator,
        vb: VarBuilder,
    ) -> Result<Self> {
        let lin_self = linear(in_features, out_features, vb.pp("lin_self"))?;
        let lin_neighbor = linear(in_features, out_features, vb.pp("lin_neighbor"))?;
        Ok(Self {
            lin_self,
            lin_neighbor,
            aggregator,
        })
    }

    pub fn forward(&self, x: &Tensor, edge_index: &Tensor, edge_weight: &Tensor) -> Result<Tensor> {
        let h_self = self.lin_self.forward(x)?;

        let agg = scatter_sum(x, edge_index, edge_weight)?;
        let agg = match self.aggregator {
            Aggregator::Sum => agg,
            Aggregator::Mean => {
                let deg = weighted_degree(x.dim(0)?, edge_index, edge_weight)?;
                // Isolated nodes keep a zero aggregate.
                let deg = deg.maximum(1e-6)?.unsqueeze(1)?;
                agg.broadcast_div(&deg)?
            }
        };

        h_self + self.lin_neighbor.forward(&agg)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    fn path_edges(device: &Device) -> (Tensor, Tensor) {
        let index = Tensor::new(&[[0u32, 1, 1, 2], [1, 0, 2, 1]], device).unwrap();
        let weight = Tensor::ones(4, DType::F32, device).unwrap();
        (index, weight)
    }

    #[test]
    fn test_scatter_sum_values() {
        let device = Device::Cpu;
        let (index, weight) = path_edges(&device);
        let x = Tensor::new(&[[1f32], [10.0], [100.0]], &device).unwrap();
        let out = scatter_sum(&x, &index, &weight).unwrap();
        assert_eq!(out.to_vec2::<f32>().unwrap(), vec![vec![10.0], vec![101.0], vec![10.0]]);
    }

    #[test]
    fn test_scatter_sum_without_edges() {
        let device = Device::Cpu;
        let index = Tensor::zeros((2, 0), DType::U32, &device).unwrap();
        let weight = Tensor::zeros(0, DType::F32, &device).unwrap();
        let x = Tensor::ones((3, 2), DType::F32, &device).unwrap();
        let out = scatter_sum(&x, &index, &weight).unwrap();
        assert_eq!(out.to_vec2::<f32>().unwrap(), vec![vec![0.0; 2]; 3]);
    }

    #[test]
    fn test_weighted_degree() {
        let device = Device::Cpu;
        let index = Tensor::new(&[[0u32, 1, 1, 2], [1, 0, 2, 1]], &device).unwrap();
        let weight = Tensor::new(&[1f32, 2.0, 3.0, 4.0], &device).unwrap();
        let deg = weighted_degree(3, &index, &weight).unwrap();
        assert_eq!(deg.to_vec1::<f32>().unwrap(), vec![2.0, 5.0, 3.0]);
    }

    #[test]
    fn test_normalize_rows() {
        let x = Tensor::new(&[[3f32, 4.0], [0.0, 2.0]], &Device::Cpu).unwrap();
        let out = normalize_rows(&x).unwrap().to_vec2::<f32>().unwrap();
        assert!((out[0][0] - 0.6).abs() < 1e-5);
        assert!((out[1][1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_gcn_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let gcn = GCNConv::new(4, 8, vb).unwrap();

        let (index, weight) = path_edges(&device);
        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let out = gcn.forward(&x, &index, &weight).unwrap();
        assert_eq!(out.dims(), &[3, 8]);
    }

    #[test]
    fn test_gin_forward_shape_and_eps_var() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let gin = GINConv::new(4, 16, 4, true, vb).unwrap();

        let (index, weight) = path_edges(&device);
        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let out = gin.forward(&x, &index, &weight).unwrap();
        assert_eq!(out.dims(), &[3, 4]);
        // Two linears (weight + bias each) and ε.
        assert_eq!(varmap.all_vars().len(), 5);
    }

    #[test]
    fn test_sage_mean_vs_sum() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let mean = SAGEConv::new(2, 2, Aggregator::Mean, vb.pp("mean")).unwrap();
        let sum = SAGEConv::new(2, 2, Aggregator::Sum, vb.pp("sum")).unwrap();

        let (index, weight) = path_edges(&device);
        let x = Tensor::randn(0f32, 1f32, (3, 2), &device).unwrap();
        assert_eq!(mean.forward(&x, &index, &weight).unwrap().dims(), &[3, 2]);
        assert_eq!(sum.forward(&x, &index, &weight).unwrap().dims(), &[3, 2]);
    }

    #[test]
    fn test_gradients_reach_parameters() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let gcn = GCNConv::new(2, 2, vb).unwrap();

        let (index, weight) = path_edges(&device);
        let x = Tensor::randn(0f32, 1f32, (3, 2), &device).unwrap();
        let loss = gcn.forward(&x, &index, &weight).unwrap().sqr().unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        for var in varmap.all_vars() {
            assert!(grads.get(var.as_tensor()).is_some());
        }
    }
}
