//! Unsupervised objectives over relaxed node embeddings.
//!
//! Every node `i` carries a row `x_i` of an (N, r) embedding matrix `X`.
//! A discrete solution is the special case where each row is `±e1`; the
//! losses below are smooth in `X`, so a model producing `X` can be trained
//! by gradient descent without labels.
//!
//! # Max-cut
//!
//! ```text
//! loss(X) = trace(A X Xᵗ) / 2 = Σ_{(i,j) ∈ E} w_ij ⟨x_i, x_j⟩ / 2
//! ```
//!
//! With both directions of every edge in the edge list, each undirected edge
//! contributes `w_ij ⟨x_i, x_j⟩` once. Minimising it pushes neighbours to
//! opposite sides of the cut.
//!
//! # Vertex cover (augmented Lagrangian, fixed penalty)
//!
//! The first column is a soft inclusion indicator: `x_i = e1` means "in the
//! cover", `x_i = -e1` means "out".
//!
//! ```text
//! linear  = Σ_i w_i (1 + X[i, 0]) / 2
//! phi_ij  = ⟨x_i - e1, x_j - e1⟩                  for (i, j) ∈ E
//! augment = penalty · Σ_ij A_ij phi_ij² / 4
//! loss    = linear + augment
//! ```
//!
//! `phi_ij` is zero when either endpoint is `e1` and grows for uncovered
//! edges. The `/ 4` is `/ 2` for the symmetric double count times the `1/2`
//! of the quadratic penalty.
//!
//! # Max-clique
//!
//! A clique in `G` is an independent set in the complement, so max-clique is
//! vertex cover on the complement graph. [`max_clique_loss`] expects the
//! complement already; it never complements by itself.

use crate::embedding::{normalize_embedding, EmbeddingInput};
use crate::error::{Error, Result};
use crate::problem::{ProblemType, DEFAULT_PENALTY};
use candle_core::{Device, Tensor};
use gnn4co_core::GraphBatch;
use std::fmt;

fn check_rows(x: &Tensor, batch: &GraphBatch) -> Result<(usize, usize)> {
    batch.validate()?;
    let (n, r) = x.dims2()?;
    if n != batch.num_nodes() {
        return Err(Error::DimensionMismatch {
            expected: batch.num_nodes(),
            got: n,
        });
    }
    Ok((n, r))
}

fn endpoints(batch: &GraphBatch, device: &Device) -> Result<(Tensor, Tensor)> {
    let e = batch.edge_count();
    let index = Tensor::from_vec(batch.edge_index_u32(), (2, e), device)?;
    Ok((index.get(0)?, index.get(1)?))
}

/// Dense N x N adjacency with per-edge weights, duplicates summed.
pub fn weighted_adjacency(batch: &GraphBatch, device: &Device) -> Result<Tensor> {
    batch.validate()?;
    let n = batch.num_nodes();
    let mut dense = vec![0f32; n * n];
    for (&(u, v), w) in batch.edges().iter().zip(batch.edge_weight_or_ones()) {
        dense[u * n + v] += w;
    }
    Ok(Tensor::from_vec(dense, (n, n), device)?)
}

/// Dense N x N adjacency ignoring edge weights, duplicates summed.
pub fn dense_adjacency(batch: &GraphBatch, device: &Device) -> Result<Tensor> {
    batch.validate()?;
    let n = batch.num_nodes();
    let mut dense = vec![0f32; n * n];
    for &(u, v) in batch.edges() {
        dense[u * n + v] += 1.0;
    }
    Ok(Tensor::from_vec(dense, (n, n), device)?)
}

/// Max-cut loss `trace(A X Xᵗ) / 2` with the weighted adjacency of `batch`.
///
/// The sparse operator is applied edge-wise (gather both endpoints, dot,
/// weight), which equals the trace form for any edge multiset.
pub fn max_cut_loss(x: &Tensor, batch: &GraphBatch) -> Result<Tensor> {
    check_rows(x, batch)?;
    let device = x.device();

    if batch.edge_count() == 0 {
        // Keep the loss attached to X so backward still sees it.
        return Ok((x.sum_all()? * 0.0)?);
    }

    let (src, dst) = endpoints(batch, device)?;
    let weight = Tensor::from_vec(batch.edge_weight_or_ones(), batch.edge_count(), device)?;

    let dots = (x.index_select(&src, 0)? * x.index_select(&dst, 0)?)?.sum(1)?;
    let obj = (dots * weight)?.sum_all()?;
    Ok((obj * 0.5)?)
}

/// Vertex-cover loss: weighted soft cover size plus a fixed-penalty
/// augmented term for uncovered edges. Edge weights are ignored; node
/// weights default to one.
pub fn vertex_cover_loss(x: &Tensor, batch: &GraphBatch, penalty: f64) -> Result<Tensor> {
    let (n, r) = check_rows(x, batch)?;
    let device = x.device();

    let adj = dense_adjacency(batch, device)?;
    let node_weight = Tensor::from_vec(batch.node_weight_or_ones(), n, device)?;

    let indicator = x.narrow(1, 0, 1)?.squeeze(1)?;
    let linear = (((indicator + 1.0)? * node_weight)?.sum_all()? * 0.5)?;

    let mut e1 = vec![0f32; n * r];
    for row in e1.chunks_mut(r) {
        row[0] = 1.0;
    }
    let e1 = Tensor::from_vec(e1, (n, r), device)?;
    let xm = (x - e1)?;
    let gram = xm.matmul(&xm.t()?)?;
    let phi_square = (adj * gram.sqr()?)?;

    let augment = (phi_square.sum_all()? * (penalty / 4.0))?;
    Ok((linear + augment)?)
}

/// Max-clique loss on the complement graph; same computation as
/// [`vertex_cover_loss`].
pub fn max_clique_loss(x: &Tensor, complement: &GraphBatch, penalty: f64) -> Result<Tensor> {
    vertex_cover_loss(x, complement, penalty)
}

/// Estimated number of cut edge entries: `(E - max_cut_loss) / 2`.
pub fn max_cut_score(x: impl Into<EmbeddingInput>, example: &GraphBatch) -> Result<f32> {
    let x = normalize_embedding(x, &Device::Cpu)?;
    let loss = max_cut_loss(&x, example)?.to_scalar::<f32>()?;
    Ok((example.edge_count() as f32 - loss) / 2.0)
}

/// Negated vertex-cover objective (higher is better). Mixes the cover-size
/// estimate with the penalty term.
///
/// Scores always use [`DEFAULT_PENALTY`], whatever penalty the model was
/// trained with, so runs with different penalties report comparable numbers.
pub fn vertex_cover_score(x: impl Into<EmbeddingInput>, example: &GraphBatch) -> Result<f32> {
    let x = normalize_embedding(x, &Device::Cpu)?;
    let loss = vertex_cover_loss(&x, example, DEFAULT_PENALTY)?.to_scalar::<f32>()?;
    Ok(-loss)
}

/// Estimated clique size `N - vertex_cover_loss(complement)`, at
/// [`DEFAULT_PENALTY`].
pub fn max_clique_score(x: impl Into<EmbeddingInput>, complement: &GraphBatch) -> Result<f32> {
    let x = normalize_embedding(x, &Device::Cpu)?;
    let loss = vertex_cover_loss(&x, complement, DEFAULT_PENALTY)?.to_scalar::<f32>()?;
    Ok(complement.num_nodes() as f32 - loss)
}

type LossFn = fn(&Tensor, &GraphBatch, f64) -> Result<Tensor>;
type ScoreFn = fn(EmbeddingInput, &GraphBatch) -> Result<f32>;

fn max_cut_loss_with(x: &Tensor, batch: &GraphBatch, _penalty: f64) -> Result<Tensor> {
    max_cut_loss(x, batch)
}

fn max_cut_score_with(x: EmbeddingInput, example: &GraphBatch) -> Result<f32> {
    max_cut_score(x, example)
}

fn vertex_cover_score_with(x: EmbeddingInput, example: &GraphBatch) -> Result<f32> {
    vertex_cover_score(x, example)
}

fn max_clique_score_with(x: EmbeddingInput, complement: &GraphBatch) -> Result<f32> {
    max_clique_score(x, complement)
}

/// Loss and score pair of one problem type, resolved once.
#[derive(Clone, Copy)]
pub struct Objective {
    problem: ProblemType,
    penalty: f64,
    loss_fn: LossFn,
    score_fn: ScoreFn,
}

impl Objective {
    /// Resolve the objective of `problem`. `penalty` is ignored for max-cut.
    pub fn new(problem: ProblemType, penalty: f64) -> Result<Self> {
        if !penalty.is_finite() || penalty < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "penalty must be finite and >= 0, got {penalty}"
            )));
        }

        let (loss_fn, score_fn) = match problem {
            ProblemType::MaxCut => (max_cut_loss_with as LossFn, max_cut_score_with as ScoreFn),
            ProblemType::VertexCover => (vertex_cover_loss as LossFn, vertex_cover_score_with as ScoreFn),
            ProblemType::MaxClique => (max_clique_loss as LossFn, max_clique_score_with as ScoreFn),
        };

        Ok(Self {
            problem,
            penalty,
            loss_fn,
            score_fn,
        })
    }

    pub fn problem(&self) -> ProblemType {
        self.problem
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Differentiable scalar loss of `x` on `batch`.
    pub fn loss(&self, x: &Tensor, batch: &GraphBatch) -> Result<Tensor> {
        (self.loss_fn)(x, batch, self.penalty)
    }

    /// Interpretable score of `x` on a single example. Independent of the
    /// configured penalty.
    pub fn score(&self, x: impl Into<EmbeddingInput>, example: &GraphBatch) -> Result<f32> {
        (self.score_fn)(x.into(), example)
    }
}

impl fmt::Debug for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Objective")
            .field("problem", &self.problem)
            .field("penalty", &self.penalty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Var};
    use gnn4co_core::Graph;

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    fn single_edge() -> GraphBatch {
        GraphBatch::new(2, vec![(0, 1), (1, 0)]).unwrap()
    }

    fn path4() -> GraphBatch {
        GraphBatch::from_graph(
            Graph::new(4, vec![(0, 1), (1, 2), (2, 3)])
                .unwrap()
                .to_undirected(),
        )
    }

    fn matrix(rows: &[[f32; 2]]) -> Tensor {
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(data, (rows.len(), 2), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_max_cut_opposite_rows() {
        let x = matrix(&[[1.0, 0.0], [-1.0, 0.0]]);
        let loss = max_cut_loss(&x, &single_edge()).unwrap();
        assert!((scalar(&loss) + 1.0).abs() < 1e-6);
        // One undirected edge stored twice: E = 2, cut entries = 2.
        assert!((max_cut_score(&x, &single_edge()).unwrap() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_max_cut_matches_dense_trace() {
        let x = matrix(&[[0.6, 0.8], [1.0, 0.0], [-0.28, 0.96], [0.0, -1.0]]);
        let batch = path4().with_edge_weight(vec![1.0, 2.0, 0.5, 1.0, 2.0, 0.5]).unwrap();

        let a = weighted_adjacency(&batch, &Device::Cpu).unwrap();
        let xx = x.matmul(&x.t().unwrap()).unwrap();
        let ax = a.matmul(&xx).unwrap().to_vec2::<f32>().unwrap();
        let trace: f32 = (0..4).map(|i| ax[i][i]).sum::<f32>() / 2.0;

        let loss = scalar(&max_cut_loss(&x, &batch).unwrap());
        assert!((loss - trace).abs() < 1e-5, "{loss} vs {trace}");
    }

    #[test]
    fn test_max_cut_uses_edge_weights() {
        let x = matrix(&[[1.0, 0.0], [1.0, 0.0]]);
        let heavy = single_edge().with_edge_weight(vec![3.0, 3.0]).unwrap();
        assert!((scalar(&max_cut_loss(&x, &heavy).unwrap()) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_max_cut_gradient() {
        let x = Var::from_tensor(&matrix(&[[0.6, 0.8], [1.0, 0.0]])).unwrap();
        let loss = max_cut_loss(x.as_tensor(), &single_edge()).unwrap();
        let grads = loss.backward().unwrap();
        let g = grads.get(x.as_tensor()).unwrap().to_vec2::<f32>().unwrap();
        // d/dx_0 = w x_1, d/dx_1 = w x_0.
        let expected = [[1.0, 0.0], [0.6, 0.8]];
        for (row, want) in g.iter().zip(expected) {
            for (a, b) in row.iter().zip(want) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_max_cut_without_edges_is_zero() {
        let x = matrix(&[[1.0, 0.0], [0.0, 1.0]]);
        let batch = GraphBatch::new(2, vec![]).unwrap();
        assert_eq!(scalar(&max_cut_loss(&x, &batch).unwrap()), 0.0);
        assert_eq!(max_cut_score(&x, &batch).unwrap(), 0.0);
    }

    #[test]
    fn test_row_count_checked() {
        let x = matrix(&[[1.0, 0.0]]);
        assert!(matches!(
            max_cut_loss(&x, &single_edge()),
            Err(Error::DimensionMismatch { expected: 2, got: 1 })
        ));
        assert!(vertex_cover_loss(&x, &single_edge(), DEFAULT_PENALTY).is_err());
    }

    #[test]
    fn test_vertex_cover_all_included_has_no_augment() {
        let x = matrix(&[[1.0, 0.0]; 4]);
        let batch = path4().with_node_weight(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let loss = scalar(&vertex_cover_loss(&x, &batch, 5.0).unwrap());
        assert!((loss - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_vertex_cover_uncovered_edge_penalized() {
        let x = matrix(&[[-1.0, 0.0], [-1.0, 0.0]]);
        // linear = 0; phi = <-2e1, -2e1> = 4; two entries * 16 * 2 / 4 = 16.
        let loss = scalar(&vertex_cover_loss(&x, &single_edge(), 2.0).unwrap());
        assert!((loss - 16.0).abs() < 1e-5);
        assert!((vertex_cover_score(&x, &single_edge()).unwrap() + 16.0).abs() < 1e-5);
    }

    #[test]
    fn test_vertex_cover_one_endpoint_covers() {
        let x = matrix(&[[1.0, 0.0], [-1.0, 0.0]]);
        let loss = scalar(&vertex_cover_loss(&x, &single_edge(), 2.0).unwrap());
        assert!((loss - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vertex_cover_ignores_edge_weights() {
        let x = matrix(&[[0.0, 1.0], [0.6, 0.8]]);
        let plain = scalar(&vertex_cover_loss(&x, &single_edge(), 2.0).unwrap());
        let weighted = single_edge().with_edge_weight(vec![5.0, 5.0]).unwrap();
        let loss = scalar(&vertex_cover_loss(&x, &weighted, 2.0).unwrap());
        assert_eq!(plain, loss);
    }

    #[test]
    fn test_max_clique_score_counts_complement_nodes() {
        // Complement of a triangle has no edges: every node fully included
        // scores N - N = 0, every node excluded scores N - 0 = 3.
        let complement = GraphBatch::new(3, vec![]).unwrap();
        let out = matrix(&[[-1.0, 0.0]; 3]);
        assert!((max_clique_score(&out, &complement).unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_objective_dispatch() {
        let x = matrix(&[[0.6, 0.8], [1.0, 0.0]]);
        let batch = single_edge();
        for problem in ProblemType::ALL {
            let objective = Objective::new(problem, 3.0).unwrap();
            let via_objective = scalar(&objective.loss(&x, &batch).unwrap());
            let direct = match problem {
                ProblemType::MaxCut => max_cut_loss(&x, &batch),
                ProblemType::VertexCover => vertex_cover_loss(&x, &batch, 3.0),
                ProblemType::MaxClique => max_clique_loss(&x, &batch, 3.0),
            };
            assert_eq!(via_objective, scalar(&direct.unwrap()));
        }
    }

    #[test]
    fn test_objective_rejects_negative_penalty() {
        assert!(Objective::new(ProblemType::VertexCover, -1.0).is_err());
        assert!(Objective::new(ProblemType::MaxCut, f64::NAN).is_err());
    }

    #[test]
    fn test_score_accepts_flat_input() {
        let objective = Objective::new(ProblemType::VertexCover, DEFAULT_PENALTY).unwrap();
        let flat = objective.score(vec![0.5f32, -0.25], &single_edge()).unwrap();
        let column = Tensor::new(&[[0.5f32], [-0.25]], &Device::Cpu).unwrap();
        let col = objective.score(column, &single_edge()).unwrap();
        assert_eq!(flat, col);
    }

    #[test]
    fn test_score_penalty_is_fixed_at_default() {
        let x = matrix(&[[-1.0, 0.0], [0.6, 0.8]]);
        let batch = single_edge();
        let at_default = scalar(&vertex_cover_loss(&x, &batch, DEFAULT_PENALTY).unwrap());

        let vc = Objective::new(ProblemType::VertexCover, 5.0).unwrap();
        assert!((vc.score(&x, &batch).unwrap() + at_default).abs() < 1e-6);

        let clique = Objective::new(ProblemType::MaxClique, 5.0).unwrap();
        assert!((clique.score(&x, &batch).unwrap() - (2.0 - at_default)).abs() < 1e-6);

        // The training loss still uses the configured penalty.
        let trained = scalar(&vc.loss(&x, &batch).unwrap());
        assert!((trained - scalar(&vertex_cover_loss(&x, &batch, 5.0).unwrap())).abs() < 1e-6);
        assert_ne!(trained, at_default);
    }

    fn out_of_range() -> GraphBatch {
        GraphBatch::from_graph(Graph {
            num_nodes: 2,
            edges: vec![(0, 5)],
            edge_weight: None,
            node_weight: None,
        })
    }

    #[test]
    fn test_out_of_range_edge_rejected_by_every_loss() {
        let x = matrix(&[[1.0, 0.0], [0.0, 1.0]]);
        let batch = out_of_range();
        let is_range_error = |r: Result<Tensor>| {
            matches!(
                r,
                Err(Error::Graph(gnn4co_core::Error::EdgeOutOfRange { node: 5, num_nodes: 2, .. }))
            )
        };
        assert!(is_range_error(max_cut_loss(&x, &batch)));
        assert!(is_range_error(vertex_cover_loss(&x, &batch, DEFAULT_PENALTY)));
        assert!(is_range_error(max_clique_loss(&x, &batch, DEFAULT_PENALTY)));
        assert!(is_range_error(dense_adjacency(&batch, &Device::Cpu)));
        assert!(is_range_error(weighted_adjacency(&batch, &Device::Cpu)));
    }

    #[test]
    fn test_in_bounds_alias_is_not_silently_accepted() {
        // (0, 4) with n = 3 would land on cell (1, 1) of a flat N x N buffer.
        let batch = GraphBatch::from_graph(Graph {
            num_nodes: 3,
            edges: vec![(0, 4)],
            edge_weight: None,
            node_weight: None,
        });
        let x = Tensor::ones((3, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(vertex_cover_loss(&x, &batch, DEFAULT_PENALTY).is_err());
        assert!(max_cut_loss(&x, &batch).is_err());
    }

    #[test]
    fn test_loss_dtype_is_f32() {
        let x = matrix(&[[1.0, 0.0], [0.0, 1.0]]);
        let loss = vertex_cover_loss(&x, &single_edge(), 2.0).unwrap();
        assert_eq!(loss.dtype(), DType::F32);
        assert_eq!(loss.rank(), 0);
    }
}
