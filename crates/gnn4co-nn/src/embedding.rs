//! Normalisation of embeddings handed to the public scoring API.
//!
//! Scores accept embeddings in whatever form evaluation code has them: a
//! candle tensor, a flat vector, or an ndarray matrix. Everything is turned
//! into an `f32` tensor of shape (N, r) here, once, before any objective
//! code runs. A one-dimensional input is a rank-1 relaxation and becomes an
//! (N, 1) column.

use crate::error::{Error, Result};
use candle_core::{DType, Device, Tensor};
use ndarray::{Array1, Array2};

/// An embedding matrix in any of the accepted input forms.
#[derive(Debug, Clone)]
pub enum EmbeddingInput {
    /// Already a tensor (any float dtype, any device, rank 1 or 2).
    Tensor(Tensor),
    /// A flat vector: one value per node.
    Flat(Vec<f32>),
    /// A dense (N, r) matrix.
    Matrix(Array2<f32>),
}

impl From<Tensor> for EmbeddingInput {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<&Tensor> for EmbeddingInput {
    fn from(t: &Tensor) -> Self {
        Self::Tensor(t.clone())
    }
}

impl From<Vec<f32>> for EmbeddingInput {
    fn from(v: Vec<f32>) -> Self {
        Self::Flat(v)
    }
}

impl From<&[f32]> for EmbeddingInput {
    fn from(v: &[f32]) -> Self {
        Self::Flat(v.to_vec())
    }
}

impl From<Vec<f64>> for EmbeddingInput {
    fn from(v: Vec<f64>) -> Self {
        Self::Flat(v.into_iter().map(|x| x as f32).collect())
    }
}

impl From<Array1<f32>> for EmbeddingInput {
    fn from(a: Array1<f32>) -> Self {
        Self::Flat(a.to_vec())
    }
}

impl From<Array2<f32>> for EmbeddingInput {
    fn from(a: Array2<f32>) -> Self {
        Self::Matrix(a)
    }
}

impl From<Array2<f64>> for EmbeddingInput {
    fn from(a: Array2<f64>) -> Self {
        Self::Matrix(a.mapv(|x| x as f32))
    }
}

/// Convert an embedding to an `f32` tensor of shape (N, r).
///
/// Tensors stay on their device; host arrays are placed on `device`.
pub fn normalize_embedding(input: impl Into<EmbeddingInput>, device: &Device) -> Result<Tensor> {
    let t = match input.into() {
        EmbeddingInput::Tensor(t) => t.to_dtype(DType::F32)?,
        EmbeddingInput::Flat(v) => {
            let n = v.len();
            Tensor::from_vec(v, n, device)?
        }
        EmbeddingInput::Matrix(a) => {
            let (n, r) = a.dim();
            let data: Vec<f32> = a.iter().copied().collect();
            Tensor::from_vec(data, (n, r), device)?
        }
    };

    match t.rank() {
        1 => Ok(t.unsqueeze(1)?),
        2 => Ok(t),
        rank => Err(Error::DimensionMismatch {
            expected: 2,
            got: rank,
        }),
    }
}
