//! Problem-type selector.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default penalty coefficient of the vertex-cover / max-clique objective.
pub const DEFAULT_PENALTY: f64 = 2.0;

/// The combinatorial problem being relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    /// Maximum cut; loss uses edge weights.
    #[default]
    MaxCut,
    /// Minimum (weighted) vertex cover; loss uses node weights.
    VertexCover,
    /// Maximum clique, solved as vertex cover on the complement graph.
    MaxClique,
}

impl ProblemType {
    pub const ALL: [ProblemType; 3] = [Self::MaxCut, Self::VertexCover, Self::MaxClique];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxCut => "max_cut",
            Self::VertexCover => "vertex_cover",
            Self::MaxClique => "max_clique",
        }
    }

    /// Whether input graphs must be complemented before they reach the
    /// objective.
    pub fn needs_complement(&self) -> bool {
        matches!(self, Self::MaxClique)
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::UnknownProblemType(s.to_string()))
    }
}
