//! Single graphs as edge lists.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An undirected graph stored as an edge list.
///
/// Edges follow the message-passing convention: an undirected edge `{u, v}`
/// is normally present twice, as `(u, v)` and `(v, u)`. See
/// [`Graph::to_undirected`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Number of nodes; node ids are `0..num_nodes`.
    pub num_nodes: usize,
    /// Directed edge entries `(source, target)`.
    pub edges: Vec<(usize, usize)>,
    /// Optional weight per edge entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_weight: Option<Vec<f32>>,
    /// Optional weight per node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_weight: Option<Vec<f32>>,
}

impl Graph {
    /// Create a graph, checking that every endpoint is a valid node id.
    pub fn new(num_nodes: usize, edges: Vec<(usize, usize)>) -> Result<Self> {
        let graph = Self {
            num_nodes,
            edges,
            edge_weight: None,
            node_weight: None,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// A graph without edges.
    pub fn empty(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            edges: Vec::new(),
            edge_weight: None,
            node_weight: None,
        }
    }

    /// Attach one weight per edge entry.
    pub fn with_edge_weight(mut self, weight: Vec<f32>) -> Result<Self> {
        check_len("edge_weight", self.edges.len(), weight.len())?;
        self.edge_weight = Some(weight);
        Ok(self)
    }

    /// Attach one weight per node.
    pub fn with_node_weight(mut self, weight: Vec<f32>) -> Result<Self> {
        check_len("node_weight", self.num_nodes, weight.len())?;
        self.node_weight = Some(weight);
        Ok(self)
    }

    /// Check endpoint ranges and weight lengths.
    ///
    /// Graphs deserialized from files bypass [`Graph::new`], so loaders call
    /// this explicitly.
    pub fn validate(&self) -> Result<()> {
        for (i, &(u, v)) in self.edges.iter().enumerate() {
            for node in [u, v] {
                if node >= self.num_nodes {
                    return Err(Error::EdgeOutOfRange {
                        edge: i,
                        node,
                        num_nodes: self.num_nodes,
                    });
                }
            }
        }
        if let Some(w) = &self.edge_weight {
            check_len("edge_weight", self.edges.len(), w.len())?;
        }
        if let Some(w) = &self.node_weight {
            check_len("node_weight", self.num_nodes, w.len())?;
        }
        Ok(())
    }

    /// Number of edge entries (columns of the 2 x E edge list).
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add the reverse of every edge that lacks one.
    ///
    /// Existing entries keep their order and weight; added reverse entries
    /// copy the weight of the edge they mirror.
    pub fn to_undirected(&self) -> Self {
        let present: HashSet<(usize, usize)> = self.edges.iter().copied().collect();
        let mut edges = self.edges.clone();
        let mut weight = self.edge_weight.clone();

        for (i, &(u, v)) in self.edges.iter().enumerate() {
            if u != v && !present.contains(&(v, u)) {
                edges.push((v, u));
                if let Some(w) = weight.as_mut() {
                    let mirrored = w[i];
                    w.push(mirrored);
                }
            }
        }

        Self {
            num_nodes: self.num_nodes,
            edges,
            edge_weight: weight,
            node_weight: self.node_weight.clone(),
        }
    }

    /// The complement graph: every pair of distinct nodes that is not
    /// adjacent here, in both directions. Edge weights are dropped; node
    /// weights are kept.
    ///
    /// Max-clique in a graph is vertex cover in its complement, so this is
    /// the form max-clique data is fed to the objective in.
    pub fn complement(&self) -> Self {
        let adjacent: HashSet<(usize, usize)> = self
            .edges
            .iter()
            .flat_map(|&(u, v)| [(u, v), (v, u)])
            .collect();

        let mut edges = Vec::new();
        for u in 0..self.num_nodes {
            for v in 0..self.num_nodes {
                if u != v && !adjacent.contains(&(u, v)) {
                    edges.push((u, v));
                }
            }
        }

        Self {
            num_nodes: self.num_nodes,
            edges,
            edge_weight: None,
            node_weight: self.node_weight.clone(),
        }
    }

    /// Relabel nodes: node `i` becomes `perm[i]`.
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        check_len("permutation", self.num_nodes, perm.len())?;
        let mut seen = vec![false; self.num_nodes];
        for &p in perm {
            if p >= self.num_nodes || seen[p] {
                return Err(Error::InvalidArgument(format!(
                    "not a permutation of 0..{}",
                    self.num_nodes
                )));
            }
            seen[p] = true;
        }

        let node_weight = self.node_weight.as_ref().map(|w| {
            let mut out = vec![0.0; w.len()];
            for (i, &p) in perm.iter().enumerate() {
                out[p] = w[i];
            }
            out
        });

        Ok(Self {
            num_nodes: self.num_nodes,
            edges: self.edges.iter().map(|&(u, v)| (perm[u], perm[v])).collect(),
            edge_weight: self.edge_weight.clone(),
            node_weight,
        })
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            what,
            expected,
            got,
        })
    }
}
