//! Packing several graphs into one disjoint-union batch.
//!
//! A batch is what every objective and model consumes: one node range, one
//! edge list, and the offsets needed to split results back per graph.
//!
//! ```text
//! graph 0: nodes 0..3        graph 1: nodes 0..2
//!           \                          /
//!   batch: nodes 0..5, ptr = [0, 3, 5]
//!          graph 1's edge (0, 1) becomes (3, 4)
//! ```

use crate::error::{Error, Result};
use crate::graph::{check_len, Graph};
use std::ops::Range;

/// One or more graphs packed into a single adjacency structure.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBatch {
    num_nodes: usize,
    edges: Vec<(usize, usize)>,
    edge_weight: Option<Vec<f32>>,
    node_weight: Option<Vec<f32>>,
    /// Node offsets per graph; `ptr.len() == num_graphs + 1`.
    ptr: Vec<usize>,
}

impl GraphBatch {
    /// A batch holding a single graph given as a raw edge list.
    pub fn new(num_nodes: usize, edges: Vec<(usize, usize)>) -> Result<Self> {
        Ok(Self::from_graph(Graph::new(num_nodes, edges)?))
    }

    /// A batch holding one graph.
    pub fn from_graph(graph: Graph) -> Self {
        let Graph {
            num_nodes,
            edges,
            edge_weight,
            node_weight,
        } = graph;
        Self {
            num_nodes,
            edges,
            edge_weight,
            node_weight,
            ptr: vec![0, num_nodes],
        }
    }

    /// Pack graphs into one batch, offsetting node ids.
    ///
    /// Per-edge and per-node weights are kept only if at least one graph
    /// carries them; graphs without them contribute unit weights.
    pub fn from_graphs<'a, I>(graphs: I) -> Self
    where
        I: IntoIterator<Item = &'a Graph>,
    {
        let graphs: Vec<&Graph> = graphs.into_iter().collect();
        let any_edge_weight = graphs.iter().any(|g| g.edge_weight.is_some());
        let any_node_weight = graphs.iter().any(|g| g.node_weight.is_some());

        let mut ptr = Vec::with_capacity(graphs.len() + 1);
        ptr.push(0);
        let mut edges = Vec::new();
        let mut edge_weight = any_edge_weight.then(Vec::new);
        let mut node_weight = any_node_weight.then(Vec::new);
        let mut offset = 0;

        for g in graphs {
            edges.extend(g.edges.iter().map(|&(u, v)| (u + offset, v + offset)));
            if let Some(out) = edge_weight.as_mut() {
                match &g.edge_weight {
                    Some(w) => out.extend_from_slice(w),
                    None => out.extend(std::iter::repeat(1.0).take(g.edges.len())),
                }
            }
            if let Some(out) = node_weight.as_mut() {
                match &g.node_weight {
                    Some(w) => out.extend_from_slice(w),
                    None => out.extend(std::iter::repeat(1.0).take(g.num_nodes)),
                }
            }
            offset += g.num_nodes;
            ptr.push(offset);
        }

        Self {
            num_nodes: offset,
            edges,
            edge_weight,
            node_weight,
            ptr,
        }
    }

    /// Replace the per-edge weights.
    pub fn with_edge_weight(mut self, weight: Vec<f32>) -> Result<Self> {
        check_len("edge_weight", self.edges.len(), weight.len())?;
        self.edge_weight = Some(weight);
        Ok(self)
    }

    /// Replace the per-node weights.
    pub fn with_node_weight(mut self, weight: Vec<f32>) -> Result<Self> {
        check_len("node_weight", self.num_nodes, weight.len())?;
        self.node_weight = Some(weight);
        Ok(self)
    }

    /// Total node count N across packed graphs.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of edge entries E.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of packed graphs.
    pub fn num_graphs(&self) -> usize {
        self.ptr.len() - 1
    }

    /// Edge entries `(source, target)`, all in `0..num_nodes`.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn edge_weight(&self) -> Option<&[f32]> {
        self.edge_weight.as_deref()
    }

    pub fn node_weight(&self) -> Option<&[f32]> {
        self.node_weight.as_deref()
    }

    /// Per-edge weights, unit weights if none are stored.
    pub fn edge_weight_or_ones(&self) -> Vec<f32> {
        self.edge_weight
            .clone()
            .unwrap_or_else(|| vec![1.0; self.edges.len()])
    }

    /// Per-node weights, unit weights if none are stored.
    pub fn node_weight_or_ones(&self) -> Vec<f32> {
        self.node_weight
            .clone()
            .unwrap_or_else(|| vec![1.0; self.num_nodes])
    }

    /// Edge list flattened row-major as a 2 x E index matrix:
    /// all sources, then all targets.
    pub fn edge_index_u32(&self) -> Vec<u32> {
        let mut flat = Vec::with_capacity(2 * self.edges.len());
        flat.extend(self.edges.iter().map(|&(u, _)| u as u32));
        flat.extend(self.edges.iter().map(|&(_, v)| v as u32));
        flat
    }

    /// Node offsets of the packed graphs (`num_graphs + 1` entries).
    pub fn ptr(&self) -> &[usize] {
        &self.ptr
    }

    /// Node range of each packed graph.
    pub fn graph_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.ptr.windows(2).map(|w| w[0]..w[1])
    }

    /// Split the batch back into its graphs.
    pub fn unbatch(&self) -> Result<Vec<Graph>> {
        self.validate()?;
        let mut graphs: Vec<Graph> = self
            .graph_ranges()
            .map(|r| Graph::empty(r.len()))
            .collect();
        let owner = self.node_owner();

        for (i, &(u, v)) in self.edges.iter().enumerate() {
            let g = owner[u];
            let base = self.ptr[g];
            graphs[g].edges.push((u - base, v - base));
            if let Some(w) = &self.edge_weight {
                graphs[g].edge_weight.get_or_insert_with(Vec::new).push(w[i]);
            }
        }
        if let Some(w) = &self.node_weight {
            for (g, r) in self.graph_ranges().enumerate() {
                graphs[g].node_weight = Some(w[r].to_vec());
            }
        }
        for g in &mut graphs {
            if self.edge_weight.is_some() && g.edge_weight.is_none() {
                g.edge_weight = Some(Vec::new());
            }
        }
        Ok(graphs)
    }

    /// Check endpoint ranges, weight lengths, and that no edge crosses
    /// between packed graphs.
    ///
    /// [`GraphBatch::from_graph`] takes a `Graph` as given, so anything that
    /// indexes by edge endpoints calls this first.
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

        let owner = self.node_owner();
        for (i, &(u, v)) in self.edges.iter().enumerate() {
            if owner[u] != owner[v] {
                return Err(Error::InvalidArgument(format!(
                    "edge {i} ({u}, {v}) joins graphs {} and {}",
                    owner[u], owner[v]
                )));
            }
        }
        Ok(())
    }

    fn node_owner(&self) -> Vec<usize> {
        let mut owner = vec![0; self.num_nodes];
        for (g, r) in self.graph_ranges().enumerate() {
            owner[r].fill(g);
        }
        owner
    }
}

impl From<Graph> for GraphBatch {
    fn from(graph: Graph) -> Self {
        Self::from_graph(graph)
    }
}
