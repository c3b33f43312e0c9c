//! Sparse weighted connectivity in compressed-row form
//!
//! Rows are indexed by the TARGET node and hold that node's incoming edges,
//! sorted by source. The matrix-vector product `W · s` therefore walks each
//! row once and costs O(edges), and rows can be computed independently.

use serde::{Deserialize, Serialize};

use crate::{error::*, NodeId};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Minimum node count before the row-wise product is split across threads
pub const MIN_PARALLEL_NODES: usize = 2048;

/// One directed weighted edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Pre-synaptic node
    pub source: NodeId,
    /// Post-synaptic node
    pub target: NodeId,
    /// Synaptic weight
    pub weight: f32,
}

impl Edge {
    /// Create a new edge
    pub fn new(source: NodeId, target: NodeId, weight: f32) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }
}

/// Summary of a connectivity structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityStats {
    /// Number of nodes
    pub node_count: usize,
    /// Number of stored edges
    pub edge_count: usize,
    /// Fraction of the N·(N-1) possible edges realized
    pub density: f64,
    /// Mean number of incoming edges per node
    pub mean_in_degree: f64,
    /// Largest number of incoming edges of any node
    pub max_in_degree: usize,
    /// Edges with positive weight
    pub excitatory: usize,
    /// Edges with negative weight
    pub inhibitory: usize,
    /// Mean edge weight
    pub mean_weight: f64,
}

/// Sparse weighted connectivity over a fixed node set.
///
/// The node count never changes after construction. Weights change only via
/// [`Connectivity::map_weights`] or [`Connectivity::weights_mut`] and the edge
/// set only via [`Connectivity::retain`], all used exclusively by plasticity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connectivity {
    node_count: usize,
    /// Row start offsets, length node_count + 1
    row_offsets: Vec<usize>,
    /// Source node of each stored edge
    sources: Vec<u32>,
    /// Weight of each stored edge
    weights: Vec<f32>,
}

impl Connectivity {
    /// Connectivity with no edges
    pub fn empty(node_count: usize) -> Self {
        Self {
            node_count,
            row_offsets: vec![0; node_count + 1],
            sources: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Build from an edge list.
    ///
    /// Duplicate `(source, target)` pairs are merged by summing their weights.
    /// Zero weights are stored like any other edge.
    pub fn from_edges(node_count: usize, edges: impl IntoIterator<Item = Edge>) -> Result<Self> {
        if node_count > u32::MAX as usize {
            return Err(EngineError::invalid_spec(
                "node_count",
                node_count,
                format!("<= {}", u32::MAX),
            ));
        }

        let mut triples: Vec<(usize, usize, f32)> = Vec::new();
        for edge in edges {
            for node in [edge.source.index(), edge.target.index()] {
                if node >= node_count {
                    return Err(EngineError::NodeOutOfRange { node, node_count });
                }
            }
            triples.push((edge.target.index(), edge.source.index(), edge.weight));
        }
        triples.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_offsets = vec![0usize; node_count + 1];
        let mut sources: Vec<u32> = Vec::with_capacity(triples.len());
        let mut weights: Vec<f32> = Vec::with_capacity(triples.len());
        let mut last: Option<(usize, usize)> = None;

        for (target, source, weight) in triples {
            if last == Some((target, source)) {
                if let Some(w) = weights.last_mut() {
                    *w += weight;
                }
                continue;
            }
            last = Some((target, source));
            row_offsets[target + 1] += 1;
            sources.push(source as u32);
            weights.push(weight);
        }

        for i in 0..node_count {
            row_offsets[i + 1] += row_offsets[i];
        }

        Ok(Self {
            node_count,
            row_offsets,
            sources,
            weights,
        })
    }

    /// Assemble from raw CSR arrays, validating their shape
    pub fn from_csr(
        node_count: usize,
        row_offsets: Vec<usize>,
        sources: Vec<u32>,
        weights: Vec<f32>,
    ) -> Result<Self> {
        if row_offsets.len() != node_count + 1 {
            return Err(EngineError::dimension_mismatch(
                "row_offsets",
                node_count + 1,
                row_offsets.len(),
            ));
        }
        if sources.len() != weights.len() {
            return Err(EngineError::dimension_mismatch(
                "weights",
                sources.len(),
                weights.len(),
            ));
        }
        if row_offsets.first() != Some(&0) || row_offsets.last() != Some(&sources.len()) {
            return Err(EngineError::invalid_spec(
                "row_offsets",
                format!("{:?}..{:?}", row_offsets.first(), row_offsets.last()),
                format!("0..{}", sources.len()),
            ));
        }
        if row_offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(EngineError::invalid_spec(
                "row_offsets",
                "decreasing",
                "non-decreasing",
            ));
        }
        if let Some(&bad) = sources.iter().find(|&&s| s as usize >= node_count) {
            return Err(EngineError::NodeOutOfRange {
                node: bad as usize,
                node_count,
            });
        }

        Ok(Self {
            node_count,
            row_offsets,
            sources,
            weights,
        })
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of stored edges
    pub fn edge_count(&self) -> usize {
        self.sources.len()
    }

    /// Row start offsets (length `node_count + 1`)
    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    /// Source index of every stored edge, row by row
    pub fn sources(&self) -> &[u32] {
        &self.sources
    }

    /// Weight of every stored edge, row by row
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Mutable weights, aligned with [`Connectivity::sources`]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    /// Range into `sources`/`weights` holding the incoming edges of `target`
    pub fn row_range(&self, target: usize) -> std::ops::Range<usize> {
        self.row_offsets[target]..self.row_offsets[target + 1]
    }

    /// Incoming edges of `target` as `(source, weight)`
    pub fn incoming(&self, target: NodeId) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        let range = if target.index() < self.node_count {
            self.row_range(target.index())
        } else {
            0..0
        };
        self.sources[range.clone()]
            .iter()
            .zip(&self.weights[range])
            .map(|(&s, &w)| (NodeId::new(s), w))
    }

    /// Weight of the edge `source -> target`, if stored
    pub fn weight(&self, source: NodeId, target: NodeId) -> Option<f32> {
        if target.index() >= self.node_count {
            return None;
        }
        let range = self.row_range(target.index());
        let row = &self.sources[range.clone()];
        row.binary_search(&source.raw())
            .ok()
            .map(|pos| self.weights[range.start + pos])
    }

    /// All stored edges, ordered by target then source
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.node_count).flat_map(move |target| {
            self.row_range(target).map(move |k| {
                Edge::new(
                    NodeId::new(self.sources[k]),
                    NodeId::from_index(target),
                    self.weights[k],
                )
            })
        })
    }

    /// Structural edge set as sorted `(source, target)` pairs
    pub fn edge_set(&self) -> Vec<(u32, u32)> {
        let mut pairs: Vec<(u32, u32)> = self
            .edges()
            .map(|e| (e.source.raw(), e.target.raw()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Fraction of the N·(N-1) off-diagonal pairs that carry an edge
    pub fn density(&self) -> f64 {
        let n = self.node_count as f64;
        if self.node_count < 2 {
            return 0.0;
        }
        self.edge_count() as f64 / (n * (n - 1.0))
    }

    /// Number of edges whose source equals their target
    pub fn self_loop_count(&self) -> usize {
        (0..self.node_count)
            .map(|t| {
                self.sources[self.row_range(t)]
                    .iter()
                    .filter(|&&s| s as usize == t)
                    .count()
            })
            .sum()
    }

    /// Incoming edge count per node
    pub fn in_degrees(&self) -> Vec<usize> {
        self.row_offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Outgoing edge count per node
    pub fn out_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0usize; self.node_count];
        for &s in &self.sources {
            degrees[s as usize] += 1;
        }
        degrees
    }

    /// Sparse product `out = W · state`, accumulated in f64
    pub fn mul_vec(&self, state: &[f32], out: &mut [f64]) -> Result<()> {
        self.check_len("state", state.len())?;
        self.check_len("output", out.len())?;

        let row = |target: usize| -> f64 {
            self.row_range(target)
                .map(|k| self.weights[k] as f64 * state[self.sources[k] as usize] as f64)
                .sum()
        };

        #[cfg(feature = "parallel")]
        {
            if self.node_count >= MIN_PARALLEL_NODES {
                out.par_iter_mut()
                    .enumerate()
                    .for_each(|(target, acc)| *acc = row(target));
                return Ok(());
            }
        }

        for (target, acc) in out.iter_mut().enumerate() {
            *acc = row(target);
        }
        Ok(())
    }

    /// Sparse product with a boolean activity mask, `out = W · 1[mask]`
    pub fn mul_mask(&self, mask: &[bool], out: &mut [f64]) -> Result<()> {
        self.check_len("mask", mask.len())?;
        self.check_len("output", out.len())?;

        for (target, acc) in out.iter_mut().enumerate() {
            *acc = self
                .row_range(target)
                .filter(|&k| mask[self.sources[k] as usize])
                .map(|k| self.weights[k] as f64)
                .sum();
        }
        Ok(())
    }

    /// Keep only edges for which `keep(source, target, weight)` holds.
    ///
    /// Returns the number of removed edges. Removed edges disappear from
    /// storage entirely.
    pub fn retain(&mut self, mut keep: impl FnMut(NodeId, NodeId, f32) -> bool) -> usize {
        let before = self.edge_count();
        let mut row_offsets = Vec::with_capacity(self.node_count + 1);
        let mut sources = Vec::with_capacity(before);
        let mut weights = Vec::with_capacity(before);
        row_offsets.push(0);

        for target in 0..self.node_count {
            for k in self.row_range(target) {
                let source = self.sources[k];
                let weight = self.weights[k];
                if keep(NodeId::new(source), NodeId::from_index(target), weight) {
                    sources.push(source);
                    weights.push(weight);
                }
            }
            row_offsets.push(sources.len());
        }

        self.row_offsets = row_offsets;
        self.sources = sources;
        self.weights = weights;
        before - self.edge_count()
    }

    /// Replace every weight with `f(source, target, weight)`; the edge set is untouched
    pub fn map_weights(&mut self, mut f: impl FnMut(NodeId, NodeId, f32) -> f32) {
        for target in 0..self.node_count {
            for k in self.row_offsets[target]..self.row_offsets[target + 1] {
                let source = NodeId::new(self.sources[k]);
                self.weights[k] = f(source, NodeId::from_index(target), self.weights[k]);
            }
        }
    }

    /// Summary statistics
    pub fn stats(&self) -> ConnectivityStats {
        let in_degrees = self.in_degrees();
        let edge_count = self.edge_count();
        let mean_weight = if edge_count > 0 {
            self.weights.iter().map(|&w| w as f64).sum::<f64>() / edge_count as f64
        } else {
            0.0
        };

        ConnectivityStats {
            node_count: self.node_count,
            edge_count,
            density: self.density(),
            mean_in_degree: if self.node_count > 0 {
                edge_count as f64 / self.node_count as f64
            } else {
                0.0
            },
            max_in_degree: in_degrees.iter().copied().max().unwrap_or(0),
            excitatory: self.weights.iter().filter(|&&w| w > 0.0).count(),
            inhibitory: self.weights.iter().filter(|&&w| w < 0.0).count(),
            mean_weight,
        }
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.node_count {
            return Err(EngineError::dimension_mismatch(what, self.node_count, len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(s: u32, t: u32, w: f32) -> Edge {
        Edge::new(NodeId::new(s), NodeId::new(t), w)
    }

    fn chain() -> Connectivity {
        Connectivity::from_edges(
            3,
            vec![edge(0, 1, 0.5), edge(1, 2, -0.25), edge(2, 0, 1.0), edge(0, 2, 2.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_from_edges_layout() {
        let c = chain();
        assert_eq!(c.node_count(), 3);
        assert_eq!(c.edge_count(), 4);
        assert_eq!(c.row_offsets(), &[0, 1, 2, 4]);
        assert_eq!(c.weight(NodeId::new(0), NodeId::new(2)), Some(2.0));
        assert_eq!(c.weight(NodeId::new(1), NodeId::new(2)), Some(-0.25));
        assert_eq!(c.weight(NodeId::new(2), NodeId::new(1)), None);
    }

    #[test]
    fn test_duplicates_are_summed() {
        let c = Connectivity::from_edges(2, vec![edge(0, 1, 0.5), edge(0, 1, 0.25)]).unwrap();
        assert_eq!(c.edge_count(), 1);
        assert_eq!(c.weight(NodeId::new(0), NodeId::new(1)), Some(0.75));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = Connectivity::from_edges(2, vec![edge(0, 5, 1.0)]).unwrap_err();
        assert_eq!(err, EngineError::NodeOutOfRange { node: 5, node_count: 2 });
    }

    #[test]
    fn test_mul_vec() {
        let c = chain();
        let state = [1.0f32, 2.0, 4.0];
        let mut out = [0.0f64; 3];
        c.mul_vec(&state, &mut out).unwrap();
        // row 0: 1.0 * s2; row 1: 0.5 * s0; row 2: 2.0 * s0 - 0.25 * s1
        assert_eq!(out, [4.0, 0.5, 1.5]);
    }

    #[test]
    fn test_mul_vec_dimension_checked() {
        let c = chain();
        let mut out = [0.0f64; 3];
        assert!(matches!(
            c.mul_vec(&[1.0, 2.0], &mut out),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_mul_mask() {
        let c = chain();
        let mut out = [0.0f64; 3];
        c.mul_mask(&[true, false, false], &mut out).unwrap();
        assert_eq!(out, [0.0, 0.5, 2.0]);
    }

    #[test]
    fn test_retain_removes_edges() {
        let mut c = chain();
        let removed = c.retain(|_, _, w| w.abs() >= 0.5);
        assert_eq!(removed, 1);
        assert_eq!(c.edge_count(), 3);
        assert_eq!(c.weight(NodeId::new(1), NodeId::new(2)), None);
        assert_eq!(c.row_offsets(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_map_weights_keeps_structure() {
        let mut c = chain();
        let before = c.edge_set();
        c.map_weights(|s, _, w| if s.raw() == 0 { 0.0 } else { w * 2.0 });
        assert_eq!(c.edge_set(), before);
        assert_eq!(c.weight(NodeId::new(0), NodeId::new(1)), Some(0.0));
        assert_eq!(c.weight(NodeId::new(2), NodeId::new(0)), Some(2.0));
    }

    #[test]
    fn test_degrees_and_stats() {
        let c = chain();
        assert_eq!(c.in_degrees(), vec![1, 1, 2]);
        assert_eq!(c.out_degrees(), vec![2, 1, 1]);
        assert_eq!(c.self_loop_count(), 0);

        let stats = c.stats();
        assert_eq!(stats.edge_count, 4);
        assert_eq!(stats.excitatory, 3);
        assert_eq!(stats.inhibitory, 1);
        assert_eq!(stats.max_in_degree, 2);
        assert!((stats.density - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_csr_validation() {
        assert!(Connectivity::from_csr(2, vec![0, 1, 1], vec![1], vec![0.5]).is_ok());
        assert!(Connectivity::from_csr(2, vec![0, 1], vec![1], vec![0.5]).is_err());
        assert!(Connectivity::from_csr(2, vec![0, 1, 1], vec![7], vec![0.5]).is_err());
        assert!(Connectivity::from_csr(2, vec![0, 2, 1], vec![0], vec![0.5]).is_err());
    }

    #[test]
    fn test_edge_set_sorted() {
        let c = chain();
        assert_eq!(c.edge_set(), vec![(0, 1), (0, 2), (1, 2), (2, 0)]);
    }
}
