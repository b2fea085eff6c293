//! Transmission network: nodes and lines.
//!
//! Nodes are identified by name and kept in insertion order; lines keep their
//! insertion order too, which is what makes the cycle basis reproducible.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::error::{PcmError, PcmResult};

/// A network node (bus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
}

/// A transmission line between two nodes.
///
/// Positive flow runs from `source` to `sink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub name: String,
    pub source: String,
    pub sink: String,
    /// Susceptance in MW per radian
    pub susceptance: f64,
    /// Thermal limit (MW)
    pub capacity_mw: f64,
    /// When false the line only carries flow from source to sink
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
}

fn default_bidirectional() -> bool {
    true
}

impl Line {
    pub fn new(source: &str, sink: &str, susceptance: f64, capacity_mw: f64) -> Self {
        Self {
            name: format!("{source}-{sink}"),
            source: source.to_string(),
            sink: sink.to_string(),
            susceptance,
            capacity_mw,
            bidirectional: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict the line to source-to-sink flow.
    pub fn one_way(mut self) -> Self {
        self.bidirectional = false;
        self
    }

    /// Lower flow bound (MW).
    pub fn min_flow(&self) -> f64 {
        if self.bidirectional {
            -self.capacity_mw
        } else {
            0.0
        }
    }
}

/// Nodes plus lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    nodes: Vec<Node>,
    lines: Vec<Line>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it is not present yet and return its position.
    pub fn ensure_node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Add a line between two existing nodes.
    pub fn add_line(&mut self, line: Line) -> PcmResult<usize> {
        for end in [&line.source, &line.sink] {
            if !self.index.contains_key(end.as_str()) {
                return Err(PcmError::inconsistent(
                    &line.name,
                    format!("line endpoint '{end}' is not a known node"),
                ));
            }
        }
        if line.source == line.sink {
            return Err(PcmError::inconsistent(&line.name, "line connects a node to itself"));
        }
        if !(line.susceptance.is_finite() && line.susceptance > 0.0) {
            return Err(PcmError::inconsistent(
                &line.name,
                format!("susceptance must be positive, got {}", line.susceptance),
            ));
        }
        if line.capacity_mw < 0.0 {
            return Err(PcmError::inconsistent(&line.name, "negative capacity"));
        }
        if self.lines.iter().any(|l| l.name == line.name) {
            return Err(PcmError::inconsistent(&line.name, "duplicate line name"));
        }
        self.lines.push(line);
        Ok(self.lines.len() - 1)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Undirected graph view: node weights are node positions, edge weights
    /// are line positions. Parallel lines become parallel edges.
    pub fn graph(&self) -> UnGraph<usize, usize> {
        let mut graph = UnGraph::with_capacity(self.nodes.len(), self.lines.len());
        for idx in 0..self.nodes.len() {
            graph.add_node(idx);
        }
        for (idx, line) in self.lines.iter().enumerate() {
            if let (Some(a), Some(b)) = (self.node_index(&line.source), self.node_index(&line.sink)) {
                graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), idx);
            }
        }
        graph
    }

    /// Rebuild the name index after deserialization.
    pub fn reindex(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_line_requires_known_nodes() {
        let mut net = Network::new();
        net.ensure_node("A");
        let err = net.add_line(Line::new("A", "B", 10.0, 100.0)).unwrap_err();
        assert!(matches!(err, PcmError::DataInconsistency { .. }));
        assert!(err.to_string().contains("'B'"));
    }

    #[test]
    fn test_ensure_node_is_idempotent() {
        let mut net = Network::new();
        assert_eq!(net.ensure_node("A"), 0);
        assert_eq!(net.ensure_node("B"), 1);
        assert_eq!(net.ensure_node("A"), 0);
        assert_eq!(net.nodes().len(), 2);
    }

    #[test]
    fn test_one_way_line_bounds() {
        let line = Line::new("A", "B", 10.0, 80.0).one_way();
        assert_eq!(line.min_flow(), 0.0);
        assert_eq!(Line::new("A", "B", 10.0, 80.0).min_flow(), -80.0);
    }
}
