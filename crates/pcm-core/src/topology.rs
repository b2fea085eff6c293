//! Network topology processing.
//!
//! Two jobs live here:
//!
//! 1. **Line parameters**: a [`LineSpec`] either carries a final susceptance or
//!    a per-unit reactance from which `b = base_mva / x` is derived.
//! 2. **Cycle basis**: the fundamental cycles of the line graph. A BFS
//!    spanning forest is grown over the nodes in insertion order; every line
//!    that is not a tree edge closes exactly one cycle with the tree path
//!    between its endpoints.
//!
//! ```text
//!        A ──L0──▶ B            tree:     L0, L1
//!         ▲       │             non-tree: L2  (C → A)
//!         L2      L1
//!          ╲      ▼             cycle:    L2(+1) L0(+1) L1(+1)
//!            ─── C
//! ```
//!
//! Each cycle member records whether the traversal crosses the line in its
//! source→sink orientation (+1) or against it (-1). The flow formulation uses
//! these signs for the discrete Kirchhoff voltage law
//! `Σ sign · flow / b = 0`.

use std::collections::VecDeque;

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::{PcmError, PcmResult};
use crate::network::{Line, Network};

/// System base used when a reactance is given without one.
pub const DEFAULT_BASE_MVA: f64 = 100.0;

/// Line as it appears in a transmission table, before parameter resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub source: String,
    pub sink: String,
    #[serde(default)]
    pub susceptance: Option<f64>,
    #[serde(default)]
    pub reactance_pu: Option<f64>,
    #[serde(default)]
    pub base_mva: Option<f64>,
    pub capacity_mw: f64,
    #[serde(default)]
    pub bidirectional: Option<bool>,
}

/// Pass through or derive the line susceptance (MW/rad).
pub fn resolve_line(spec: &LineSpec) -> PcmResult<Line> {
    let name = spec
        .name
        .clone()
        .unwrap_or_else(|| format!("{}-{}", spec.source, spec.sink));
    let susceptance = match (spec.susceptance, spec.reactance_pu) {
        (Some(b), _) => b,
        (None, Some(x)) if x.abs() > f64::EPSILON => spec.base_mva.unwrap_or(DEFAULT_BASE_MVA) / x,
        (None, Some(_)) => return Err(PcmError::inconsistent(&name, "zero reactance")),
        (None, None) => {
            return Err(PcmError::inconsistent(
                &name,
                "needs either a susceptance or a reactance",
            ))
        }
    };
    let mut line = Line::new(&spec.source, &spec.sink, susceptance, spec.capacity_mw).with_name(name);
    if spec.bidirectional == Some(false) {
        line = line.one_way();
    }
    Ok(line)
}

/// One line in a cycle, with the traversal orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleMember {
    /// Position of the line in the network's line list
    pub line: usize,
    /// +1 when traversed source→sink, -1 otherwise
    pub sign: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub members: Vec<CycleMember>,
}

impl Cycle {
    /// Signed voltage-angle drop around the loop for the given line flows.
    pub fn residual(&self, lines: &[Line], flows: &[f64]) -> f64 {
        self.members
            .iter()
            .map(|m| f64::from(m.sign) * flows[m.line] / lines[m.line].susceptance)
            .sum()
    }

    /// Whether consecutive members share endpoints and the walk returns to its start.
    pub fn is_closed(&self, network: &Network) -> bool {
        let lines = network.lines();
        let mut steps = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let Some(line) = lines.get(member.line) else {
                return false;
            };
            let (from, to) = match member.sign {
                1 => (&line.source, &line.sink),
                -1 => (&line.sink, &line.source),
                _ => return false,
            };
            steps.push((from.as_str(), to.as_str()));
        }
        let Some(&(start, _)) = steps.first() else {
            return false;
        };
        let ends_chain = steps.windows(2).all(|pair| pair[0].1 == pair[1].0);
        ends_chain && steps.last().map(|&(_, to)| to) == Some(start)
    }
}

/// Fundamental cycle basis of a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleBasis {
    pub cycles: Vec<Cycle>,
}

impl CycleBasis {
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Check that the basis belongs to `network`: one cycle per independent
    /// loop (`lines - nodes + islands`) and every cycle a closed walk over
    /// existing lines.
    pub fn matches(&self, network: &Network) -> bool {
        let expected = (network.lines().len() + islands(network).len()).saturating_sub(network.nodes().len());
        self.len() == expected && self.cycles.iter().all(|c| c.is_closed(network))
    }
}

/// Spanning forest bookkeeping: parent link and depth per node.
struct Forest {
    parent: Vec<Option<(NodeIndex, EdgeIndex)>>,
    depth: Vec<usize>,
    tree_edge: Vec<bool>,
}

fn spanning_forest(graph: &UnGraph<usize, usize>) -> Forest {
    let n = graph.node_count();
    let mut forest = Forest {
        parent: vec![None; n],
        depth: vec![0; n],
        tree_edge: vec![false; graph.edge_count()],
    };
    let mut visited = vec![false; n];
    for start in graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        visited[start.index()] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let mut edges: Vec<_> = graph.edges(node).map(|e| e.id()).collect();
            edges.sort_by_key(|e| e.index());
            for edge in edges {
                let Some((a, b)) = graph.edge_endpoints(edge) else {
                    continue;
                };
                let next = if a == node { b } else { a };
                if visited[next.index()] {
                    continue;
                }
                visited[next.index()] = true;
                forest.parent[next.index()] = Some((node, edge));
                forest.depth[next.index()] = forest.depth[node.index()] + 1;
                forest.tree_edge[edge.index()] = true;
                queue.push_back(next);
            }
        }
    }
    forest
}

/// Orientation of a step `from → to` across a line.
fn step_sign(network: &Network, line: usize, from: NodeIndex) -> i8 {
    let source = network.lines()[line].source.as_str();
    if network.node_index(source) == Some(from.index()) {
        1
    } else {
        -1
    }
}

/// Compute the fundamental cycle basis.
///
/// Disconnected networks are handled per component and isolated nodes
/// contribute nothing. The result only depends on node and line insertion
/// order.
pub fn cycle_basis(network: &Network) -> CycleBasis {
    let graph = network.graph();
    let forest = spanning_forest(&graph);
    let mut cycles = Vec::new();

    for edge in graph.edge_indices() {
        if forest.tree_edge[edge.index()] {
            continue;
        }
        let Some((u, v)) = graph.edge_endpoints(edge) else {
            continue;
        };
        let closing_line = graph[edge];

        // Walk u → v over the closing line, then back v → u through the tree.
        let mut members = vec![CycleMember {
            line: closing_line,
            sign: step_sign(network, closing_line, u),
        }];
        let mut up_from_v = Vec::new();
        let mut up_from_u = Vec::new();
        let (mut a, mut b) = (v, u);
        while a != b {
            if forest.depth[a.index()] >= forest.depth[b.index()] {
                let Some((parent, e)) = forest.parent[a.index()] else {
                    break;
                };
                up_from_v.push((a, e));
                a = parent;
            } else {
                let Some((parent, e)) = forest.parent[b.index()] else {
                    break;
                };
                up_from_u.push((b, e));
                b = parent;
            }
        }
        for (child, e) in up_from_v {
            let line = graph[e];
            members.push(CycleMember {
                line,
                sign: step_sign(network, line, child),
            });
        }
        for (child, e) in up_from_u.into_iter().rev() {
            let line = graph[e];
            let parent = forest.parent[child.index()].map(|(p, _)| p).unwrap_or(child);
            members.push(CycleMember {
                line,
                sign: step_sign(network, line, parent),
            });
        }
        cycles.push(Cycle { members });
    }

    CycleBasis { cycles }
}

/// Connected components as lists of node positions, in insertion order.
pub fn islands(network: &Network) -> Vec<Vec<usize>> {
    let graph = network.graph();
    let mut visited = vec![false; graph.node_count()];
    let mut result = Vec::new();
    for start in graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        visited[start.index()] = true;
        let mut members = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            members.push(node.index());
            for next in graph.neighbors(node) {
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    queue.push_back(next);
                }
            }
        }
        members.sort_unstable();
        result.push(members);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Network {
        let mut net = Network::new();
        for n in ["A", "B", "C"] {
            net.ensure_node(n);
        }
        net.add_line(Line::new("A", "B", 10.0, 100.0)).unwrap();
        net.add_line(Line::new("B", "C", 20.0, 100.0)).unwrap();
        net.add_line(Line::new("C", "A", 30.0, 100.0)).unwrap();
        net
    }

    #[test]
    fn test_tree_has_no_cycles() {
        let mut net = Network::new();
        for n in ["A", "B", "C"] {
            net.ensure_node(n);
        }
        net.add_line(Line::new("A", "B", 10.0, 100.0)).unwrap();
        net.add_line(Line::new("B", "C", 10.0, 100.0)).unwrap();
        assert!(cycle_basis(&net).is_empty());
    }

    #[test]
    fn test_triangle_single_cycle_with_consistent_signs() {
        let net = triangle();
        let basis = cycle_basis(&net);
        assert_eq!(basis.len(), 1);
        let cycle = &basis.cycles[0];
        assert_eq!(cycle.members.len(), 3);
        // A→B→C→A all follow line orientation, so every sign agrees.
        let first = cycle.members[0].sign;
        assert!(cycle.members.iter().all(|m| m.sign == first));

        // Flows from a consistent angle solution satisfy KVL.
        let theta = [0.0, -0.1, -0.25];
        let flows: Vec<f64> = net
            .lines()
            .iter()
            .map(|l| {
                let a = net.node_index(&l.source).unwrap();
                let b = net.node_index(&l.sink).unwrap();
                l.susceptance * (theta[a] - theta[b])
            })
            .collect();
        assert!(cycle.residual(net.lines(), &flows).abs() < 1e-12);
    }

    #[test]
    fn test_reversed_line_gets_negative_sign() {
        let mut net = Network::new();
        for n in ["A", "B", "C"] {
            net.ensure_node(n);
        }
        net.add_line(Line::new("A", "B", 10.0, 100.0)).unwrap();
        net.add_line(Line::new("B", "C", 10.0, 100.0)).unwrap();
        net.add_line(Line::new("A", "C", 10.0, 100.0)).unwrap();
        let basis = cycle_basis(&net);
        assert_eq!(basis.len(), 1);
        let signs: Vec<i8> = basis.cycles[0].members.iter().map(|m| m.sign).collect();
        assert!(signs.contains(&1) && signs.contains(&-1));
    }

    #[test]
    fn test_disconnected_components_and_isolated_node() {
        let mut net = triangle();
        for n in ["D", "E", "F", "G"] {
            net.ensure_node(n);
        }
        net.add_line(Line::new("D", "E", 5.0, 10.0)).unwrap();
        net.add_line(Line::new("E", "F", 5.0, 10.0)).unwrap();
        net.add_line(Line::new("F", "D", 5.0, 10.0)).unwrap();
        let basis = cycle_basis(&net);
        assert_eq!(basis.len(), 2);
        assert_eq!(islands(&net).len(), 3);
        assert!(basis.matches(&net));
    }

    #[test]
    fn test_parallel_lines_form_two_member_cycle() {
        let mut net = Network::new();
        net.ensure_node("A");
        net.ensure_node("B");
        net.add_line(Line::new("A", "B", 10.0, 100.0)).unwrap();
        net.add_line(Line::new("A", "B", 10.0, 100.0).with_name("A-B#2")).unwrap();
        let basis = cycle_basis(&net);
        assert_eq!(basis.len(), 1);
        let members = &basis.cycles[0].members;
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].sign, -members[1].sign);
    }

    #[test]
    fn test_foreign_basis_does_not_match() {
        let net = triangle();
        assert!(cycle_basis(&net).matches(&net));
        assert!(!CycleBasis::default().matches(&net));

        // Right count, but the walk does not close.
        let open = CycleBasis {
            cycles: vec![Cycle {
                members: vec![
                    CycleMember { line: 0, sign: 1 },
                    CycleMember { line: 1, sign: -1 },
                    CycleMember { line: 2, sign: 1 },
                ],
            }],
        };
        assert!(!open.matches(&net));

        // A tree needs no cycles at all.
        let mut tree = Network::new();
        for n in ["A", "B", "C"] {
            tree.ensure_node(n);
        }
        tree.add_line(Line::new("A", "B", 10.0, 100.0)).unwrap();
        tree.add_line(Line::new("B", "C", 10.0, 100.0)).unwrap();
        assert!(CycleBasis::default().matches(&tree));
        assert!(!cycle_basis(&net).matches(&tree));
    }

    #[test]
    fn test_deterministic() {
        let net = triangle();
        assert_eq!(cycle_basis(&net), cycle_basis(&net));
    }

    #[test]
    fn test_resolve_line_from_reactance() {
        let spec = LineSpec {
            source: "A".into(),
            sink: "B".into(),
            reactance_pu: Some(0.1),
            capacity_mw: 50.0,
            ..LineSpec::default()
        };
        let line = resolve_line(&spec).unwrap();
        assert!((line.susceptance - 1000.0).abs() < 1e-9);
        assert_eq!(line.name, "A-B");

        let missing = LineSpec {
            source: "A".into(),
            sink: "B".into(),
            capacity_mw: 50.0,
            ..LineSpec::default()
        };
        assert!(resolve_line(&missing).is_err());
    }
}
