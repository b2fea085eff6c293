//! DC network formulation.
//!
//! One flow variable per line and hour, bounded by the line's thermal limit
//! (a hard bound, never slacked). The flows are made physical in one of two
//! equivalent ways:
//!
//! - **Cycle flow**: for each cycle of the basis, `Σ sign · f / b = 0`.
//! - **Voltage angle**: `f = b (θ_source - θ_sink)` with one reference angle
//!   fixed to zero per island (the island's highest-demand node).

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use pcm_core::{islands, CycleBasis, PcmError, PcmResult};

use super::{NodalInjections, WindowContext};
use crate::config::FlowFormulation;
use crate::record::{FlowRecord, WindowRows};
use crate::solver::SolvedValues;

struct LineData {
    name: String,
    source: usize,
    sink: usize,
    susceptance: f64,
}

pub(crate) struct NetworkFormulation {
    start_hour: usize,
    lines: Vec<LineData>,
    /// `flows[line][t]`
    flows: Vec<Vec<Variable>>,
    kirchhoff: Vec<Constraint>,
}

impl NetworkFormulation {
    pub fn new(ctx: &WindowContext, cycles: &CycleBasis, vars: &mut ProblemVariables) -> PcmResult<Self> {
        let network = ctx.input.network();
        let hours = ctx.hours();

        let mut lines = Vec::with_capacity(network.lines().len());
        let mut flows = Vec::with_capacity(network.lines().len());
        for line in network.lines() {
            let source = ctx.node_of(&line.name, &line.source)?;
            let sink = ctx.node_of(&line.name, &line.sink)?;
            lines.push(LineData {
                name: line.name.clone(),
                source,
                sink,
                susceptance: line.susceptance,
            });
            flows.push(
                (0..hours)
                    .map(|_| vars.add(variable().min(line.min_flow()).max(line.capacity_mw)))
                    .collect::<Vec<_>>(),
            );
        }

        let mut kirchhoff = Vec::new();
        match ctx.config.formulation {
            FlowFormulation::CycleFlow => {
                if !cycles.matches(network) {
                    return Err(PcmError::Network(
                        "cycle basis does not match the network lines".into(),
                    ));
                }
                for cycle in &cycles.cycles {
                    for t in 0..hours {
                        let drop: Expression = cycle
                            .members
                            .iter()
                            .map(|m| (f64::from(m.sign) / lines[m.line].susceptance) * flows[m.line][t])
                            .sum();
                        kirchhoff.push(constraint!(drop == 0.0));
                    }
                }
            }
            FlowFormulation::VoltageAngle => {
                let n_nodes = network.nodes().len();
                let angles: Vec<Vec<Variable>> = (0..n_nodes)
                    .map(|_| (0..hours).map(|_| vars.add(variable())).collect())
                    .collect();
                for island in islands(network) {
                    let reference = reference_node(ctx, &island);
                    for t in 0..hours {
                        kirchhoff.push(constraint!(angles[reference][t] == 0.0));
                    }
                }
                for (l, line) in lines.iter().enumerate() {
                    for t in 0..hours {
                        let angle_flow =
                            line.susceptance * (angles[line.source][t] - angles[line.sink][t]);
                        kirchhoff.push(constraint!(flows[l][t] == angle_flow));
                    }
                }
            }
        }

        Ok(Self {
            start_hour: ctx.window.start_hour,
            lines,
            flows,
            kirchhoff,
        })
    }

    /// Outgoing flow leaves the source node and arrives at the sink node.
    pub fn add_flows(&self, injections: &mut NodalInjections) {
        for (line, flows) in self.lines.iter().zip(&self.flows) {
            for (t, flow) in flows.iter().enumerate() {
                injections.add(line.source, t, Expression::from(0.0) - *flow);
                injections.add(line.sink, t, Expression::from(*flow));
            }
        }
    }

    /// Move the flow-physics constraints into the model.
    pub fn add_constraints(&mut self, constraints: &mut Vec<Constraint>) {
        constraints.append(&mut self.kirchhoff);
    }

    pub fn extract(&self, values: &SolvedValues, rows: &mut WindowRows) {
        for (line, flows) in self.lines.iter().zip(&self.flows) {
            for (t, flow) in flows.iter().enumerate() {
                rows.flows.push(FlowRecord {
                    line: line.name.clone(),
                    hour: self.start_hour + t,
                    flow_mw: values.value(*flow),
                });
            }
        }
    }
}

/// Highest total window demand in the island; first node on ties.
fn reference_node(ctx: &WindowContext, island: &[usize]) -> usize {
    let nodes = ctx.input.network().nodes();
    let demand = |idx: usize| -> f64 {
        (0..ctx.hours())
            .map(|t| ctx.input.demand(&nodes[idx].name, ctx.window.hour(t)))
            .sum()
    };
    let mut best = island[0];
    let mut best_demand = demand(best);
    for &idx in &island[1..] {
        let d = demand(idx);
        if d > best_demand {
            best = idx;
            best_demand = d;
        }
    }
    best
}
