//! System-wide constraints: nodal balance and spinning reserve.
//!
//! Both carry penalized slack so that every window stays feasible and an
//! unserved load shows up as cost instead of as a solver infeasibility.

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};

use super::{CostTerms, WindowContext};
use crate::config::PenaltyWeights;
use crate::record::{LmpRecord, NodeSlackRecord, ReserveRecord, WindowRows};
use crate::solver::SolvedValues;

pub(crate) struct SystemFormulation {
    start_hour: usize,
    penalties: PenaltyWeights,
    nodes: Vec<String>,
    /// `demand[node][t]`
    demand: Vec<Vec<f64>>,
    shortfall: Vec<Vec<Variable>>,
    excess: Vec<Vec<Variable>>,
    requirement: Vec<f64>,
    reserve: Vec<Vec<Variable>>,
    reserve_shortfall: Vec<Variable>,
}

impl SystemFormulation {
    pub fn new(ctx: &WindowContext, reserve: Vec<Vec<Variable>>, vars: &mut ProblemVariables) -> Self {
        let hours = ctx.hours();
        let nodes: Vec<String> = ctx
            .input
            .network()
            .nodes()
            .iter()
            .map(|n| n.name.clone())
            .collect();
        let demand = nodes
            .iter()
            .map(|n| (0..hours).map(|t| ctx.input.demand(n, ctx.window.hour(t))).collect())
            .collect();
        let mut slack = || -> Vec<Vec<Variable>> {
            nodes
                .iter()
                .map(|_| (0..hours).map(|_| vars.add(variable().min(0.0))).collect())
                .collect()
        };
        let shortfall = slack();
        let excess = slack();
        let requirement = (0..hours).map(|t| ctx.reserve_requirement(t).max(0.0)).collect();
        let reserve_shortfall = (0..hours).map(|_| vars.add(variable().min(0.0))).collect();

        Self {
            start_hour: ctx.window.start_hour,
            penalties: ctx.config.penalties,
            nodes,
            demand,
            shortfall,
            excess,
            requirement,
            reserve,
            reserve_shortfall,
        }
    }

    /// Nodal balance `injection + shortfall - excess = demand` and the reserve margin.
    pub fn add_constraints(&self, injections: Vec<Vec<Expression>>, constraints: &mut Vec<Constraint>) {
        for (n, per_hour) in injections.into_iter().enumerate() {
            for (t, injection) in per_hour.into_iter().enumerate() {
                let balance = injection + self.shortfall[n][t] - self.excess[n][t];
                constraints.push(constraint!(balance == self.demand[n][t]));
            }
        }
        for (t, required) in self.requirement.iter().enumerate() {
            if *required <= 0.0 {
                continue;
            }
            let provided: Expression = self.reserve[t].iter().copied().sum();
            constraints.push(constraint!(provided + self.reserve_shortfall[t] >= *required));
        }
    }

    /// Read nodal prices from balance duals laid out node-major, as pushed by
    /// [`Self::add_constraints`].
    pub fn prices(&self, balance_duals: &[f64]) -> Vec<LmpRecord> {
        let mut prices = Vec::new();
        for (n, node) in self.nodes.iter().enumerate() {
            let hours = self.demand[n].len();
            for t in 0..hours {
                let Some(dual) = balance_duals.get(n * hours + t) else {
                    continue;
                };
                prices.push(LmpRecord {
                    node: node.clone(),
                    hour: self.start_hour + t,
                    lmp: *dual,
                });
            }
        }
        prices
    }

    pub fn add_costs(&self, costs: &mut CostTerms) {
        for n in 0..self.nodes.len() {
            for t in 0..self.shortfall[n].len() {
                costs.add(self.shortfall[n][t], self.penalties.load_shortfall);
                costs.add(self.excess[n][t], self.penalties.excess_generation);
            }
        }
        for var in &self.reserve_shortfall {
            costs.add(*var, self.penalties.reserve_shortfall);
        }
    }

    pub fn extract(&self, values: &SolvedValues, rows: &mut WindowRows) {
        for (n, node) in self.nodes.iter().enumerate() {
            for t in 0..self.shortfall[n].len() {
                rows.node_slack.push(NodeSlackRecord {
                    node: node.clone(),
                    hour: self.start_hour + t,
                    demand_mw: self.demand[n][t],
                    shortfall_mw: values.value(self.shortfall[n][t]).max(0.0),
                    excess_mw: values.value(self.excess[n][t]).max(0.0),
                });
            }
        }
        for (t, required) in self.requirement.iter().enumerate() {
            let provided: f64 = self.reserve[t].iter().map(|v| values.value(*v)).sum();
            let shortfall = if *required > 0.0 {
                values.value(self.reserve_shortfall[t]).max(0.0)
            } else {
                0.0
            };
            rows.reserve.push(ReserveRecord {
                hour: self.start_hour + t,
                requirement_mw: *required,
                provided_mw: provided,
                shortfall_mw: shortfall,
            });
        }
    }
}
