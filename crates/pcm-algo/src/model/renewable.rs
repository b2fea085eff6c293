//! Non-dispatchable and import units.
//!
//! Both are offers bounded by an hourly availability. A non-dispatchable unit
//! always satisfies `dispatched + curtailed + charged = available` as an
//! equality so that no energy disappears. An import only does so when it is
//! must-take; otherwise it may simply be left unused.

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use pcm_core::{ImportUnit, NonDispatchableUnit, PcmError, PcmResult, SimulationState};

use super::{CostTerms, NodalInjections, UnitFormulation, WindowContext};
use crate::record::{DispatchRecord, WindowRows};
use crate::solver::SolvedValues;

pub(crate) struct RenewableFormulation {
    name: String,
    kind: &'static str,
    node_name: String,
    node: usize,
    start_hour: usize,
    available: Vec<f64>,
    price: Vec<f64>,
    must_take: bool,
    curtail_factor: f64,
    dispatch: Vec<Variable>,
    /// Present whenever the availability is an equality
    curtail: Option<Vec<Variable>>,
    /// Charge variables of attached storage, one list per storage unit
    attached: Vec<Vec<Variable>>,
}

impl RenewableFormulation {
    pub fn non_dispatchable(
        unit: &NonDispatchableUnit,
        attached: Vec<Vec<Variable>>,
        ctx: &WindowContext,
        vars: &mut ProblemVariables,
    ) -> PcmResult<Self> {
        let mut available = Vec::with_capacity(ctx.hours());
        for t in 0..ctx.hours() {
            let value = ctx.input.availability(&unit.name, ctx.window.hour(t)).ok_or_else(|| {
                PcmError::inconsistent(&unit.name, format!("no availability for hour {}", ctx.window.hour(t)))
            })?;
            available.push(value.max(0.0));
        }
        Self::build(
            &unit.name,
            "non_dispatchable",
            &unit.node,
            &unit.contract,
            unit.must_take,
            true,
            available,
            attached,
            ctx,
            vars,
        )
    }

    pub fn import(
        unit: &ImportUnit,
        attached: Vec<Vec<Variable>>,
        ctx: &WindowContext,
        vars: &mut ProblemVariables,
    ) -> PcmResult<Self> {
        let available = (0..ctx.hours())
            .map(|t| {
                ctx.input
                    .availability(&unit.name, ctx.window.hour(t))
                    .unwrap_or(unit.max_capacity_mw)
                    .max(0.0)
            })
            .collect();
        Self::build(
            &unit.name,
            "import",
            &unit.node,
            &unit.contract,
            unit.must_take,
            unit.must_take,
            available,
            attached,
            ctx,
            vars,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        name: &str,
        kind: &'static str,
        node: &str,
        contract: &str,
        must_take: bool,
        equality: bool,
        available: Vec<f64>,
        attached: Vec<Vec<Variable>>,
        ctx: &WindowContext,
        vars: &mut ProblemVariables,
    ) -> PcmResult<Self> {
        let node_idx = ctx.node_of(name, node)?;
        let price = (0..ctx.hours())
            .map(|t| ctx.input.contract_price(contract, ctx.window.hour(t)))
            .collect();
        let dispatch = available
            .iter()
            .map(|cap| vars.add(variable().min(0.0).max(*cap)))
            .collect();
        let curtail = equality.then(|| {
            available
                .iter()
                .map(|cap| vars.add(variable().min(0.0).max(*cap)))
                .collect()
        });
        Ok(Self {
            name: name.to_string(),
            kind,
            node_name: node.to_string(),
            node: node_idx,
            start_hour: ctx.window.start_hour,
            available,
            price,
            must_take,
            curtail_factor: ctx.config.curtail_cost_factor,
            dispatch,
            curtail,
            attached,
        })
    }

    fn charged(&self, t: usize) -> Expression {
        self.attached.iter().map(|vars| vars[t]).sum()
    }
}

impl UnitFormulation for RenewableFormulation {
    fn add_injections(&self, injections: &mut NodalInjections) {
        for (t, var) in self.dispatch.iter().enumerate() {
            injections.add(self.node, t, Expression::from(*var));
        }
    }

    fn add_constraints(&self, constraints: &mut Vec<Constraint>) {
        for t in 0..self.dispatch.len() {
            let used = self.dispatch[t] + self.charged(t);
            match &self.curtail {
                Some(curtail) => constraints.push(constraint!(used + curtail[t] == self.available[t])),
                None => constraints.push(constraint!(used <= self.available[t])),
            }
        }
    }

    fn add_costs(&self, costs: &mut CostTerms) {
        for t in 0..self.dispatch.len() {
            costs.add(self.dispatch[t], self.price[t]);
            if let (true, Some(curtail)) = (self.must_take, &self.curtail) {
                costs.add(curtail[t], self.price[t] * self.curtail_factor);
            }
        }
    }

    fn extract(&self, values: &SolvedValues, rows: &mut WindowRows, _next: &mut SimulationState) {
        for t in 0..self.dispatch.len() {
            let curtailed = self
                .curtail
                .as_ref()
                .map(|vars| values.value(vars[t]).max(0.0))
                .unwrap_or(0.0);
            let charged: f64 = self.attached.iter().map(|vars| values.value(vars[t])).sum();
            rows.dispatch.push(DispatchRecord {
                asset: self.name.clone(),
                kind: self.kind.to_string(),
                node: self.node_name.clone(),
                hour: self.start_hour + t,
                dispatch_mw: values.value(self.dispatch[t]).max(0.0),
                curtailed_mw: curtailed,
                charged_mw: charged.max(0.0),
            });
        }
    }
}
