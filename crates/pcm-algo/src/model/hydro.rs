//! Hydro units with daily energy budgets.
//!
//! Hourly output is bounded by turbine capacity. For every calendar day that
//! overlaps the window, summed output is bounded by the day's budget from the
//! [`HydroSchedule`](pcm_core::HydroSchedule), prorated by the share of the
//! day inside the window. Must-take units turn the budget into an equality
//! with a daily curtailment variable.
//!
//! Optional ramp limits bind hour to hour and, through the last-hour output
//! kept in the [`SimulationState`], across window boundaries. Ramp-up is
//! hard; ramp-down carries a penalized slack so a shrinking budget can always
//! be met. A ramp penalty prices every MW of change in either direction.

use std::collections::BTreeMap;

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use pcm_core::{day_of_hour, HydroUnit, PcmResult, SimulationState, HOURS_PER_DAY};

use super::{CostTerms, NodalInjections, UnitFormulation, WindowContext};
use crate::record::{DispatchRecord, WindowRows};
use crate::solver::SolvedValues;

struct DayBudget {
    /// Window periods belonging to this day
    periods: Vec<usize>,
    energy_mwh: f64,
    curtail: Option<Variable>,
}

pub(crate) struct HydroFormulation {
    unit: HydroUnit,
    node: usize,
    start_hour: usize,
    price: Vec<f64>,
    curtail_factor: f64,
    dispatch: Vec<Variable>,
    days: Vec<DayBudget>,
    /// Output in the hour before the window, when known
    prior: Option<f64>,
    ramp_violation_cost: f64,
    ramp_down_slack: Option<Vec<Variable>>,
    /// Magnitude of upward and downward change per hour
    ramp_moves: Option<(Vec<Variable>, Vec<Variable>)>,
}

impl HydroFormulation {
    pub fn new(unit: &HydroUnit, ctx: &WindowContext, vars: &mut ProblemVariables) -> PcmResult<Self> {
        let node = ctx.node_of(&unit.name, &unit.node)?;
        let hours = ctx.hours();
        let price = (0..hours)
            .map(|t| match &unit.contract {
                Some(contract) => ctx.input.contract_price(contract, ctx.window.hour(t)),
                None => 0.0,
            })
            .collect();
        let dispatch = (0..hours)
            .map(|_| vars.add(variable().min(0.0).max(unit.max_capacity_mw)))
            .collect();

        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for t in 0..hours {
            grouped.entry(day_of_hour(ctx.window.hour(t))).or_default().push(t);
        }
        let days = grouped
            .into_iter()
            .map(|(day, periods)| {
                let full_day = ctx
                    .hydro
                    .daily_energy(&unit.name, day)
                    .unwrap_or(unit.max_capacity_mw * HOURS_PER_DAY as f64);
                let share = periods.len() as f64 / HOURS_PER_DAY as f64;
                DayBudget {
                    periods,
                    energy_mwh: full_day.max(0.0) * share,
                    curtail: unit.must_take.then(|| vars.add(variable().min(0.0))),
                }
            })
            .collect();

        let mut positive = |count: usize| -> Vec<Variable> {
            (0..count).map(|_| vars.add(variable().min(0.0))).collect()
        };
        let ramp_down_slack = unit.ramp_down_mw.map(|_| positive(hours));
        let ramp_moves = (unit.ramp_penalty > 0.0).then(|| (positive(hours), positive(hours)));

        Ok(Self {
            unit: unit.clone(),
            node,
            start_hour: ctx.window.start_hour,
            price,
            curtail_factor: ctx.config.curtail_cost_factor,
            dispatch,
            days,
            prior: ctx.state.hydro_output(&unit.name),
            ramp_violation_cost: ctx.config.penalties.ramp_violation,
            ramp_down_slack,
            ramp_moves,
        })
    }

    /// Output of the hour before period `t`, if there is one.
    fn previous(&self, t: usize) -> Option<Expression> {
        match t {
            0 => self.prior.map(Expression::from),
            _ => Some(Expression::from(self.dispatch[t - 1])),
        }
    }

    fn ramp_constraints(&self, out: &mut Vec<Constraint>) {
        for t in 0..self.dispatch.len() {
            let Some(previous) = self.previous(t) else {
                continue;
            };
            let rise = Expression::from(self.dispatch[t]) - previous.clone();
            let fall = previous - self.dispatch[t];
            if let Some(limit) = self.unit.ramp_up_mw {
                out.push(constraint!(rise.clone() <= limit));
            }
            if let (Some(limit), Some(slack)) = (self.unit.ramp_down_mw, &self.ramp_down_slack) {
                out.push(constraint!(fall.clone() <= limit + slack[t]));
            }
            if let Some((up, down)) = &self.ramp_moves {
                out.push(constraint!(up[t] >= rise));
                out.push(constraint!(down[t] >= fall));
            }
        }
    }
}

impl UnitFormulation for HydroFormulation {
    fn add_injections(&self, injections: &mut NodalInjections) {
        for (t, var) in self.dispatch.iter().enumerate() {
            injections.add(self.node, t, Expression::from(*var));
        }
    }

    fn add_constraints(&self, constraints: &mut Vec<Constraint>) {
        self.ramp_constraints(constraints);
        for day in &self.days {
            let energy: Expression = day.periods.iter().map(|t| self.dispatch[*t]).sum();
            match day.curtail {
                Some(curtail) => constraints.push(constraint!(energy + curtail == day.energy_mwh)),
                None => constraints.push(constraint!(energy <= day.energy_mwh)),
            }
        }
    }

    fn add_costs(&self, costs: &mut CostTerms) {
        for (t, var) in self.dispatch.iter().enumerate() {
            costs.add(*var, self.price[t]);
        }
        for day in &self.days {
            if let (Some(curtail), Some(first)) = (day.curtail, day.periods.first()) {
                costs.add(curtail, self.price[*first] * self.curtail_factor);
            }
        }
        for var in self.ramp_down_slack.iter().flatten() {
            costs.add(*var, self.ramp_violation_cost);
        }
        if let Some((up, down)) = &self.ramp_moves {
            for var in up.iter().chain(down) {
                costs.add(*var, self.unit.ramp_penalty);
            }
        }
    }

    fn extract(&self, values: &SolvedValues, rows: &mut WindowRows, next: &mut SimulationState) {
        for day in &self.days {
            let curtailed_per_hour = day
                .curtail
                .map(|c| values.value(c).max(0.0) / day.periods.len() as f64)
                .unwrap_or(0.0);
            for &t in &day.periods {
                rows.dispatch.push(DispatchRecord {
                    asset: self.unit.name.clone(),
                    kind: "hydro".to_string(),
                    node: self.unit.node.clone(),
                    hour: self.start_hour + t,
                    dispatch_mw: values.value(self.dispatch[t]).max(0.0),
                    curtailed_mw: curtailed_per_hour,
                    charged_mw: 0.0,
                });
            }
        }
        if let Some(last) = self.dispatch.last() {
            next.hydro.insert(self.unit.name.clone(), values.value(*last).max(0.0));
        }
    }
}
