//! Thermal unit commitment formulation.
//!
//! Three binaries per hour (online `u`, start `v`, shutdown `w`) and a
//! continuous output above minimum `p`, so total output is `p + Pmin·u`.
//!
//! | Constraint | Form |
//! |------------|------|
//! | Status logic | `u[t] - u[t-1] = v[t] - w[t]` |
//! | Capacity | `p[t] + r[t] ≤ (Pmax[t] - Pmin)·u[t]` |
//! | Ramp up | `p[t] - p[t-1] ≤ (SU - Pmin - RU)·v[t] + RU·u[t]` |
//! | Ramp down | `p[t-1] - p[t] ≤ (SD - Pmin - RD)·w[t] + RD·u[t-1]` |
//! | Min up | `Σ v[t-TU+1..=t] ≤ u[t]` |
//! | Min down | `Σ w[t-TD+1..=t] ≤ 1 - u[t]` |
//!
//! At `t = 0` the "previous hour" terms come from the prior [`UnitState`],
//! which is how ramping and minimum up/down time chain across windows.
//!
//! A period whose derated capacity falls below `Pmin` is a forced outage:
//! the unit is held offline and minimum up time and ramp-down stop binding
//! there.

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use pcm_core::{PcmResult, SimulationState, ThermalUnit, UnitState};

use super::{CostTerms, NodalInjections, UnitFormulation, WindowContext};
use crate::record::{ThermalRecord, WindowRows};
use crate::solver::SolvedValues;

pub(crate) struct ThermalFormulation {
    unit: ThermalUnit,
    node: usize,
    start_hour: usize,
    prior: UnitState,
    /// Derated maximum output per period (MW)
    capacity: Vec<f64>,
    /// Marginal cost per period ($/MWh)
    marginal_cost: Vec<f64>,
    curtail_factor: f64,
    above_min: Vec<Variable>,
    online: Vec<Variable>,
    startup: Vec<Variable>,
    shutdown: Vec<Variable>,
    reserve: Option<Vec<Variable>>,
    curtail: Option<Vec<Variable>>,
}

impl ThermalFormulation {
    pub fn new(unit: &ThermalUnit, ctx: &WindowContext, vars: &mut ProblemVariables) -> PcmResult<Self> {
        let node = ctx.node_of(&unit.name, &unit.node)?;
        let hours = ctx.hours();
        let capacity: Vec<f64> = (0..hours)
            .map(|t| ctx.input.thermal_capacity(unit, ctx.window.hour(t)))
            .collect();
        let marginal_cost = (0..hours)
            .map(|t| unit.variable_cost(ctx.input.contract_price(&unit.fuel_contract, ctx.window.hour(t))))
            .collect();

        let above_min = capacity
            .iter()
            .map(|cap| vars.add(variable().min(0.0).max((cap - unit.min_capacity_mw).max(0.0))))
            .collect();
        let online = (0..hours).map(|_| ctx.indicator(vars)).collect();
        let startup = (0..hours).map(|_| ctx.indicator(vars)).collect();
        let shutdown = (0..hours).map(|_| ctx.indicator(vars)).collect();
        let reserve = unit
            .reserve_eligible
            .then(|| (0..hours).map(|_| vars.add(variable().min(0.0))).collect());
        let curtail = unit
            .must_take
            .then(|| (0..hours).map(|_| vars.add(variable().min(0.0))).collect());

        Ok(Self {
            unit: unit.clone(),
            node,
            start_hour: ctx.window.start_hour,
            prior: ctx.state.unit(&unit.name),
            capacity,
            marginal_cost,
            curtail_factor: ctx.config.curtail_cost_factor,
            above_min,
            online,
            startup,
            shutdown,
            reserve,
            curtail,
        })
    }

    fn hours(&self) -> usize {
        self.online.len()
    }

    /// Above-minimum output in the hour before the window.
    fn prior_above_min(&self) -> f64 {
        if self.prior.online {
            (self.prior.dispatch_mw - self.unit.min_capacity_mw).max(0.0)
        } else {
            0.0
        }
    }

    fn total_output(&self, t: usize) -> Expression {
        self.above_min[t] + self.unit.min_capacity_mw * self.online[t]
    }

    fn status_constraints(&self, out: &mut Vec<Constraint>) {
        let u_prev = if self.prior.online { 1.0 } else { 0.0 };
        for t in 0..self.hours() {
            let (u, v, w) = (self.online[t], self.startup[t], self.shutdown[t]);
            if t == 0 {
                out.push(constraint!(u - v + w == u_prev));
            } else {
                let prev = self.online[t - 1];
                out.push(constraint!(u - prev - v + w == 0.0));
            }
            out.push(constraint!(v + w <= 1.0));
        }
    }

    /// Whether the derated capacity still reaches minimum output in period `t`.
    fn available(&self, t: usize) -> bool {
        self.capacity[t] >= self.unit.min_capacity_mw - 1e-9
    }

    fn headroom(&self, t: usize) -> f64 {
        (self.capacity[t] - self.unit.min_capacity_mw).max(0.0)
    }

    fn capacity_constraints(&self, out: &mut Vec<Constraint>) {
        for t in 0..self.hours() {
            if !self.available(t) {
                // Derated below minimum output: forced offline.
                out.push(constraint!(self.online[t] == 0.0));
            }
            let mut used = Expression::from(self.above_min[t]);
            if let Some(reserve) = &self.reserve {
                used += reserve[t];
            }
            out.push(constraint!(used <= self.headroom(t) * self.online[t]));

            if let Some(curtail) = &self.curtail {
                // Must-take: whatever is not produced is curtailed.
                out.push(constraint!(self.total_output(t) + curtail[t] == self.capacity[t]));
            }
        }
    }

    fn ramp_constraints(&self, out: &mut Vec<Constraint>) {
        let u = &self.unit;
        let pmin = u.min_capacity_mw;
        let start_coeff = u.startup_ramp() - pmin - u.ramp_up_mw;
        let p_prior = self.prior_above_min();
        let u_prior = if self.prior.online { 1.0 } else { 0.0 };

        for t in 0..self.hours() {
            let p = self.above_min[t];
            let ramp_up_bound = start_coeff * self.startup[t] + u.ramp_up_mw * self.online[t];
            if t == 0 {
                out.push(constraint!(p <= ramp_up_bound + p_prior));
            } else {
                out.push(constraint!(p - self.above_min[t - 1] <= ramp_up_bound));
            }

            // A forced outage trips the unit regardless of its ramp limits.
            if !self.available(t) {
                continue;
            }
            // A derate steeper than the ramp-down limit is followed, not violated.
            let previous_headroom = if t == 0 { p_prior } else { self.headroom(t - 1) };
            let ramp_down = u.ramp_down_mw.max(previous_headroom - self.headroom(t));
            let stop_coeff = u.shutdown_ramp() - pmin - ramp_down;
            if t == 0 {
                let ramp_down_bound = p + stop_coeff * self.shutdown[t] + ramp_down * u_prior;
                out.push(constraint!(p_prior <= ramp_down_bound));
            } else {
                let p_prev = self.above_min[t - 1];
                let ramp_down_bound = stop_coeff * self.shutdown[t] + ramp_down * self.online[t - 1];
                out.push(constraint!(p_prev - p <= ramp_down_bound));
            }
        }
    }

    fn min_up_down_constraints(&self, out: &mut Vec<Constraint>) {
        let hours = self.hours();
        let up = self.unit.min_up_hours;
        let down = self.unit.min_down_hours;

        // Carry-over from the previous window, cut short by a forced outage.
        for t in 0..self.prior.remaining_up(up).min(hours) {
            if !self.available(t) {
                break;
            }
            out.push(constraint!(self.online[t] == 1.0));
        }
        for t in 0..self.prior.remaining_down(down).min(hours) {
            out.push(constraint!(self.online[t] == 0.0));
        }

        for t in 0..hours {
            if up > 1 && self.available(t) {
                let first = (t + 1).saturating_sub(up);
                let starts: Expression = self.startup[first..=t].iter().copied().sum();
                out.push(constraint!(starts <= self.online[t]));
            }
            if down > 1 {
                let first = (t + 1).saturating_sub(down);
                let stops: Expression = self.shutdown[first..=t].iter().copied().sum();
                out.push(constraint!(stops + self.online[t] <= 1.0));
            }
        }
    }
}

impl UnitFormulation for ThermalFormulation {
    fn add_injections(&self, injections: &mut NodalInjections) {
        for t in 0..self.hours() {
            injections.add(self.node, t, self.total_output(t));
        }
    }

    fn add_reserve(&self, reserve: &mut [Vec<Variable>]) {
        if let Some(vars) = &self.reserve {
            for (t, var) in vars.iter().enumerate() {
                reserve[t].push(*var);
            }
        }
    }

    fn indicators(&self) -> Vec<Variable> {
        [&self.online, &self.startup, &self.shutdown]
            .into_iter()
            .flatten()
            .copied()
            .collect()
    }

    fn add_constraints(&self, constraints: &mut Vec<Constraint>) {
        self.status_constraints(constraints);
        self.capacity_constraints(constraints);
        self.ramp_constraints(constraints);
        self.min_up_down_constraints(constraints);
    }

    fn add_costs(&self, costs: &mut CostTerms) {
        let pmin = self.unit.min_capacity_mw;
        for t in 0..self.hours() {
            let mc = self.marginal_cost[t];
            costs.add(self.above_min[t], mc);
            costs.add(self.online[t], self.unit.fixed_cost + mc * pmin);
            costs.add(self.startup[t], self.unit.startup_cost);
            if let Some(curtail) = &self.curtail {
                costs.add(curtail[t], mc * self.curtail_factor);
            }
        }
    }

    fn extract(&self, values: &SolvedValues, rows: &mut WindowRows, next: &mut SimulationState) {
        let mut statuses = Vec::with_capacity(self.hours());
        let mut last_output = 0.0;
        for t in 0..self.hours() {
            let online = values.flag(self.online[t]);
            // Offline hours report exactly zero output.
            let dispatch = if online {
                values.value(self.above_min[t]).max(0.0) + self.unit.min_capacity_mw
            } else {
                0.0
            };
            let reserve = match (&self.reserve, online) {
                (Some(vars), true) => values.value(vars[t]).max(0.0),
                _ => 0.0,
            };
            let curtailed = self
                .curtail
                .as_ref()
                .map(|vars| values.value(vars[t]).max(0.0))
                .unwrap_or(0.0);
            rows.thermal.push(ThermalRecord {
                unit: self.unit.name.clone(),
                hour: self.start_hour + t,
                online,
                startup: values.flag(self.startup[t]),
                shutdown: values.flag(self.shutdown[t]),
                dispatch_mw: dispatch,
                reserve_mw: reserve,
                curtailed_mw: curtailed,
            });
            statuses.push(online);
            last_output = dispatch;
        }
        next.units
            .insert(self.unit.name.clone(), self.prior.advance(&statuses, last_output));
    }
}
