//! Energy storage formulation.
//!
//! `level[t] = (1 - δ)·level[t-1] + η_in·charge[t] - discharge[t]/η_out`,
//! with `level[-1]` taken from the prior state. A single binary mode keeps
//! charging and discharging mutually exclusive. Storage attached to a unit
//! charges from that unit's availability instead of from its node.

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use pcm_core::{PcmResult, SimulationState, StorageState, StorageUnit};

use super::{CostTerms, NodalInjections, UnitFormulation, WindowContext};
use crate::record::{StorageRecord, WindowRows};
use crate::solver::SolvedValues;

pub(crate) struct StorageFormulation {
    unit: StorageUnit,
    node: usize,
    start_hour: usize,
    prior_level: f64,
    price: Vec<f64>,
    charge: Vec<Variable>,
    discharge: Vec<Variable>,
    level: Vec<Variable>,
    /// 1 while charging
    mode: Vec<Variable>,
    reserve: Option<Vec<Variable>>,
}

impl StorageFormulation {
    pub fn new(unit: &StorageUnit, ctx: &WindowContext, vars: &mut ProblemVariables) -> PcmResult<Self> {
        let node = ctx.node_of(&unit.name, &unit.node)?;
        let hours = ctx.hours();
        let price = (0..hours)
            .map(|t| match &unit.contract {
                Some(contract) => ctx.input.contract_price(contract, ctx.window.hour(t)),
                None => 0.0,
            })
            .collect();
        let charge = (0..hours)
            .map(|_| vars.add(variable().min(0.0).max(unit.max_charge_mw)))
            .collect();
        let discharge = (0..hours)
            .map(|_| vars.add(variable().min(0.0).max(unit.max_discharge_mw)))
            .collect();
        let level = (0..hours)
            .map(|_| vars.add(variable().min(unit.min_level_mwh).max(unit.max_level_mwh)))
            .collect();
        let mode = (0..hours).map(|_| ctx.indicator(vars)).collect();
        let reserve = unit
            .reserve_eligible
            .then(|| (0..hours).map(|_| vars.add(variable().min(0.0))).collect());
        let prior_level = ctx
            .state
            .storage_level(&unit.name, unit.initial_level_mwh)
            .clamp(unit.min_level_mwh, unit.max_level_mwh);

        Ok(Self {
            unit: unit.clone(),
            node,
            start_hour: ctx.window.start_hour,
            prior_level,
            price,
            charge,
            discharge,
            level,
            mode,
            reserve,
        })
    }

    pub fn charge_vars(&self) -> &[Variable] {
        &self.charge
    }
}

impl UnitFormulation for StorageFormulation {
    fn add_injections(&self, injections: &mut NodalInjections) {
        let grid_charging = self.unit.attached_unit.is_none();
        for t in 0..self.charge.len() {
            let mut net = Expression::from(self.discharge[t]);
            if grid_charging {
                net -= self.charge[t];
            }
            injections.add(self.node, t, net);
        }
    }

    fn add_reserve(&self, reserve: &mut [Vec<Variable>]) {
        if let Some(vars) = &self.reserve {
            for (t, var) in vars.iter().enumerate() {
                reserve[t].push(*var);
            }
        }
    }

    fn add_constraints(&self, constraints: &mut Vec<Constraint>) {
        let s = &self.unit;
        let retain = 1.0 - s.self_discharge_rate;
        for t in 0..self.charge.len() {
            let (charge, discharge, level, mode) =
                (self.charge[t], self.discharge[t], self.level[t], self.mode[t]);
            constraints.push(constraint!(charge <= s.max_charge_mw * mode));
            constraints.push(constraint!(discharge + s.max_discharge_mw * mode <= s.max_discharge_mw));

            let inflow = s.charge_efficiency * charge - (1.0 / s.discharge_efficiency) * discharge;
            if t == 0 {
                constraints.push(constraint!(level - inflow == retain * self.prior_level));
            } else {
                let prev = self.level[t - 1];
                constraints.push(constraint!(level - retain * prev - inflow == 0.0));
            }

            if let Some(reserve) = &self.reserve {
                let r = reserve[t];
                constraints.push(constraint!(r + discharge <= s.max_discharge_mw));
                constraints.push(constraint!(
                    r - s.discharge_efficiency * level <= -s.discharge_efficiency * s.min_level_mwh
                ));
            }
        }
    }

    fn indicators(&self) -> Vec<Variable> {
        self.mode.clone()
    }

    fn add_costs(&self, costs: &mut CostTerms) {
        for (t, var) in self.discharge.iter().enumerate() {
            costs.add(*var, self.price[t]);
        }
    }

    fn extract(&self, values: &SolvedValues, rows: &mut WindowRows, next: &mut SimulationState) {
        let mut last_level = self.prior_level;
        for t in 0..self.charge.len() {
            let level = values.value(self.level[t]);
            rows.storage.push(StorageRecord {
                unit: self.unit.name.clone(),
                hour: self.start_hour + t,
                charge_mw: values.value(self.charge[t]).max(0.0),
                discharge_mw: values.value(self.discharge[t]).max(0.0),
                level_mwh: level,
            });
            last_level = level;
        }
        next.storage
            .insert(self.unit.name.clone(), StorageState { level_mwh: last_level });
    }
}
