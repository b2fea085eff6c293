//! Window MILP construction.
//!
//! The [`ModelBuilder`] turns the system input, a window and the prior
//! [`SimulationState`] into one [`WindowModel`]. Each asset variant is handled
//! by its own formulation behind the [`UnitFormulation`] contract:
//!
//! ```text
//! ┌──────────────┐   injections    ┌────────────────┐
//! │ thermal      │ ──────────────▶ │ nodal balance  │◀── line flows (network)
//! │ renewable    │   reserve       │  + shortfall   │
//! │ storage      │ ──────────────▶ │  - excess      │
//! │ hydro        │   costs         ├────────────────┤
//! └──────────────┘ ──────────────▶ │ reserve margin │
//!                                  └────────────────┘
//! ```
//!
//! The model is ephemeral. [`WindowModel::into_parts`] splits it into the
//! [`Problem`] for the solver and a [`ModelLayout`] that knows how to read the
//! solution back and derive the next window's state.

mod hydro;
mod network;
mod renewable;
mod storage;
mod system;
mod thermal;

use std::collections::HashMap;

use good_lp::{constraint, variable, variables, Constraint, Expression, ProblemVariables, Variable};
use pcm_core::{Asset, CycleBasis, HydroSchedule, PcmError, PcmResult, SimulationState, SystemInput};

use crate::config::ModelConfig;
use crate::record::{LmpRecord, WindowRows};
use crate::solver::{Problem, SolvedValues};

use self::hydro::HydroFormulation;
use self::network::NetworkFormulation;
use self::renewable::RenewableFormulation;
use self::storage::StorageFormulation;
use self::system::SystemFormulation;
use self::thermal::ThermalFormulation;

/// Position of one optimization window in the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub index: usize,
    /// Absolute hour of the first period
    pub start_hour: usize,
    pub hours: usize,
}

impl Window {
    pub fn new(index: usize, start_hour: usize, hours: usize) -> Self {
        Self {
            index,
            start_hour,
            hours,
        }
    }

    /// Absolute hour of window period `t`.
    pub fn hour(&self, t: usize) -> usize {
        self.start_hour + t
    }
}

/// Everything a formulation may read while building.
pub struct WindowContext<'a> {
    pub input: &'a SystemInput,
    pub state: &'a SimulationState,
    pub hydro: &'a HydroSchedule,
    pub config: &'a ModelConfig,
    pub window: Window,
    /// Build indicators as continuous [0, 1] variables (pricing run)
    pub relaxed: bool,
}

impl WindowContext<'_> {
    pub fn hours(&self) -> usize {
        self.window.hours
    }

    /// Commitment-style indicator: binary, or its [0, 1] relaxation when pricing.
    pub fn indicator(&self, vars: &mut ProblemVariables) -> Variable {
        if self.relaxed {
            vars.add(variable().min(0.0).max(1.0))
        } else {
            vars.add(variable().binary())
        }
    }

    /// Node position for an asset, reported against the asset when unknown.
    pub fn node_of(&self, asset: &str, node: &str) -> PcmResult<usize> {
        self.input
            .network()
            .node_index(node)
            .ok_or_else(|| PcmError::inconsistent(asset, format!("attached to unknown node '{node}'")))
    }

    /// Reserve requirement for window period `t` (MW).
    pub fn reserve_requirement(&self, t: usize) -> f64 {
        let hour = self.window.hour(t);
        match (self.input.spin_series(), self.config.spin_reserve_mw) {
            (Some(series), _) => series.get(hour).copied().unwrap_or(0.0),
            (None, Some(mw)) => mw,
            (None, None) => self.input.spin_requirement(hour, self.config.spin_reserve_factor),
        }
    }
}

/// Linear objective terms kept as (variable, coefficient) pairs so the same
/// list builds the objective and evaluates it on a solution.
#[derive(Debug, Default)]
pub(crate) struct CostTerms {
    terms: Vec<(Variable, f64)>,
}

impl CostTerms {
    pub fn add(&mut self, var: Variable, coefficient: f64) {
        if coefficient != 0.0 {
            self.terms.push((var, coefficient));
        }
    }

    pub fn expression(&self) -> Expression {
        let mut expr = Expression::from(0.0);
        for (var, coefficient) in &self.terms {
            expr += *coefficient * *var;
        }
        expr
    }

    pub fn evaluate(&self, values: &SolvedValues) -> f64 {
        self.terms.iter().map(|(v, c)| c * values.value(*v)).sum()
    }
}

/// Net injection expressions indexed by node and window period.
pub(crate) struct NodalInjections {
    per_node: Vec<Vec<Expression>>,
}

impl NodalInjections {
    fn new(nodes: usize, hours: usize) -> Self {
        Self {
            per_node: (0..nodes)
                .map(|_| (0..hours).map(|_| Expression::from(0.0)).collect())
                .collect(),
        }
    }

    pub fn add(&mut self, node: usize, t: usize, expr: Expression) {
        self.per_node[node][t] += expr;
    }

    fn into_inner(self) -> Vec<Vec<Expression>> {
        self.per_node
    }
}

/// Capability contract shared by every asset formulation.
pub(crate) trait UnitFormulation {
    /// Net power this asset injects at its node.
    fn add_injections(&self, injections: &mut NodalInjections);

    /// Reserve-providing variables per window period.
    fn add_reserve(&self, _reserve: &mut [Vec<Variable>]) {}

    /// Integer decisions, in a fixed order, fixed for the pricing run.
    fn indicators(&self) -> Vec<Variable> {
        Vec::new()
    }

    fn add_constraints(&self, constraints: &mut Vec<Constraint>);

    fn add_costs(&self, costs: &mut CostTerms);

    /// Append result rows and the asset's end-of-window state.
    fn extract(&self, values: &SolvedValues, rows: &mut WindowRows, next: &mut SimulationState);
}

/// Solution read back from a window.
#[derive(Debug, Clone)]
pub struct ExtractedWindow {
    pub rows: WindowRows,
    pub objective: f64,
    pub next_state: SimulationState,
}

/// Variable handles and metadata needed after the solve.
pub struct ModelLayout {
    window: Window,
    units: Vec<Box<dyn UnitFormulation>>,
    network: NetworkFormulation,
    system: SystemFormulation,
    costs: CostTerms,
    prior: SimulationState,
    /// Index of the first nodal-balance constraint
    balance_offset: usize,
}

impl ModelLayout {
    pub fn window(&self) -> Window {
        self.window
    }

    fn indicators(&self) -> Vec<Variable> {
        self.units.iter().flat_map(|u| u.indicators()).collect()
    }

    /// Solved value of every integer decision, rounded.
    pub fn commitment(&self, values: &SolvedValues) -> Vec<f64> {
        self.indicators()
            .into_iter()
            .map(|v| if values.flag(v) { 1.0 } else { 0.0 })
            .collect()
    }

    /// Nodal prices from the constraint duals of a pricing run.
    pub fn prices(&self, duals: &[f64]) -> Vec<LmpRecord> {
        self.system.prices(&duals[self.balance_offset.min(duals.len())..])
    }

    pub fn extract(&self, values: &SolvedValues) -> ExtractedWindow {
        let mut rows = WindowRows::default();
        let mut next = self.prior.clone();
        next.hour = self.window.start_hour + self.window.hours;
        for unit in &self.units {
            unit.extract(values, &mut rows, &mut next);
        }
        self.network.extract(values, &mut rows);
        self.system.extract(values, &mut rows);
        ExtractedWindow {
            rows,
            objective: self.costs.evaluate(values),
            next_state: next,
        }
    }
}

/// One window's MILP plus its layout.
pub struct WindowModel {
    problem: Problem,
    layout: ModelLayout,
}

impl WindowModel {
    pub fn window(&self) -> Window {
        self.layout.window
    }

    pub fn constraint_count(&self) -> usize {
        self.problem.constraints.len()
    }

    pub fn into_parts(self) -> (Problem, ModelLayout) {
        (self.problem, self.layout)
    }
}

/// Builds window models from a fixed input, cycle basis and configuration.
pub struct ModelBuilder<'a> {
    input: &'a SystemInput,
    cycles: &'a CycleBasis,
    config: &'a ModelConfig,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(input: &'a SystemInput, cycles: &'a CycleBasis, config: &'a ModelConfig) -> Self {
        Self {
            input,
            cycles,
            config,
        }
    }

    pub fn input(&self) -> &'a SystemInput {
        self.input
    }

    pub fn config(&self) -> &'a ModelConfig {
        self.config
    }

    /// Build the MILP for `window` starting from `state`.
    pub fn build(
        &self,
        window: Window,
        state: &SimulationState,
        hydro: &HydroSchedule,
    ) -> PcmResult<WindowModel> {
        self.assemble(window, state, hydro, false)
    }

    /// Build the LP used for nodal pricing: the same window with every
    /// integer decision relaxed and then fixed to `commitment`.
    pub fn build_pricing(
        &self,
        window: Window,
        state: &SimulationState,
        hydro: &HydroSchedule,
        commitment: &[f64],
    ) -> PcmResult<WindowModel> {
        let mut model = self.assemble(window, state, hydro, true)?;
        let indicators = model.layout.indicators();
        if indicators.len() != commitment.len() {
            return Err(PcmError::Validation(format!(
                "pricing window {} has {} integer decisions but the commitment has {}",
                window.index,
                indicators.len(),
                commitment.len()
            )));
        }
        for (var, fixed) in indicators.into_iter().zip(commitment) {
            model.problem.constraints.push(constraint!(var == *fixed));
        }
        Ok(model)
    }

    fn assemble(
        &self,
        window: Window,
        state: &SimulationState,
        hydro: &HydroSchedule,
        relaxed: bool,
    ) -> PcmResult<WindowModel> {
        if window.hours == 0 {
            return Err(PcmError::Validation("window must cover at least one hour".into()));
        }
        if window.start_hour + window.hours > self.input.horizon_hours() {
            return Err(PcmError::Validation(format!(
                "window {} (hours {}..{}) runs past the {}-hour horizon",
                window.index,
                window.start_hour,
                window.start_hour + window.hours,
                self.input.horizon_hours()
            )));
        }

        let ctx = WindowContext {
            input: self.input,
            state,
            hydro,
            config: self.config,
            window,
            relaxed,
        };
        let mut vars: ProblemVariables = variables!();

        // === Asset formulations ===
        // Storage goes first so units it charges from can include its charge
        // variables in their availability equality.
        let mut units: Vec<Box<dyn UnitFormulation>> = Vec::new();
        let mut attached: HashMap<String, Vec<Vec<Variable>>> = HashMap::new();
        for unit in self.input.storage_units() {
            let formulation = StorageFormulation::new(unit, &ctx, &mut vars)?;
            if let Some(target) = &unit.attached_unit {
                attached
                    .entry(target.clone())
                    .or_default()
                    .push(formulation.charge_vars().to_vec());
            }
            units.push(Box::new(formulation));
        }
        for asset in self.input.assets() {
            match asset {
                Asset::Thermal(unit) => {
                    units.push(Box::new(ThermalFormulation::new(unit, &ctx, &mut vars)?));
                }
                Asset::NonDispatchable(unit) => {
                    let charge = attached.remove(&unit.name).unwrap_or_default();
                    units.push(Box::new(RenewableFormulation::non_dispatchable(
                        unit, charge, &ctx, &mut vars,
                    )?));
                }
                Asset::Import(unit) => {
                    let charge = attached.remove(&unit.name).unwrap_or_default();
                    units.push(Box::new(RenewableFormulation::import(unit, charge, &ctx, &mut vars)?));
                }
                Asset::Hydro(unit) => {
                    units.push(Box::new(HydroFormulation::new(unit, &ctx, &mut vars)?));
                }
                Asset::Storage(_) => {}
            }
        }
        if let Some(unit) = attached.keys().next() {
            return Err(PcmError::inconsistent(
                unit.as_str(),
                "storage is attached to a unit that cannot feed it",
            ));
        }

        let mut constraints = Vec::new();
        let mut costs = CostTerms::default();
        let mut injections = NodalInjections::new(self.input.network().nodes().len(), window.hours);
        let mut reserve: Vec<Vec<Variable>> = vec![Vec::new(); window.hours];
        for unit in &units {
            unit.add_injections(&mut injections);
            unit.add_reserve(&mut reserve);
            unit.add_constraints(&mut constraints);
            unit.add_costs(&mut costs);
        }

        // === Network and system-wide constraints ===
        let mut network = NetworkFormulation::new(&ctx, self.cycles, &mut vars)?;
        network.add_flows(&mut injections);
        network.add_constraints(&mut constraints);

        let system = SystemFormulation::new(&ctx, reserve, &mut vars);
        let balance_offset = constraints.len();
        system.add_constraints(injections.into_inner(), &mut constraints);
        system.add_costs(&mut costs);

        let objective = costs.expression();
        Ok(WindowModel {
            problem: Problem {
                vars,
                objective,
                constraints,
            },
            layout: ModelLayout {
                window,
                units,
                network,
                system,
                costs,
                prior: state.clone(),
                balance_offset,
            },
        })
    }
}
