//! Grid/reservoir coupling.
//!
//! Within one window the coupler alternates between the grid model and a
//! dispatch-driven basin proposal:
//!
//! ```text
//! solve window ──▶ daily hydro dispatch ──▶ basin.propose ──▶ converged?
//!      ▲                                                        │ no
//!      └──────────── proposal becomes the hydro budget ◀────────┘
//! ```
//!
//! A window converges when, for every coupled unit and day,
//! `|proposed - dispatched| <= max(tolerance * dispatched, abs_tolerance_mwh)`.
//! The basin is never mutated here; the accepted proposal travels back in
//! [`CoupledWindow::proposal`] and the caller commits it.

use std::collections::BTreeMap;

use pcm_core::{day_of_hour, HydroSchedule, PcmResult, SimulationState, HOURS_PER_DAY};
use tracing::{debug, info};

use crate::config::CouplingConfig;
use crate::model::{ModelBuilder, Window};
use crate::reservoir::{Basin, BasinProposal, DispatchTarget};
use crate::simulation::{solve_window, SolvedWindow};
use crate::solver::{MilpBackend, SolverConfig};

/// Outcome of the coupling loop for one window.
#[derive(Debug, Clone)]
pub struct CoupledWindow {
    /// Last grid solution
    pub solved: SolvedWindow,
    /// Number of basin proposals evaluated
    pub iterations: usize,
    pub converged: bool,
    /// Largest |proposed - dispatched| of the last iteration (MWh)
    pub max_deviation: f64,
    /// Reservoir operation matching `solved`, not yet committed
    pub proposal: Option<BasinProposal>,
}

pub struct Coupler<'a> {
    config: &'a CouplingConfig,
    solver: &'a SolverConfig,
    backend: &'a dyn MilpBackend,
}

impl<'a> Coupler<'a> {
    pub fn new(config: &'a CouplingConfig, solver: &'a SolverConfig, backend: &'a dyn MilpBackend) -> Self {
        Self { config, solver, backend }
    }

    /// Iterate one window to convergence or to the iteration cap.
    ///
    /// `hydro` is overwritten with every proposal; after the call it holds
    /// the energy of the returned proposal for the window's days.
    pub fn couple_window(
        &self,
        builder: &ModelBuilder,
        window: Window,
        state: &SimulationState,
        hydro: &mut HydroSchedule,
        basin: &Basin,
    ) -> PcmResult<CoupledWindow> {
        let first_day = day_of_hour(window.start_hour);
        let days = first_day..first_day + window.hours.div_ceil(HOURS_PER_DAY);
        let units: Vec<(String, f64)> = builder
            .input()
            .hydro_units()
            .filter(|u| basin.units().any(|fed| fed == u.name))
            .map(|u| (u.name.clone(), u.max_capacity_mw * HOURS_PER_DAY as f64))
            .collect();

        let mut solved = solve_window(builder, window, state, hydro, self.backend, self.solver)?;
        if units.is_empty() {
            return Ok(CoupledWindow {
                solved,
                iterations: 0,
                converged: true,
                max_deviation: 0.0,
                proposal: None,
            });
        }

        let max_iterations = self.config.max_iterations.max(1);
        let mut iterations = 0;
        loop {
            let dispatched = solved.extracted.rows.hydro_daily_dispatch();
            let mut targets = BTreeMap::new();
            for (unit, turbine_limit) in &units {
                for day in days.clone() {
                    let key = (unit.clone(), day);
                    let target = DispatchTarget {
                        dispatched_mwh: dispatched.get(&key).copied().unwrap_or(0.0),
                        budget_mwh: hydro.daily_energy(unit, day).unwrap_or(*turbine_limit),
                    };
                    targets.insert(key, target);
                }
            }

            let proposal = basin.propose(days.clone(), &targets)?;
            iterations += 1;
            let proposed = proposal.energy();
            let mut converged = true;
            let mut max_deviation: f64 = 0.0;
            for (key, target) in &targets {
                let deviation = (proposed.get(key).copied().unwrap_or(0.0) - target.dispatched_mwh).abs();
                max_deviation = max_deviation.max(deviation);
                if deviation > self.config.allowed_deviation(target.dispatched_mwh) {
                    converged = false;
                }
            }
            debug!(window = window.index, iteration = iterations, max_deviation, converged, "coupling iteration");

            proposal.apply(hydro);
            if converged || iterations >= max_iterations {
                if converged {
                    info!(window = window.index, iterations, "coupling converged");
                }
                return Ok(CoupledWindow {
                    solved,
                    iterations,
                    converged,
                    max_deviation,
                    proposal: Some(proposal),
                });
            }
            solved = solve_window(builder, window, state, hydro, self.backend, self.solver)?;
        }
    }
}
