//! Rolling-horizon simulator.
//!
//! Windows are solved strictly one after another. Each window is built from
//! the [`SimulationState`] extracted at the end of the previous one, so ramp
//! and minimum up/down limits chain across window boundaries. A fatal error
//! stops the run; everything solved before it is handed back in
//! [`SimulationFailure::partial`].

use std::time::Duration;

use pcm_core::{cycle_basis, CycleBasis, HydroSchedule, PcmError, PcmResult, SimulationState, SystemInput, HOURS_PER_DAY};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CouplingMode, NonConvergencePolicy, SimulationConfig};
use crate::coupler::{CoupledWindow, Coupler};
use crate::model::{ExtractedWindow, ModelBuilder, Window};
use crate::record::{LmpRecord, SimulationRecord, WindowSummary};
use crate::reservoir::{apply_energy, Basin};
use crate::solver::{solve_duals, MilpBackend, SolveStatus, SolverBackend, SolverConfig};

/// A run that stopped early.
#[derive(Debug, Error)]
#[error("simulation stopped in window {window}: {error}")]
pub struct SimulationFailure {
    pub window: usize,
    #[source]
    pub error: PcmError,
    /// Results of every window solved before the failure
    pub partial: SimulationRecord,
    /// Final coupling iterate of the failing window when the run was
    /// aborted for non-convergence. Its proposal was never committed.
    pub last_iterate: Option<Box<CoupledWindow>>,
}

/// Error of one window plus the coupling iterate it produced, if any.
type WindowFailure = (PcmError, Option<Box<CoupledWindow>>);

/// One solved window.
#[derive(Debug, Clone)]
pub struct SolvedWindow {
    pub window: Window,
    pub status: SolveStatus,
    pub extracted: ExtractedWindow,
    pub elapsed: Duration,
}

/// Build, solve and read back one window.
///
/// Infeasibility and solver errors are fatal. A time-limited incumbent is
/// returned with [`SolveStatus::TimeLimitFeasible`] when the configuration
/// accepts it. With nodal pricing enabled the window is solved a second time
/// as an LP with its commitment fixed.
pub fn solve_window(
    builder: &ModelBuilder,
    window: Window,
    state: &SimulationState,
    hydro: &HydroSchedule,
    backend: &dyn MilpBackend,
    solver: &SolverConfig,
) -> PcmResult<SolvedWindow> {
    let model = builder.build(window, state, hydro)?;
    debug!(window = window.index, constraints = model.constraint_count(), "window model built");
    let (problem, layout) = model.into_parts();
    let outcome = backend.solve(problem);

    let values = match (outcome.status, outcome.values) {
        (SolveStatus::Infeasible, _) => {
            return Err(PcmError::SolverInfeasible { window: window.index });
        }
        (SolveStatus::Error, _) if outcome.time_limit_reached => {
            return Err(PcmError::TimeLimitWithoutSolution { window: window.index });
        }
        (SolveStatus::Error, _) | (_, None) => {
            return Err(PcmError::SolverFailed {
                window: window.index,
                reason: outcome
                    .message
                    .unwrap_or_else(|| "no solution returned".to_string()),
            });
        }
        (SolveStatus::TimeLimitFeasible, Some(_)) if !solver.accept_time_limited => {
            return Err(PcmError::SolverFailed {
                window: window.index,
                reason: "time limit reached before proving optimality".to_string(),
            });
        }
        (_, Some(values)) => values,
    };
    if outcome.status == SolveStatus::TimeLimitFeasible {
        warn!(window = window.index, "keeping time-limited incumbent");
    }

    let mut extracted = layout.extract(&values);
    if builder.config().find_lmp {
        let commitment = layout.commitment(&values);
        extracted.rows.lmp = price_window(builder, window, state, hydro, &commitment, solver)?;
    }

    Ok(SolvedWindow {
        window,
        status: outcome.status,
        extracted,
        elapsed: outcome.elapsed,
    })
}

/// Nodal prices of a solved window from the fixed-commitment LP.
fn price_window(
    builder: &ModelBuilder,
    window: Window,
    state: &SimulationState,
    hydro: &HydroSchedule,
    commitment: &[f64],
    solver: &SolverConfig,
) -> PcmResult<Vec<LmpRecord>> {
    let (problem, layout) = builder
        .build_pricing(window, state, hydro, commitment)?
        .into_parts();
    let duals = solve_duals(problem, solver, window.index)?;
    debug!(window = window.index, "nodal prices computed");
    Ok(layout.prices(&duals))
}

/// Drives consecutive windows over the horizon.
pub struct Simulator<'a> {
    input: &'a SystemInput,
    config: &'a SimulationConfig,
    cycles: CycleBasis,
    basin: Option<Basin>,
    initial: SimulationState,
    backend: Option<&'a dyn MilpBackend>,
}

impl<'a> Simulator<'a> {
    pub fn new(input: &'a SystemInput, config: &'a SimulationConfig) -> Self {
        Self {
            input,
            config,
            cycles: cycle_basis(input.network()),
            basin: None,
            initial: SimulationState::initial(input),
            backend: None,
        }
    }

    /// Solve windows with `backend` instead of the configured solver.
    pub fn with_backend(mut self, backend: &'a dyn MilpBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use a precomputed (for example cached) cycle basis.
    pub fn with_cycle_basis(mut self, cycles: CycleBasis) -> Self {
        self.cycles = cycles;
        self
    }

    /// Reservoir basin feeding the hydro units; required by soft and hard coupling.
    pub fn with_basin(mut self, basin: Basin) -> Self {
        self.basin = Some(basin);
        self
    }

    /// Override the initial condition of window 0.
    pub fn with_initial_state(mut self, state: SimulationState) -> Self {
        self.initial = state;
        self
    }

    pub fn basin(&self) -> Option<&Basin> {
        self.basin.as_ref()
    }

    /// Solve all configured windows.
    pub fn run(&mut self) -> Result<SimulationRecord, SimulationFailure> {
        let mut record = SimulationRecord::new();
        let fail = |window: usize, error: PcmError, partial: SimulationRecord| SimulationFailure {
            window,
            error,
            partial,
            last_iterate: None,
        };

        if let Err(error) = self.validate() {
            return Err(fail(0, error, record));
        }
        let mut hydro = match self.initial_schedule() {
            Ok(schedule) => schedule,
            Err(error) => return Err(fail(0, error, record)),
        };

        let config = self.config;
        let backend: &dyn MilpBackend = self.backend.unwrap_or(&config.solver);
        let builder = ModelBuilder::new(self.input, &self.cycles, &config.model);
        let coupler = Coupler::new(&config.coupling, &config.solver, backend);
        let hard = config.coupling.mode == CouplingMode::Hard;
        let mut state = self.initial.clone();
        info!(
            steps = config.steps,
            window_hours = config.window_hours,
            formulation = config.model.formulation.as_str(),
            coupling = ?config.coupling.mode,
            "starting rolling-horizon run"
        );

        for step in 0..config.steps {
            let window = Window::new(step, step * config.window_hours, config.window_hours);
            let result = match (&mut self.basin, hard) {
                (Some(basin), true) => coupler
                    .couple_window(&builder, window, &state, &mut hydro, basin)
                    .map_err(|error| (error, None))
                    .and_then(|coupled| settle(coupled, config.coupling.on_non_convergence, basin)),
                _ => solve_window(&builder, window, &state, &hydro, backend, &config.solver)
                    .map(|solved| (solved, None, None))
                    .map_err(|error| (error, None)),
            };

            let (solved, iterations, converged) = match result {
                Ok(parts) => parts,
                Err((error, last_iterate)) => {
                    warn!(window = step, %error, "stopping run");
                    return Err(SimulationFailure {
                        last_iterate,
                        ..fail(step, error, record)
                    });
                }
            };

            let ExtractedWindow {
                rows,
                objective,
                next_state,
            } = solved.extracted;
            let shortfall = rows.shortfall_mwh();
            if shortfall > 0.0 {
                warn!(window = step, shortfall_mwh = shortfall, "demand shortfall");
            }
            info!(
                window = step,
                status = solved.status.as_str(),
                objective,
                solve_ms = solved.elapsed.as_millis() as u64,
                "window solved"
            );
            record.append(
                rows,
                WindowSummary {
                    index: step,
                    start_hour: window.start_hour,
                    hours: window.hours,
                    status: solved.status,
                    objective,
                    shortfall_mwh: shortfall,
                    solve_time_ms: solved.elapsed.as_millis(),
                    coupling_iterations: iterations,
                    coupling_converged: converged,
                },
            );
            state = next_state;
        }

        let summary = record.summary();
        info!(
            windows = summary.windows,
            total_cost = summary.total_cost,
            total_shortfall_mwh = summary.total_shortfall_mwh,
            "run complete"
        );
        Ok(record)
    }

    fn validate(&self) -> PcmResult<()> {
        let config = self.config;
        if config.window_hours == 0 || config.steps == 0 {
            return Err(PcmError::Config("window_hours and steps must be positive".into()));
        }
        let needed = config.window_hours * config.steps;
        if needed > self.input.horizon_hours() {
            return Err(PcmError::Config(format!(
                "{} steps of {} hours need {} hours but the input covers {}",
                config.steps,
                config.window_hours,
                needed,
                self.input.horizon_hours()
            )));
        }
        if config.model.find_lmp && !config.solver.backend.has_duals() {
            return Err(PcmError::Config(format!(
                "nodal prices need the highs backend; {} is configured (available: {})",
                config.solver.backend,
                SolverBackend::available().join(", ")
            )));
        }
        match config.coupling.mode {
            CouplingMode::None => {}
            CouplingMode::Soft | CouplingMode::Hard if self.basin.is_none() => {
                return Err(PcmError::Config(
                    "reservoir coupling requested but no basin was provided".into(),
                ));
            }
            CouplingMode::Soft => {}
            CouplingMode::Hard => {
                if config.window_hours % HOURS_PER_DAY != 0 {
                    return Err(PcmError::Config(
                        "hard coupling needs windows made of whole days".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Hydro budgets for the run: input tables, overwritten by the
    /// rule-curve basin run when coupling is enabled.
    fn initial_schedule(&self) -> PcmResult<HydroSchedule> {
        let mut schedule = self.input.initial_hydro_schedule();
        if self.config.coupling.mode == CouplingMode::None {
            return Ok(schedule);
        }
        if let Some(basin) = &self.basin {
            let days = (self.config.steps * self.config.window_hours).div_ceil(HOURS_PER_DAY);
            let records = basin.simulate_rule_curve(days)?;
            apply_energy(&records, &mut schedule);
            info!(days, reservoirs = basin.reservoirs().len(), "hydro budgets from rule-curve run");
        }
        Ok(schedule)
    }
}

/// Apply the non-convergence policy and commit the accepted reservoir operation.
///
/// An aborted window hands its uncommitted iterate back with the error.
fn settle(
    coupled: CoupledWindow,
    policy: NonConvergencePolicy,
    basin: &mut Basin,
) -> Result<(SolvedWindow, Option<usize>, Option<bool>), WindowFailure> {
    let window = coupled.solved.window.index;
    if !coupled.converged {
        match policy {
            NonConvergencePolicy::Accept => warn!(
                window,
                iterations = coupled.iterations,
                max_deviation = coupled.max_deviation,
                "coupling did not converge; keeping last iterate"
            ),
            NonConvergencePolicy::Abort => {
                let error = PcmError::CouplingNotConverged {
                    window,
                    iterations: coupled.iterations,
                    max_deviation: coupled.max_deviation,
                };
                return Err((error, Some(Box::new(coupled))));
            }
        }
    }
    if let Some(proposal) = coupled.proposal {
        basin.commit(proposal).map_err(|error| (error, None))?;
    }
    Ok((coupled.solved, Some(coupled.iterations), Some(coupled.converged)))
}
