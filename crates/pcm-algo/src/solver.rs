//! MILP solver adapter.
//!
//! A [`Problem`] is backend-agnostic: variables, objective and constraints
//! collected by the model builder. [`solve`] hands it to the configured
//! backend and classifies the termination status it reports as one of
//! [`SolveStatus`].
//!
//! | Backend | Feature | Notes |
//! |---------|---------|-------|
//! | `microlp` | `solver-microlp` (default) | Pure Rust branch and bound |
//! | `highs` | `solver-highs` | Row duals for nodal prices |
//! | `gurobi` | `solver-gurobi` | Runs the `gurobi_cl` executable; always reports optimal |
//!
//! Every backend receives the configured time limit and MIP gap.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use good_lp::{
    Constraint, Expression, ProblemVariables, ResolutionError, Solution, SolutionStatus, SolverModel, Variable,
    WithMipGap, WithTimeLimit,
};
use pcm_core::{PcmError, PcmResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Selectable MILP backend. Variants exist only for compiled-in solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    #[cfg(feature = "solver-microlp")]
    #[default]
    Microlp,
    #[cfg(feature = "solver-highs")]
    #[cfg_attr(not(feature = "solver-microlp"), default)]
    Highs,
    #[cfg(feature = "solver-gurobi")]
    #[cfg_attr(not(any(feature = "solver-microlp", feature = "solver-highs")), default)]
    Gurobi,
}

const AVAILABLE_BACKENDS: &[&str] = &[
    #[cfg(feature = "solver-microlp")]
    "microlp",
    #[cfg(feature = "solver-highs")]
    "highs",
    #[cfg(feature = "solver-gurobi")]
    "gurobi",
];

impl SolverBackend {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_BACKENDS
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            #[cfg(feature = "solver-microlp")]
            SolverBackend::Microlp => "microlp",
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => "highs",
            #[cfg(feature = "solver-gurobi")]
            SolverBackend::Gurobi => "gurobi",
        }
    }

    /// Whether constraint duals can be read back (nodal pricing).
    pub fn has_duals(&self) -> bool {
        match *self {
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }
}

fn unknown_backend_error(label: &str) -> PcmError {
    PcmError::Config(format!(
        "unknown solver backend '{}'; supported values: {}",
        label,
        SolverBackend::available().join(", ")
    ))
}

impl FromStr for SolverBackend {
    type Err = PcmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "microlp" => {
                #[cfg(feature = "solver-microlp")]
                {
                    Ok(SolverBackend::Microlp)
                }
                #[cfg(not(feature = "solver-microlp"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(SolverBackend::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            "gurobi" => {
                #[cfg(feature = "solver-gurobi")]
                {
                    Ok(SolverBackend::Gurobi)
                }
                #[cfg(not(feature = "solver-gurobi"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            other => Err(unknown_backend_error(other)),
        }
    }
}

impl fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Solver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: SolverBackend,
    /// Wall-clock limit per window (seconds)
    pub time_limit_secs: Option<f64>,
    /// Relative MIP optimality gap
    pub mip_gap: Option<f64>,
    /// Whether to enable verbose solver output
    pub verbose: bool,
    /// Keep time-limited incumbents instead of failing the window
    pub accept_time_limited: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverBackend::default(),
            time_limit_secs: None,
            mip_gap: None,
            verbose: false,
            accept_time_limited: true,
        }
    }
}

/// Outcome classification of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    /// Best incumbent when the time limit stopped the search
    TimeLimitFeasible,
    Infeasible,
    Error,
}

impl SolveStatus {
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::TimeLimitFeasible)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::TimeLimitFeasible => "time_limit_feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Error => "error",
        }
    }
}

/// One MILP, ready to hand to a backend.
pub struct Problem {
    pub vars: ProblemVariables,
    pub objective: Expression,
    pub constraints: Vec<Constraint>,
}

/// Primal values of a solved problem.
pub struct SolvedValues(Box<dyn Solution>);

impl SolvedValues {
    pub fn value(&self, var: Variable) -> f64 {
        self.0.value(var)
    }

    /// Binary indicator rounded to a boolean.
    pub fn flag(&self, var: Variable) -> bool {
        self.0.value(var) > 0.5
    }
}

pub struct SolveOutcome {
    pub status: SolveStatus,
    pub values: Option<SolvedValues>,
    pub elapsed: Duration,
    /// Backend message for failed solves
    pub message: Option<String>,
    /// Whether the backend stopped on the configured time limit
    pub time_limit_reached: bool,
}

impl SolveOutcome {
    /// A failed solve carrying only a message.
    pub fn error(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: SolveStatus::Error,
            values: None,
            elapsed,
            message: Some(message.into()),
            time_limit_reached: false,
        }
    }
}

/// Something that can solve a window MILP.
///
/// [`SolverConfig`] is the production implementation. The simulator accepts
/// any backend so runs can be driven against scripted outcomes.
pub trait MilpBackend {
    fn solve(&self, problem: Problem) -> SolveOutcome;
}

impl MilpBackend for SolverConfig {
    fn solve(&self, problem: Problem) -> SolveOutcome {
        solve(problem, self)
    }
}

/// Messages good_lp backends return when a limit stops the search before any
/// feasible point was found.
const NO_INCUMBENT_MESSAGES: &[&str] = &[
    "Time limit reached before finding a feasible solution",
    "NoSolutionFound",
];

/// Map a backend termination status onto [`SolveStatus`].
///
/// A gap-limited solution is optimal within the configured tolerance.
pub fn classify(status: SolutionStatus) -> SolveStatus {
    match status {
        SolutionStatus::Optimal | SolutionStatus::GapLimit => SolveStatus::Optimal,
        SolutionStatus::TimeLimit => SolveStatus::TimeLimitFeasible,
    }
}

/// Apply the time limit and MIP gap from `config` to any good_lp model.
fn with_limits<M>(model: M, config: &SolverConfig) -> Result<M, ResolutionError>
where
    M: WithTimeLimit + WithMipGap,
{
    let model = match config.time_limit_secs {
        Some(limit) => model.with_time_limit(limit),
        None => model,
    };
    match config.mip_gap {
        Some(gap) => model
            .with_mip_gap(gap as f32)
            .map_err(|err| ResolutionError::Str(format!("invalid MIP gap {gap}: {err}"))),
        None => Ok(model),
    }
}

fn run_model<M>(model: M, constraints: Vec<Constraint>, config: &SolverConfig) -> Result<Box<dyn Solution>, ResolutionError>
where
    M: SolverModel<Error = ResolutionError> + WithTimeLimit + WithMipGap,
    M::Solution: 'static,
{
    let model = with_limits(model, config)?;
    let model = constraints.into_iter().fold(model, |m, c| m.with(c));
    model.solve().map(|s| Box::new(s) as Box<dyn Solution>)
}

/// Solve a problem with the configured backend.
pub fn solve(problem: Problem, config: &SolverConfig) -> SolveOutcome {
    let start = Instant::now();
    let Problem {
        vars,
        objective,
        constraints,
    } = problem;
    debug!(
        backend = config.backend.as_str(),
        constraints = constraints.len(),
        "submitting MILP"
    );

    let unsolved = vars.minimise(objective);
    let result = match config.backend {
        #[cfg(feature = "solver-microlp")]
        SolverBackend::Microlp => run_model(unsolved.using(good_lp::solvers::microlp::microlp), constraints, config),
        #[cfg(feature = "solver-highs")]
        SolverBackend::Highs => {
            let model = unsolved
                .using(good_lp::solvers::highs::highs)
                .set_verbose(config.verbose);
            run_model(model, constraints, config)
        }
        #[cfg(feature = "solver-gurobi")]
        SolverBackend::Gurobi => {
            use good_lp::solvers::lp_solvers::{GurobiSolver, LpSolver};
            run_model(unsolved.using(LpSolver(GurobiSolver::new())), constraints, config)
        }
    };
    let elapsed = start.elapsed();

    match result {
        Ok(solution) => {
            let status = classify(solution.status());
            SolveOutcome {
                status,
                values: Some(SolvedValues(solution)),
                elapsed,
                message: None,
                time_limit_reached: status == SolveStatus::TimeLimitFeasible,
            }
        }
        Err(ResolutionError::Infeasible) => SolveOutcome {
            status: SolveStatus::Infeasible,
            values: None,
            elapsed,
            message: Some("infeasible".to_string()),
            time_limit_reached: false,
        },
        Err(err) => {
            let time_limit_reached = config.time_limit_secs.is_some()
                && matches!(&err, ResolutionError::Other(msg) if NO_INCUMBENT_MESSAGES.contains(msg));
            SolveOutcome {
                time_limit_reached,
                ..SolveOutcome::error(err.to_string(), elapsed)
            }
        }
    }
}

/// Solve a pure LP and return the dual of every constraint, in order.
///
/// Only HiGHS exposes row duals through good_lp.
#[cfg_attr(not(feature = "solver-highs"), allow(unused_variables))]
pub fn solve_duals(problem: Problem, config: &SolverConfig, window: usize) -> PcmResult<Vec<f64>> {
    match config.backend {
        #[cfg(feature = "solver-highs")]
        SolverBackend::Highs => highs_duals(problem, config).map_err(|err| PcmError::SolverFailed {
            window,
            reason: format!("pricing LP: {err}"),
        }),
        #[allow(unreachable_patterns)]
        other => Err(PcmError::Config(format!(
            "nodal prices for window {window} need the highs backend, not {other}"
        ))),
    }
}

#[cfg(feature = "solver-highs")]
fn highs_duals(problem: Problem, config: &SolverConfig) -> Result<Vec<f64>, ResolutionError> {
    use good_lp::{DualValues, SolutionWithDual};

    let Problem {
        vars,
        objective,
        constraints,
    } = problem;
    let model = vars
        .minimise(objective)
        .using(good_lp::solvers::highs::highs)
        .set_verbose(config.verbose);
    let mut model = with_limits(model, config)?;
    let rows: Vec<_> = constraints.into_iter().map(|c| model.add_constraint(c)).collect();
    let mut solution = model.solve()?;
    let duals = solution.compute_dual();
    Ok(rows.into_iter().map(|row| duals.dual(row)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use good_lp::{constraint, variable, variables};

    #[test]
    fn test_backend_from_str() {
        assert_eq!("microlp".parse::<SolverBackend>().unwrap(), SolverBackend::Microlp);
        assert_eq!("MicroLP".parse::<SolverBackend>().unwrap(), SolverBackend::Microlp);
        let err = "cplex".parse::<SolverBackend>().unwrap_err();
        assert!(err.to_string().contains("microlp"));
    }

    #[test]
    fn test_small_milp_is_optimal() {
        let mut vars = variables!();
        let x = vars.add(variable().binary());
        let y = vars.add(variable().min(0.0).max(10.0));
        let problem = Problem {
            vars,
            objective: 5.0 * x + 1.0 * y,
            constraints: vec![constraint!(y <= 10.0 * x), constraint!(y >= 3.0)],
        };
        let outcome = solve(problem, &SolverConfig::default());
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let values = outcome.values.expect("solution");
        assert!(values.flag(x));
        assert!((values.value(y) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_is_reported_distinctly() {
        let mut vars = variables!();
        let x = vars.add(variable().min(0.0).max(1.0));
        let problem = Problem {
            vars,
            objective: Expression::from(x),
            constraints: vec![constraint!(x >= 2.0)],
        };
        let outcome = solve(problem, &SolverConfig::default());
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());
    }

    #[test]
    fn test_status_follows_backend_termination() {
        assert_eq!(classify(SolutionStatus::Optimal), SolveStatus::Optimal);
        assert_eq!(classify(SolutionStatus::GapLimit), SolveStatus::Optimal);
        assert_eq!(classify(SolutionStatus::TimeLimit), SolveStatus::TimeLimitFeasible);
    }

    fn knapsack() -> Problem {
        let mut vars = variables!();
        let items: Vec<Variable> = (0..4).map(|_| vars.add(variable().binary())).collect();
        let value = [8.0, 11.0, 6.0, 4.0];
        let weight = [5.0, 7.0, 4.0, 3.0];
        let objective: Expression = items.iter().zip(value).map(|(x, v)| -v * *x).sum();
        let load: Expression = items.iter().zip(weight).map(|(x, w)| w * *x).sum();
        Problem {
            vars,
            objective,
            constraints: vec![constraint!(load <= 14.0)],
        }
    }

    #[test]
    fn test_generous_limits_still_prove_optimality() {
        let config = SolverConfig {
            time_limit_secs: Some(60.0),
            mip_gap: Some(0.0),
            ..SolverConfig::default()
        };
        let outcome = solve(knapsack(), &config);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!(!outcome.time_limit_reached);
    }

    #[test]
    fn test_invalid_gap_is_a_solver_error() {
        let config = SolverConfig {
            mip_gap: Some(-0.5),
            ..SolverConfig::default()
        };
        let outcome = solve(knapsack(), &config);
        assert_eq!(outcome.status, SolveStatus::Error);
        assert!(outcome.message.unwrap().contains("MIP gap"));
    }

    #[cfg(not(feature = "solver-highs"))]
    #[test]
    fn test_duals_need_highs() {
        let err = solve_duals(knapsack(), &SolverConfig::default(), 0).unwrap_err();
        assert!(matches!(err, PcmError::Config(_)));
    }

    #[cfg(feature = "solver-highs")]
    #[test]
    fn test_highs_duals_price_the_binding_row() {
        let mut vars = variables!();
        let cheap = vars.add(variable().min(0.0).max(10.0));
        let dear = vars.add(variable().min(0.0));
        let problem = Problem {
            vars,
            objective: 2.0 * cheap + 7.0 * dear,
            constraints: vec![constraint!(cheap + dear == 15.0)],
        };
        let config = SolverConfig {
            backend: SolverBackend::Highs,
            ..SolverConfig::default()
        };
        let duals = solve_duals(problem, &config, 0).unwrap();
        assert!((duals[0] - 7.0).abs() < 1e-6);
    }
}
