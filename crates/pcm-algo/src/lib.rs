//! # pcm-algo: Rolling-Horizon Production Cost Model
//!
//! Hourly unit commitment and economic dispatch over a transmission network,
//! solved as a sequence of mixed-integer windows, optionally coupled to a
//! daily cascade reservoir simulator.
//!
//! ## Pipeline
//!
//! | Stage | Entry point | Notes |
//! |-------|-------------|-------|
//! | Load | [`io::load_dataset`] | CSV directory into [`pcm_core::SystemInput`] and an optional [`Basin`] |
//! | Build | [`ModelBuilder::build`] | One MILP per window |
//! | Solve | [`solver::solve`] | `microlp`, `highs` or `gurobi` through `good_lp` |
//! | Chain | [`Simulator::run`] | State from window *k* seeds window *k+1* |
//! | Couple | [`Coupler::couple_window`] | Grid dispatch vs reservoir release per window |
//! | Write | [`io::write_record`] | CSV tables plus `summary.json` |
//!
//! ## Example
//!
//! ```ignore
//! use pcm_algo::{io, SimulationConfig, Simulator};
//!
//! let dataset = io::load_dataset("data/kh".as_ref())?;
//! let config = SimulationConfig { steps: 7, ..SimulationConfig::default() };
//! let mut simulator = Simulator::new(&dataset.input, &config);
//! let record = simulator.run()?;
//! io::write_record(&record, "out".as_ref())?;
//! ```

pub mod config;
pub mod coupler;
pub mod io;
pub mod model;
pub mod record;
pub mod reservoir;
pub mod simulation;
pub mod solver;

pub use config::{
    CouplingConfig, CouplingMode, FlowFormulation, ModelConfig, NonConvergencePolicy, PenaltyWeights,
    SimulationConfig,
};
pub use coupler::{CoupledWindow, Coupler};
pub use model::{ExtractedWindow, ModelBuilder, Window, WindowModel};
pub use record::{LmpRecord, RunSummary, SimulationRecord, WindowRows, WindowSummary};
pub use reservoir::{Basin, FlowPath, Reservoir, ReservoirDay, ReservoirParams};
pub use simulation::{solve_window, SimulationFailure, SolvedWindow, Simulator};
pub use solver::{MilpBackend, Problem, SolveOutcome, SolveStatus, SolverBackend, SolverConfig};
