//! # pcm-core: Production Cost Model Core
//!
//! Data structures shared by the model builder, the rolling-horizon simulator
//! and the reservoir simulator.
//!
//! ## Core Data Structures
//!
//! - [`Network`], [`Line`], [`Node`] - transmission topology
//! - [`Asset`] - thermal, non-dispatchable, storage, import and hydro units
//! - [`SeriesTable`] - named hourly or daily series
//! - [`SystemInput`] - the validated, immutable dataset for one run
//! - [`SimulationState`] - the only record that crosses a window boundary
//! - [`HydroSchedule`] - daily hydro energy budgets read by the grid model
//! - [`CycleBasis`] - fundamental cycles with per-line orientation signs
//!
//! ## Quick Start
//!
//! ```rust
//! use pcm_core::*;
//!
//! let input = SystemInput::builder(24)
//!     .node("A")
//!     .node("B")
//!     .line(Line::new("A", "B", 500.0, 100.0))
//!     .contract_price("gas", series::constant(4.0, 24))
//!     .thermal(ThermalUnit::new("ccgt", "A", 10.0, 50.0, "gas").with_ramp(20.0))
//!     .demand("A", series::constant(30.0, 24))
//!     .build()
//!     .unwrap();
//!
//! let basis = cycle_basis(input.network());
//! assert!(basis.is_empty());
//! let state = SimulationState::initial(&input);
//! assert!(!state.unit("ccgt").online);
//! ```
//!
//! ## Modules
//!
//! - [`topology`] - line parameter resolution, cycle basis, islands
//! - [`input`] - dataset aggregation and cross-reference validation
//! - [`state`] - commitment history and storage levels between windows

pub mod asset;
pub mod error;
pub mod hydro;
pub mod input;
pub mod network;
pub mod series;
pub mod state;
pub mod topology;

pub use asset::{
    Asset, HydroUnit, ImportUnit, NonDispatchableUnit, RenewableKind, StorageUnit, ThermalUnit,
};
pub use error::{PcmError, PcmResult};
pub use hydro::{day_of_hour, HydroSchedule, HOURS_PER_DAY};
pub use input::{SystemInput, SystemInputBuilder};
pub use network::{Line, Network, Node};
pub use series::SeriesTable;
pub use state::{SimulationState, StorageState, UnitState};
pub use topology::{cycle_basis, islands, resolve_line, Cycle, CycleBasis, CycleMember, LineSpec};
