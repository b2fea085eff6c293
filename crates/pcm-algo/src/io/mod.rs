//! File formats.
//!
//! - [`dataset`] reads a directory of CSV tables into a [`SystemInput`](pcm_core::SystemInput)
//!   and an optional reservoir [`Basin`](crate::reservoir::Basin)
//! - [`results`] writes a [`SimulationRecord`](crate::record::SimulationRecord) as CSV plus a JSON summary
//! - [`artifact`] persists the cycle basis keyed by a fingerprint of the line list

pub mod artifact;
pub mod dataset;
pub mod results;

pub use artifact::{line_fingerprint, load_cycle_basis, load_or_compute_cycle_basis, save_cycle_basis};
pub use dataset::{load_basin, load_dataset, read_wide_table, Dataset};
pub use results::{write_record, write_reservoir_days};
