//! Simulation result tables.
//!
//! [`SimulationRecord`] only grows: each solved window appends its rows and
//! one [`WindowSummary`]. Rows are keyed by entity name and absolute hour.

use std::collections::BTreeMap;

use pcm_core::day_of_hour;
use serde::{Deserialize, Serialize};

use crate::solver::SolveStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalRecord {
    pub unit: String,
    pub hour: usize,
    pub online: bool,
    pub startup: bool,
    pub shutdown: bool,
    /// Total output including the minimum-load block (MW)
    pub dispatch_mw: f64,
    pub reserve_mw: f64,
    pub curtailed_mw: f64,
}

/// Output of a non-thermal generating asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub asset: String,
    pub kind: String,
    pub node: String,
    pub hour: usize,
    pub dispatch_mw: f64,
    pub curtailed_mw: f64,
    /// Energy routed into attached storage (MW)
    pub charged_mw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub unit: String,
    pub hour: usize,
    pub charge_mw: f64,
    pub discharge_mw: f64,
    /// Level at the end of the hour (MWh)
    pub level_mwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub line: String,
    pub hour: usize,
    /// Positive from source to sink (MW)
    pub flow_mw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSlackRecord {
    pub node: String,
    pub hour: usize,
    pub demand_mw: f64,
    pub shortfall_mw: f64,
    pub excess_mw: f64,
}

/// Locational marginal price: dual of a nodal balance ($/MWh).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmpRecord {
    pub node: String,
    pub hour: usize,
    pub lmp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveRecord {
    pub hour: usize,
    pub requirement_mw: f64,
    pub provided_mw: f64,
    pub shortfall_mw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub index: usize,
    pub start_hour: usize,
    pub hours: usize,
    pub status: SolveStatus,
    pub objective: f64,
    pub shortfall_mwh: f64,
    pub solve_time_ms: u128,
    pub coupling_iterations: Option<usize>,
    pub coupling_converged: Option<bool>,
}

/// Rows produced by one solved window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowRows {
    pub thermal: Vec<ThermalRecord>,
    pub dispatch: Vec<DispatchRecord>,
    pub storage: Vec<StorageRecord>,
    pub flows: Vec<FlowRecord>,
    pub node_slack: Vec<NodeSlackRecord>,
    pub reserve: Vec<ReserveRecord>,
    /// Empty unless nodal pricing is enabled
    pub lmp: Vec<LmpRecord>,
}

impl WindowRows {
    pub fn shortfall_mwh(&self) -> f64 {
        self.node_slack.iter().map(|r| r.shortfall_mw).sum()
    }

    /// Hydro energy dispatched per (unit, day), MWh.
    pub fn hydro_daily_dispatch(&self) -> BTreeMap<(String, usize), f64> {
        let mut totals = BTreeMap::new();
        for row in self.dispatch.iter().filter(|r| r.kind == "hydro") {
            *totals
                .entry((row.asset.clone(), day_of_hour(row.hour)))
                .or_insert(0.0) += row.dispatch_mw;
        }
        totals
    }
}

/// Append-only result of a rolling-horizon run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub thermal: Vec<ThermalRecord>,
    pub dispatch: Vec<DispatchRecord>,
    pub storage: Vec<StorageRecord>,
    pub flows: Vec<FlowRecord>,
    pub node_slack: Vec<NodeSlackRecord>,
    pub reserve: Vec<ReserveRecord>,
    #[serde(default)]
    pub lmp: Vec<LmpRecord>,
    pub windows: Vec<WindowSummary>,
}

/// Run-level report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub windows: usize,
    pub total_cost: f64,
    pub total_shortfall_mwh: f64,
    pub non_optimal_windows: Vec<usize>,
}

impl SimulationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, rows: WindowRows, summary: WindowSummary) {
        self.thermal.extend(rows.thermal);
        self.dispatch.extend(rows.dispatch);
        self.storage.extend(rows.storage);
        self.flows.extend(rows.flows);
        self.node_slack.extend(rows.node_slack);
        self.reserve.extend(rows.reserve);
        self.lmp.extend(rows.lmp);
        self.windows.push(summary);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            windows: self.windows.len(),
            total_cost: self.windows.iter().map(|w| w.objective).sum(),
            total_shortfall_mwh: self.windows.iter().map(|w| w.shortfall_mwh).sum(),
            non_optimal_windows: self
                .windows
                .iter()
                .filter(|w| w.status != SolveStatus::Optimal)
                .map(|w| w.index)
                .collect(),
        }
    }

    /// Thermal rows of one unit in hour order.
    pub fn unit_rows(&self, unit: &str) -> Vec<&ThermalRecord> {
        let mut rows: Vec<_> = self.thermal.iter().filter(|r| r.unit == unit).collect();
        rows.sort_by_key(|r| r.hour);
        rows
    }

    pub fn asset_rows(&self, asset: &str) -> Vec<&DispatchRecord> {
        let mut rows: Vec<_> = self.dispatch.iter().filter(|r| r.asset == asset).collect();
        rows.sort_by_key(|r| r.hour);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(index: usize, status: SolveStatus, objective: f64) -> WindowSummary {
        WindowSummary {
            index,
            start_hour: index * 24,
            hours: 24,
            status,
            objective,
            shortfall_mwh: 1.0,
            solve_time_ms: 0,
            coupling_iterations: None,
            coupling_converged: None,
        }
    }

    #[test]
    fn test_summary_totals() {
        let mut record = SimulationRecord::new();
        record.append(WindowRows::default(), summary(0, SolveStatus::Optimal, 10.0));
        record.append(WindowRows::default(), summary(1, SolveStatus::TimeLimitFeasible, 5.0));
        let run = record.summary();
        assert_eq!(run.windows, 2);
        assert_eq!(run.total_cost, 15.0);
        assert_eq!(run.total_shortfall_mwh, 2.0);
        assert_eq!(run.non_optimal_windows, vec![1]);
    }

    #[test]
    fn test_hydro_daily_dispatch_groups_by_day() {
        let row = |hour, mw| DispatchRecord {
            asset: "dam".into(),
            kind: "hydro".into(),
            node: "A".into(),
            hour,
            dispatch_mw: mw,
            curtailed_mw: 0.0,
            charged_mw: 0.0,
        };
        let rows = WindowRows {
            dispatch: vec![row(0, 10.0), row(23, 5.0), row(24, 7.0)],
            ..WindowRows::default()
        };
        let totals = rows.hydro_daily_dispatch();
        assert_eq!(totals[&("dam".to_string(), 0)], 15.0);
        assert_eq!(totals[&("dam".to_string(), 1)], 7.0);
    }
}
