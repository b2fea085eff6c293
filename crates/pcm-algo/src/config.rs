//! Run configuration.
//!
//! Every struct deserializes with defaults for missing fields, so an empty
//! TOML document is a complete configuration.

use serde::{Deserialize, Serialize};

use crate::solver::SolverConfig;

/// Penalty prices for the slack variables ($/MWh).
///
/// They must exceed every marginal cost in the system so that slack is only
/// used when no physical schedule exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyWeights {
    pub load_shortfall: f64,
    pub excess_generation: f64,
    pub reserve_shortfall: f64,
    /// Hydro ramp-down beyond the unit's limit
    pub ramp_violation: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            load_shortfall: 1000.0,
            excess_generation: 1000.0,
            reserve_shortfall: 900.0,
            ramp_violation: 1000.0,
        }
    }
}

/// DC network representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowFormulation {
    /// Line flows plus one Kirchhoff voltage constraint per cycle
    #[default]
    CycleFlow,
    /// Node voltage angles with `flow = b (θ_source - θ_sink)`
    VoltageAngle,
}

impl FlowFormulation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowFormulation::CycleFlow => "cycle_flow",
            FlowFormulation::VoltageAngle => "voltage_angle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub formulation: FlowFormulation,
    pub penalties: PenaltyWeights,
    /// Reserve requirement as a fraction of system demand
    pub spin_reserve_factor: f64,
    /// Flat reserve requirement (MW); overrides the factor when set
    pub spin_reserve_mw: Option<f64>,
    /// Multiplier on the contract price charged for curtailing must-take output
    pub curtail_cost_factor: f64,
    /// Re-solve each window as an LP with fixed commitment to report nodal prices
    pub find_lmp: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            formulation: FlowFormulation::CycleFlow,
            penalties: PenaltyWeights::default(),
            spin_reserve_factor: 0.15,
            spin_reserve_mw: None,
            curtail_cost_factor: 1.0,
            find_lmp: false,
        }
    }
}

/// How hydropower availability is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingMode {
    /// Daily budgets straight from the input tables
    #[default]
    None,
    /// One rule-curve basin run feeds the grid model
    Soft,
    /// Per-window iteration between grid dispatch and reservoir release
    Hard,
}

/// What to do with a window whose coupling loop hit the iteration cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonConvergencePolicy {
    /// Keep the last iterate and continue
    #[default]
    Accept,
    /// Stop the run
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingConfig {
    pub mode: CouplingMode,
    pub max_iterations: usize,
    /// Relative tolerance on daily hydro energy
    pub tolerance: f64,
    /// Absolute floor on the tolerance (MWh/day)
    pub abs_tolerance_mwh: f64,
    pub on_non_convergence: NonConvergencePolicy,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            mode: CouplingMode::None,
            max_iterations: 10,
            tolerance: 0.05,
            abs_tolerance_mwh: 1.0,
            on_non_convergence: NonConvergencePolicy::Accept,
        }
    }
}

impl CouplingConfig {
    /// Largest accepted gap between proposed and dispatched energy.
    pub fn allowed_deviation(&self, dispatched_mwh: f64) -> f64 {
        (self.tolerance * dispatched_mwh.abs()).max(self.abs_tolerance_mwh)
    }
}

/// Top-level configuration for a rolling-horizon run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Hours per optimization window
    pub window_hours: usize,
    /// Number of consecutive windows to solve
    pub steps: usize,
    pub model: ModelConfig,
    pub solver: SolverConfig,
    pub coupling: CouplingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            steps: 1,
            model: ModelConfig::default(),
            solver: SolverConfig::default(),
            coupling: CouplingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: SimulationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.model.penalties.load_shortfall, 1000.0);
    }

    #[test]
    fn test_partial_override() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{"window_hours": 12, "model": {"formulation": "voltage_angle"}}"#,
        )
        .unwrap();
        assert_eq!(config.window_hours, 12);
        assert_eq!(config.model.formulation, FlowFormulation::VoltageAngle);
        assert_eq!(config.model.spin_reserve_factor, 0.15);
    }

    #[test]
    fn test_allowed_deviation_has_floor() {
        let coupling = CouplingConfig::default();
        assert!((coupling.allowed_deviation(1000.0) - 50.0).abs() < 1e-12);
        assert_eq!(coupling.allowed_deviation(0.0), 1.0);
    }
}
