//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use pcm_algo::{ModelConfig, ReservoirParams, SimulationConfig};
use pcm_core::{series, Line, SystemInput, SystemInputBuilder, ThermalUnit};

/// Fuel price ($/MMBtu) of the `gas` contract.
pub const GAS_PRICE: f64 = 4.0;
pub const HEAT_RATE: f64 = 7.5;
pub const OPEX: f64 = 2.0;
pub const FIXED_COST: f64 = 100.0;

/// Marginal cost of the fixture unit ($/MWh).
pub const MARGINAL_COST: f64 = GAS_PRICE * HEAT_RATE + OPEX;

/// 10-50 MW unit, 20 MW/h ramps, 2 h minimum up and down time.
pub fn ccgt(node: &str) -> ThermalUnit {
    ThermalUnit::new("ccgt", node, 10.0, 50.0, "gas")
        .with_ramp(20.0)
        .with_min_up_down(2, 2)
        .with_costs(HEAT_RATE, FIXED_COST, OPEX, 0.0)
}

/// Two nodes joined by a 100 MW line, demand at `A`, gas priced for `hours`.
pub fn two_node_builder(demand: Vec<f64>) -> SystemInputBuilder {
    let hours = demand.len();
    SystemInput::builder(hours)
        .node("A")
        .node("B")
        .line(Line::new("A", "B", 500.0, 100.0))
        .contract_price("gas", series::constant(GAS_PRICE, hours))
        .demand("A", demand)
}

/// The fixture unit at `B` serving demand at `A`.
pub fn two_node(demand: Vec<f64>) -> SystemInput {
    two_node_builder(demand).thermal(ccgt("B")).build().unwrap()
}

/// Windows of `window_hours`, no reserve requirement.
pub fn config(window_hours: usize, steps: usize) -> SimulationConfig {
    SimulationConfig {
        window_hours,
        steps,
        model: ModelConfig {
            spin_reserve_factor: 0.0,
            ..ModelConfig::default()
        },
        ..SimulationConfig::default()
    }
}

/// Reservoir with a linear 0-10 m storage curve over 1e9 m³ and about 100 m of head.
pub fn reservoir_params(name: &str, unit: &str) -> ReservoirParams {
    ReservoirParams {
        name: name.to_string(),
        unit: Some(unit.to_string()),
        min_day: 100,
        max_day: 280,
        min_level: 0.0,
        max_level: 10.0,
        max_head: 100.0,
        max_storage: 1e9,
        max_release: 2e7,
        max_generation: 200.0,
        turbine_factor: 0.9,
        hydropeak_factor: 0.15,
        initial_storage: Some(9.5e8),
    }
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual} (tolerance {tolerance})"
    );
}
