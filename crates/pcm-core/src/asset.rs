//! Asset registry types.
//!
//! Every asset is attached to one network node and carries a unique name.
//! Cost fields are in $ (per hour, per MWh or per start as noted), powers in
//! MW and energies in MWh.

use serde::{Deserialize, Serialize};

/// Dispatchable thermal generator with unit commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalUnit {
    pub name: String,
    pub node: String,
    /// Minimum stable output when online (MW)
    pub min_capacity_mw: f64,
    /// Nameplate maximum output (MW), derated per hour when a series is given
    pub max_capacity_mw: f64,
    /// Maximum hour-to-hour output increase while online (MW/h)
    pub ramp_up_mw: f64,
    /// Maximum hour-to-hour output decrease while online (MW/h)
    pub ramp_down_mw: f64,
    /// Maximum output in the start-up hour (MW); defaults to max capacity
    #[serde(default)]
    pub startup_ramp_mw: Option<f64>,
    /// Maximum output in the hour before shutting down (MW); defaults to max capacity
    #[serde(default)]
    pub shutdown_ramp_mw: Option<f64>,
    /// Minimum consecutive online hours after a start
    pub min_up_hours: usize,
    /// Minimum consecutive offline hours after a shutdown
    pub min_down_hours: usize,
    /// Fuel consumed per MWh (MMBtu/MWh)
    pub heat_rate: f64,
    /// Fuel contract priced in $/MMBtu
    pub fuel_contract: String,
    /// Cost per online hour ($/h)
    pub fixed_cost: f64,
    /// Non-fuel variable cost ($/MWh)
    pub opex: f64,
    /// Cost per start ($)
    pub startup_cost: f64,
    #[serde(default)]
    pub must_take: bool,
    #[serde(default = "default_true")]
    pub reserve_eligible: bool,
}

fn default_true() -> bool {
    true
}

impl ThermalUnit {
    /// A unit with zero costs, symmetric ramping and no minimum up/down time.
    pub fn new(name: &str, node: &str, min_mw: f64, max_mw: f64, fuel_contract: &str) -> Self {
        Self {
            name: name.to_string(),
            node: node.to_string(),
            min_capacity_mw: min_mw,
            max_capacity_mw: max_mw,
            ramp_up_mw: max_mw,
            ramp_down_mw: max_mw,
            startup_ramp_mw: None,
            shutdown_ramp_mw: None,
            min_up_hours: 1,
            min_down_hours: 1,
            heat_rate: 0.0,
            fuel_contract: fuel_contract.to_string(),
            fixed_cost: 0.0,
            opex: 0.0,
            startup_cost: 0.0,
            must_take: false,
            reserve_eligible: true,
        }
    }

    /// Same ramp limit in both directions.
    pub fn with_ramp(mut self, ramp_mw: f64) -> Self {
        self.ramp_up_mw = ramp_mw;
        self.ramp_down_mw = ramp_mw;
        self
    }

    pub fn with_min_up_down(mut self, up: usize, down: usize) -> Self {
        self.min_up_hours = up;
        self.min_down_hours = down;
        self
    }

    pub fn with_costs(mut self, heat_rate: f64, fixed_cost: f64, opex: f64, startup_cost: f64) -> Self {
        self.heat_rate = heat_rate;
        self.fixed_cost = fixed_cost;
        self.opex = opex;
        self.startup_cost = startup_cost;
        self
    }

    pub fn startup_ramp(&self) -> f64 {
        self.startup_ramp_mw.unwrap_or(self.max_capacity_mw)
    }

    pub fn shutdown_ramp(&self) -> f64 {
        self.shutdown_ramp_mw.unwrap_or(self.max_capacity_mw)
    }

    /// Marginal cost at a given fuel price ($/MWh).
    pub fn variable_cost(&self, fuel_price: f64) -> f64 {
        fuel_price * self.heat_rate + self.opex
    }
}

/// Technology of a non-dispatchable unit; informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenewableKind {
    Solar,
    Wind,
    #[default]
    Other,
}

/// Variable renewable unit whose output is bounded by an hourly availability series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonDispatchableUnit {
    pub name: String,
    pub node: String,
    #[serde(default)]
    pub kind: RenewableKind,
    /// Energy contract priced in $/MWh
    pub contract: String,
    #[serde(default)]
    pub must_take: bool,
}

impl NonDispatchableUnit {
    pub fn new(name: &str, node: &str, kind: RenewableKind, contract: &str) -> Self {
        Self {
            name: name.to_string(),
            node: node.to_string(),
            kind,
            contract: contract.to_string(),
            must_take: false,
        }
    }
}

/// Battery or other storage device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUnit {
    pub name: String,
    pub node: String,
    /// Generating unit this storage charges from instead of the grid
    #[serde(default)]
    pub attached_unit: Option<String>,
    pub max_charge_mw: f64,
    pub max_discharge_mw: f64,
    #[serde(default)]
    pub min_level_mwh: f64,
    pub max_level_mwh: f64,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
    /// Fraction of stored energy lost per hour
    #[serde(default)]
    pub self_discharge_rate: f64,
    pub initial_level_mwh: f64,
    /// Contract priced on discharged energy ($/MWh)
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub reserve_eligible: bool,
}

impl StorageUnit {
    /// Lossless storage sized by power and energy.
    pub fn new(name: &str, node: &str, power_mw: f64, energy_mwh: f64) -> Self {
        Self {
            name: name.to_string(),
            node: node.to_string(),
            attached_unit: None,
            max_charge_mw: power_mw,
            max_discharge_mw: power_mw,
            min_level_mwh: 0.0,
            max_level_mwh: energy_mwh,
            charge_efficiency: 1.0,
            discharge_efficiency: 1.0,
            self_discharge_rate: 0.0,
            initial_level_mwh: 0.0,
            contract: None,
            reserve_eligible: false,
        }
    }

    pub fn attached_to(mut self, unit: &str) -> Self {
        self.attached_unit = Some(unit.to_string());
        self
    }
}

/// Interconnection import priced by contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportUnit {
    pub name: String,
    pub node: String,
    /// Used when no availability series is given (MW)
    pub max_capacity_mw: f64,
    pub contract: String,
    #[serde(default)]
    pub must_take: bool,
}

/// Hydropower unit limited by turbine capacity and a daily energy budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydroUnit {
    pub name: String,
    pub node: String,
    pub max_capacity_mw: f64,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub must_take: bool,
    /// Hour-to-hour increase limit (MW/h); unlimited when absent
    #[serde(default)]
    pub ramp_up_mw: Option<f64>,
    /// Hour-to-hour decrease limit (MW/h); unlimited when absent
    #[serde(default)]
    pub ramp_down_mw: Option<f64>,
    /// Cost per MW of hour-to-hour change in either direction ($/MW)
    #[serde(default)]
    pub ramp_penalty: f64,
}

impl HydroUnit {
    pub fn new(name: &str, node: &str, max_capacity_mw: f64) -> Self {
        Self {
            name: name.to_string(),
            node: node.to_string(),
            max_capacity_mw,
            contract: None,
            must_take: false,
            ramp_up_mw: None,
            ramp_down_mw: None,
            ramp_penalty: 0.0,
        }
    }

    pub fn with_ramps(mut self, up_mw: f64, down_mw: f64) -> Self {
        self.ramp_up_mw = Some(up_mw);
        self.ramp_down_mw = Some(down_mw);
        self
    }
}

/// Any asset in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Asset {
    Thermal(ThermalUnit),
    NonDispatchable(NonDispatchableUnit),
    Storage(StorageUnit),
    Import(ImportUnit),
    Hydro(HydroUnit),
}

impl Asset {
    pub fn name(&self) -> &str {
        match self {
            Asset::Thermal(u) => &u.name,
            Asset::NonDispatchable(u) => &u.name,
            Asset::Storage(u) => &u.name,
            Asset::Import(u) => &u.name,
            Asset::Hydro(u) => &u.name,
        }
    }

    pub fn node(&self) -> &str {
        match self {
            Asset::Thermal(u) => &u.node,
            Asset::NonDispatchable(u) => &u.node,
            Asset::Storage(u) => &u.node,
            Asset::Import(u) => &u.node,
            Asset::Hydro(u) => &u.node,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Asset::Thermal(_) => "thermal",
            Asset::NonDispatchable(_) => "non_dispatchable",
            Asset::Storage(_) => "storage",
            Asset::Import(_) => "import",
            Asset::Hydro(_) => "hydro",
        }
    }

    /// Contract references this asset prices against.
    pub fn contracts(&self) -> Vec<&str> {
        match self {
            Asset::Thermal(u) => vec![u.fuel_contract.as_str()],
            Asset::NonDispatchable(u) => vec![u.contract.as_str()],
            Asset::Storage(u) => u.contract.iter().map(String::as_str).collect(),
            Asset::Import(u) => vec![u.contract.as_str()],
            Asset::Hydro(u) => u.contract.iter().map(String::as_str).collect(),
        }
    }

    /// Whether storage may charge from this asset's output.
    pub fn accepts_storage(&self) -> bool {
        matches!(self, Asset::NonDispatchable(_) | Asset::Import(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_ramp_defaults_to_capacity() {
        let unit = ThermalUnit::new("g1", "A", 10.0, 50.0, "gas").with_ramp(20.0);
        assert_eq!(unit.startup_ramp(), 50.0);
        assert_eq!(unit.shutdown_ramp(), 50.0);
        assert_eq!(unit.ramp_up_mw, 20.0);
    }

    #[test]
    fn test_variable_cost() {
        let unit = ThermalUnit::new("g1", "A", 10.0, 50.0, "gas").with_costs(8.0, 0.0, 2.5, 0.0);
        assert!((unit.variable_cost(3.0) - 26.5).abs() < 1e-12);
    }

    #[test]
    fn test_asset_tagged_serde() {
        let asset = Asset::Hydro(HydroUnit::new("dam", "B", 120.0));
        let json = serde_json::to_string(&asset).unwrap();
        assert!(json.contains("\"type\":\"hydro\""));
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);
        assert_eq!(back.node(), "B");
    }
}
