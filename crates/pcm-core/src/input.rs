//! System input aggregator.
//!
//! [`SystemInput`] bundles the network, the asset registry and every hourly
//! series the model reads. It is assembled through [`SystemInputBuilder`],
//! which validates cross references once so that the model builder can look
//! values up without re-checking them per window.

use std::collections::HashSet;

use crate::asset::{Asset, HydroUnit, ImportUnit, NonDispatchableUnit, StorageUnit, ThermalUnit};
use crate::error::{PcmError, PcmResult};
use crate::hydro::{HydroSchedule, HOURS_PER_DAY};
use crate::network::{Line, Network};
use crate::series::SeriesTable;

/// Immutable dataset for one simulation run.
#[derive(Debug, Clone)]
pub struct SystemInput {
    network: Network,
    assets: Vec<Asset>,
    horizon_hours: usize,
    demand: SeriesTable,
    availability: SeriesTable,
    derated_capacity: SeriesTable,
    contract_prices: SeriesTable,
    hydro_daily_energy: SeriesTable,
    spin_requirement: Option<Vec<f64>>,
}

impl SystemInput {
    pub fn builder(horizon_hours: usize) -> SystemInputBuilder {
        SystemInputBuilder::new(horizon_hours)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name() == name)
    }

    pub fn horizon_hours(&self) -> usize {
        self.horizon_hours
    }

    /// Number of (possibly partial) days covered by the horizon.
    pub fn horizon_days(&self) -> usize {
        self.horizon_hours.div_ceil(HOURS_PER_DAY)
    }

    pub fn thermal_units(&self) -> impl Iterator<Item = &ThermalUnit> {
        self.assets.iter().filter_map(|a| match a {
            Asset::Thermal(u) => Some(u),
            _ => None,
        })
    }

    pub fn storage_units(&self) -> impl Iterator<Item = &StorageUnit> {
        self.assets.iter().filter_map(|a| match a {
            Asset::Storage(u) => Some(u),
            _ => None,
        })
    }

    pub fn hydro_units(&self) -> impl Iterator<Item = &HydroUnit> {
        self.assets.iter().filter_map(|a| match a {
            Asset::Hydro(u) => Some(u),
            _ => None,
        })
    }

    /// Demand at `node` (MW). Nodes without a demand column have zero demand.
    pub fn demand(&self, node: &str, hour: usize) -> f64 {
        self.demand.value(node, hour).unwrap_or(0.0)
    }

    pub fn total_demand(&self, hour: usize) -> f64 {
        self.demand.iter().filter_map(|(_, v)| v.get(hour)).sum()
    }

    /// Available output of a non-dispatchable or import unit (MW).
    pub fn availability(&self, unit: &str, hour: usize) -> Option<f64> {
        self.availability.value(unit, hour)
    }

    /// Maximum output of a thermal unit after derating (MW).
    pub fn thermal_capacity(&self, unit: &ThermalUnit, hour: usize) -> f64 {
        self.derated_capacity
            .value(&unit.name, hour)
            .unwrap_or(unit.max_capacity_mw)
    }

    pub fn contract_price(&self, contract: &str, hour: usize) -> f64 {
        self.contract_prices.value(contract, hour).unwrap_or(0.0)
    }

    /// Reserve requirement: explicit series when present, else a fraction of system demand.
    pub fn spin_requirement(&self, hour: usize, factor: f64) -> f64 {
        match &self.spin_requirement {
            Some(series) => series.get(hour).copied().unwrap_or(0.0),
            None => factor * self.total_demand(hour),
        }
    }

    /// Explicit hourly reserve requirement, when the dataset carries one.
    pub fn spin_series(&self) -> Option<&[f64]> {
        self.spin_requirement.as_deref()
    }

    /// Daily energy budgets from the input tables. Hydro units without a
    /// column are limited by their turbine capacity only.
    pub fn initial_hydro_schedule(&self) -> HydroSchedule {
        let days = self.horizon_days();
        let mut table = SeriesTable::new();
        for unit in self.hydro_units() {
            let column = match self.hydro_daily_energy.get(&unit.name) {
                Some(values) => values.to_vec(),
                None => vec![unit.max_capacity_mw * HOURS_PER_DAY as f64; days],
            };
            table.insert(unit.name.clone(), column);
        }
        HydroSchedule::from_table(table)
    }
}

/// Collects the pieces of a [`SystemInput`] and validates them in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct SystemInputBuilder {
    horizon_hours: usize,
    nodes: Vec<String>,
    lines: Vec<Line>,
    assets: Vec<Asset>,
    demand: SeriesTable,
    availability: SeriesTable,
    derated_capacity: SeriesTable,
    contract_prices: SeriesTable,
    hydro_daily_energy: SeriesTable,
    spin_requirement: Option<Vec<f64>>,
}

impl SystemInputBuilder {
    pub fn new(horizon_hours: usize) -> Self {
        Self {
            horizon_hours,
            ..Self::default()
        }
    }

    pub fn node(mut self, name: &str) -> Self {
        self.nodes.push(name.to_string());
        self
    }

    pub fn line(mut self, line: Line) -> Self {
        self.lines.push(line);
        self
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn thermal(self, unit: ThermalUnit) -> Self {
        self.asset(Asset::Thermal(unit))
    }

    pub fn non_dispatchable(self, unit: NonDispatchableUnit, availability: Vec<f64>) -> Self {
        let name = unit.name.clone();
        self.asset(Asset::NonDispatchable(unit)).availability(&name, availability)
    }

    pub fn storage(self, unit: StorageUnit) -> Self {
        self.asset(Asset::Storage(unit))
    }

    pub fn import(self, unit: ImportUnit) -> Self {
        self.asset(Asset::Import(unit))
    }

    pub fn hydro(self, unit: HydroUnit) -> Self {
        self.asset(Asset::Hydro(unit))
    }

    pub fn demand(mut self, node: &str, series: Vec<f64>) -> Self {
        self.demand.insert(node, series);
        self
    }

    pub fn availability(mut self, unit: &str, series: Vec<f64>) -> Self {
        self.availability.insert(unit, series);
        self
    }

    pub fn derated_capacity(mut self, unit: &str, series: Vec<f64>) -> Self {
        self.derated_capacity.insert(unit, series);
        self
    }

    pub fn contract_price(mut self, contract: &str, series: Vec<f64>) -> Self {
        self.contract_prices.insert(contract, series);
        self
    }

    pub fn hydro_daily_energy(mut self, unit: &str, daily_mwh: Vec<f64>) -> Self {
        self.hydro_daily_energy.insert(unit, daily_mwh);
        self
    }

    pub fn spin_requirement(mut self, series: Vec<f64>) -> Self {
        self.spin_requirement = Some(series);
        self
    }

    /// Validate every cross reference and series length, then freeze the input.
    pub fn build(self) -> PcmResult<SystemInput> {
        if self.horizon_hours == 0 {
            return Err(PcmError::Validation("horizon must cover at least one hour".into()));
        }
        let horizon = self.horizon_hours;

        let mut network = Network::new();
        for node in &self.nodes {
            network.ensure_node(node);
        }
        for line in &self.lines {
            network.ensure_node(&line.source);
            network.ensure_node(&line.sink);
        }
        for line in self.lines {
            network.add_line(line)?;
        }

        for (node, values) in self.demand.iter() {
            if !network.has_node(node) {
                return Err(PcmError::inconsistent(node, "demand given for an unknown node"));
            }
            check_len(node, "demand", values.len(), horizon)?;
        }
        if let Some(series) = &self.spin_requirement {
            check_len("spin_requirement", "reserve requirement", series.len(), horizon)?;
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            let name = asset.name();
            if !seen.insert(name.to_string()) {
                return Err(PcmError::inconsistent(name, "duplicate asset name"));
            }
            if !network.has_node(asset.node()) {
                return Err(PcmError::inconsistent(
                    name,
                    format!("attached to unknown node '{}'", asset.node()),
                ));
            }
            for contract in asset.contracts() {
                match self.contract_prices.get(contract) {
                    Some(values) => check_len(name, &format!("contract '{contract}'"), values.len(), horizon)?,
                    None => {
                        return Err(PcmError::inconsistent(
                            name,
                            format!("references unknown contract '{contract}'"),
                        ))
                    }
                }
            }
            validate_asset(asset, &self.assets, &self.availability, &self.derated_capacity, horizon)?;
        }

        let days = horizon.div_ceil(HOURS_PER_DAY);
        for (unit, values) in self.hydro_daily_energy.iter() {
            if !matches!(self.assets.iter().find(|a| a.name() == unit), Some(Asset::Hydro(_))) {
                return Err(PcmError::inconsistent(unit, "daily energy given for a non-hydro asset"));
            }
            check_len(unit, "daily hydro energy", values.len(), days)?;
        }

        Ok(SystemInput {
            network,
            assets: self.assets,
            horizon_hours: horizon,
            demand: self.demand,
            availability: self.availability,
            derated_capacity: self.derated_capacity,
            contract_prices: self.contract_prices,
            hydro_daily_energy: self.hydro_daily_energy,
            spin_requirement: self.spin_requirement,
        })
    }
}

fn check_len(entity: &str, what: &str, len: usize, needed: usize) -> PcmResult<()> {
    if len < needed {
        return Err(PcmError::inconsistent(
            entity,
            format!("{what} series has {len} periods, horizon needs {needed}"),
        ));
    }
    Ok(())
}

fn validate_asset(
    asset: &Asset,
    all: &[Asset],
    availability: &SeriesTable,
    derated: &SeriesTable,
    horizon: usize,
) -> PcmResult<()> {
    match asset {
        Asset::Thermal(u) => {
            if u.min_capacity_mw < 0.0 || u.min_capacity_mw > u.max_capacity_mw {
                return Err(PcmError::inconsistent(&u.name, "requires 0 <= min capacity <= max capacity"));
            }
            if u.ramp_up_mw < 0.0 || u.ramp_down_mw < 0.0 {
                return Err(PcmError::inconsistent(&u.name, "negative ramp limit"));
            }
            if u.startup_ramp() < u.min_capacity_mw || u.shutdown_ramp() < u.min_capacity_mw {
                return Err(PcmError::inconsistent(
                    &u.name,
                    "start-up and shut-down ramp must reach the minimum capacity",
                ));
            }
            if let Some(values) = derated.get(&u.name) {
                check_len(&u.name, "derated capacity", values.len(), horizon)?;
                if values[..horizon].iter().any(|v| *v > u.max_capacity_mw + 1e-9 || *v < 0.0) {
                    return Err(PcmError::inconsistent(&u.name, "derated capacity outside [0, max capacity]"));
                }
            }
        }
        Asset::NonDispatchable(u) => match availability.get(&u.name) {
            Some(values) => check_len(&u.name, "availability", values.len(), horizon)?,
            None => return Err(PcmError::inconsistent(&u.name, "missing availability series")),
        },
        Asset::Import(u) => {
            if let Some(values) = availability.get(&u.name) {
                check_len(&u.name, "availability", values.len(), horizon)?;
            }
        }
        Asset::Storage(s) => {
            let eff_ok = |e: f64| e > 0.0 && e <= 1.0;
            if !eff_ok(s.charge_efficiency) || !eff_ok(s.discharge_efficiency) {
                return Err(PcmError::inconsistent(&s.name, "efficiencies must lie in (0, 1]"));
            }
            if !(0.0..1.0).contains(&s.self_discharge_rate) {
                return Err(PcmError::inconsistent(&s.name, "self-discharge rate must lie in [0, 1)"));
            }
            if s.min_level_mwh > s.max_level_mwh
                || s.initial_level_mwh < s.min_level_mwh
                || s.initial_level_mwh > s.max_level_mwh
            {
                return Err(PcmError::inconsistent(&s.name, "inconsistent storage level bounds"));
            }
            if let Some(target) = &s.attached_unit {
                match all.iter().find(|a| a.name() == target) {
                    Some(a) if a.accepts_storage() => {}
                    Some(_) => {
                        return Err(PcmError::inconsistent(
                            &s.name,
                            "storage can only attach to non-dispatchable or import units",
                        ))
                    }
                    None => {
                        return Err(PcmError::inconsistent(
                            &s.name,
                            format!("attached to unknown unit '{target}'"),
                        ))
                    }
                }
            }
        }
        Asset::Hydro(h) => {
            if h.max_capacity_mw < 0.0 {
                return Err(PcmError::inconsistent(&h.name, "negative capacity"));
            }
            let negative_ramp = [h.ramp_up_mw, h.ramp_down_mw].into_iter().flatten().any(|r| r < 0.0);
            if negative_ramp || h.ramp_penalty < 0.0 {
                return Err(PcmError::inconsistent(&h.name, "negative ramp limit or ramp penalty"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::RenewableKind;
    use crate::series::constant;

    fn base() -> SystemInputBuilder {
        SystemInput::builder(24)
            .node("A")
            .node("B")
            .line(Line::new("A", "B", 100.0, 100.0))
            .contract_price("gas", constant(3.0, 24))
            .demand("A", constant(30.0, 24))
    }

    #[test]
    fn test_valid_input() {
        let input = base()
            .thermal(ThermalUnit::new("g1", "A", 10.0, 50.0, "gas"))
            .build()
            .expect("valid input");
        assert_eq!(input.network().nodes().len(), 2);
        assert_eq!(input.demand("A", 5), 30.0);
        assert_eq!(input.demand("B", 5), 0.0);
        assert_eq!(input.spin_requirement(0, 0.1), 3.0);
    }

    #[test]
    fn test_unknown_node_is_reported() {
        let err = base()
            .thermal(ThermalUnit::new("g1", "Z", 10.0, 50.0, "gas"))
            .build()
            .unwrap_err();
        match err {
            PcmError::DataInconsistency { entity, reason } => {
                assert_eq!(entity, "g1");
                assert!(reason.contains("'Z'"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_contract_is_reported() {
        let err = base()
            .thermal(ThermalUnit::new("g1", "A", 10.0, 50.0, "coal"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("coal"));
    }

    #[test]
    fn test_short_availability_is_rejected() {
        let unit = NonDispatchableUnit::new("pv", "A", RenewableKind::Solar, "gas");
        let err = base().non_dispatchable(unit, constant(1.0, 10)).build().unwrap_err();
        assert!(matches!(err, PcmError::DataInconsistency { .. }));
    }

    #[test]
    fn test_missing_hydro_budget_defaults_to_turbine_limit() {
        let input = base().hydro(HydroUnit::new("dam", "B", 10.0)).build().unwrap();
        let schedule = input.initial_hydro_schedule();
        assert_eq!(schedule.daily_energy("dam", 0), Some(240.0));
    }

    #[test]
    fn test_negative_hydro_ramp_is_rejected() {
        let dam = HydroUnit::new("dam", "B", 10.0).with_ramps(2.0, -1.0);
        let err = base().hydro(dam).build().unwrap_err();
        assert!(err.to_string().contains("ramp"));
    }
}
