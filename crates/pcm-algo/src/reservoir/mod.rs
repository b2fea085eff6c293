//! Cascade reservoir simulator.
//!
//! Each [`Reservoir`] advances once per day with the mass balance
//! `storage[t+1] = storage[t] + inflow[t] - release[t] - evaporation[t] - spill[t]`.
//! A [`Basin`] orders reservoirs upstream to downstream and routes release
//! plus spill along its flow paths within the same day.
//!
//! Two release policies are available per basin run:
//!
//! - rule curve ([`Basin::simulate_rule_curve`]): follow the seasonal target
//!   storage path,
//! - dispatch-driven ([`Basin::propose`]): match a daily energy target coming
//!   from the grid model.
//!
//! Days are absolute and 0-based; day `d` uses day-of-year `d % 365 + 1` on
//! the rule curve.

mod basin;
pub mod functions;
mod release;

use pcm_core::{PcmError, PcmResult};
use serde::{Deserialize, Serialize};

pub use basin::{apply_energy, Basin, BasinProposal, DispatchTarget, FlowPath, ReservoirDay};
pub use functions::Hydraulics;
pub use release::{release_for_energy, rule_curve_release, DayConditions};

use self::functions::{min_environmental_flow, storage_from_level, target_level, DAYS_PER_YEAR};

fn default_hydropeak_factor() -> f64 {
    0.15
}

/// Static description of one reservoir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirParams {
    pub name: String,
    /// Hydro unit fed by this reservoir; defaults to the reservoir name
    #[serde(default)]
    pub unit: Option<String>,
    /// Day of year (1-based) of the lowest target level
    pub min_day: usize,
    /// Day of year (1-based) of the highest target level
    pub max_day: usize,
    pub min_level: f64,
    pub max_level: f64,
    pub max_head: f64,
    /// m³
    pub max_storage: f64,
    /// m³/day
    pub max_release: f64,
    /// MW
    pub max_generation: f64,
    pub turbine_factor: f64,
    #[serde(default = "default_hydropeak_factor")]
    pub hydropeak_factor: f64,
    /// Storage on day 0; the rule-curve target of day 0 when absent
    #[serde(default)]
    pub initial_storage: Option<f64>,
}

impl ReservoirParams {
    pub fn hydraulics(&self) -> Hydraulics {
        Hydraulics {
            min_level: self.min_level,
            max_level: self.max_level,
            max_storage: self.max_storage,
            max_head: self.max_head,
            turbine_factor: self.turbine_factor,
            max_generation: self.max_generation,
        }
    }

    fn validate(&self) -> PcmResult<()> {
        let fail = |reason: &str| Err(PcmError::inconsistent(&self.name, reason));
        if self.max_storage <= 0.0 {
            return fail("max_storage must be positive");
        }
        if self.max_level <= self.min_level {
            return fail("max_level must exceed min_level");
        }
        if self.max_release < 0.0 || self.max_generation < 0.0 {
            return fail("release and generation limits must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.turbine_factor) {
            return fail("turbine_factor must lie in [0, 1]");
        }
        if self.min_day == 0 || self.max_day == 0 || self.min_day > DAYS_PER_YEAR || self.max_day > DAYS_PER_YEAR {
            return fail("min_day and max_day must be days of the year (1-365)");
        }
        if self.min_day > self.max_day {
            return fail("min_day must not come after max_day");
        }
        if self.hydropeak_factor < 0.0 {
            return fail("hydropeak_factor must be non-negative");
        }
        Ok(())
    }
}

/// A reservoir with its daily series.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservoir {
    params: ReservoirParams,
    /// Natural inflow (m³/day)
    inflow: Vec<f64>,
    /// Minimum environmental release (m³/day)
    min_flow: Vec<f64>,
    evaporation: Vec<f64>,
}

impl Reservoir {
    /// Reservoir with no environmental minimum and no evaporation.
    pub fn new(params: ReservoirParams, inflow: Vec<f64>) -> PcmResult<Self> {
        params.validate()?;
        if inflow.iter().any(|q| *q < 0.0) {
            return Err(PcmError::inconsistent(&params.name, "inflow must be non-negative"));
        }
        let min_flow = vec![0.0; inflow.len()];
        Ok(Self {
            params,
            inflow,
            min_flow,
            evaporation: Vec::new(),
        })
    }

    /// Explicit minimum environmental flow series.
    pub fn with_min_flow(mut self, min_flow: Vec<f64>) -> PcmResult<Self> {
        if min_flow.len() < self.inflow.len() {
            return Err(PcmError::inconsistent(
                &self.params.name,
                "min_flow series is shorter than the inflow series",
            ));
        }
        self.min_flow = min_flow
            .into_iter()
            .map(|q| q.clamp(0.0, self.params.max_release))
            .collect();
        Ok(self)
    }

    /// Minimum environmental flow derived from inflow vs mean annual flow.
    pub fn with_mean_annual_flow(mut self, mean_annual_flow: &[f64]) -> PcmResult<Self> {
        if mean_annual_flow.len() < self.inflow.len() {
            return Err(PcmError::inconsistent(
                &self.params.name,
                "mean annual flow series is shorter than the inflow series",
            ));
        }
        self.min_flow = self
            .inflow
            .iter()
            .zip(mean_annual_flow)
            .map(|(q, maf)| min_environmental_flow(*q, *maf, self.params.max_release))
            .collect();
        Ok(self)
    }

    pub fn with_evaporation(mut self, evaporation: Vec<f64>) -> Self {
        self.evaporation = evaporation;
        self
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    /// Hydro unit this reservoir supplies.
    pub fn unit(&self) -> &str {
        self.params.unit.as_deref().unwrap_or(&self.params.name)
    }

    pub fn params(&self) -> &ReservoirParams {
        &self.params
    }

    /// Number of days covered by the inflow series.
    pub fn days(&self) -> usize {
        self.inflow.len()
    }

    pub fn inflow(&self, day: usize) -> PcmResult<f64> {
        self.inflow.get(day).copied().ok_or_else(|| {
            PcmError::Reservoir(format!(
                "reservoir '{}' has no inflow for day {} ({} days loaded)",
                self.params.name,
                day,
                self.inflow.len()
            ))
        })
    }

    pub fn min_flow(&self, day: usize) -> f64 {
        self.min_flow.get(day).copied().unwrap_or(0.0)
    }

    pub fn evaporation(&self, day: usize) -> f64 {
        self.evaporation.get(day).copied().unwrap_or(0.0).max(0.0)
    }

    /// Rule-curve storage target at the end of absolute day `day`.
    pub fn target_storage(&self, day: usize) -> f64 {
        let p = &self.params;
        let level = target_level(day % DAYS_PER_YEAR + 1, p.min_day, p.max_day, p.min_level, p.max_level);
        storage_from_level(level, p.min_level, p.max_level, p.max_storage)
    }

    pub fn initial_storage(&self) -> f64 {
        self.params
            .initial_storage
            .unwrap_or_else(|| self.target_storage(0))
            .clamp(0.0, self.params.max_storage)
    }
}

/// Committed condition of one reservoir between days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservoirState {
    pub storage: f64,
    /// Release of the previous day; `None` before the first simulated day
    pub last_release: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn params(name: &str) -> ReservoirParams {
        ReservoirParams {
            name: name.to_string(),
            unit: None,
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
            initial_storage: None,
        }
    }

    #[test]
    fn test_unit_defaults_to_reservoir_name() {
        let r = Reservoir::new(params("lake"), vec![1.0; 3]).unwrap();
        assert_eq!(r.unit(), "lake");
        let mut p = params("lake");
        p.unit = Some("lake_hp".into());
        assert_eq!(Reservoir::new(p, vec![1.0]).unwrap().unit(), "lake_hp");
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut p = params("lake");
        p.max_level = -1.0;
        let err = Reservoir::new(p, vec![1.0]).unwrap_err();
        assert!(err.to_string().contains("lake"));
    }

    #[test]
    fn test_min_flow_from_mean_annual_flow() {
        let r = Reservoir::new(params("lake"), vec![10.0, 100.0])
            .unwrap()
            .with_mean_annual_flow(&[100.0, 100.0])
            .unwrap();
        assert!((r.min_flow(0) - 6.0).abs() < 1e-9);
        assert!((r.min_flow(1) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_inflow_out_of_range() {
        let r = Reservoir::new(params("lake"), vec![1.0]).unwrap();
        assert!(matches!(r.inflow(3), Err(PcmError::Reservoir(_))));
    }

    #[test]
    fn test_initial_storage_follows_rule_curve() {
        let r = Reservoir::new(params("lake"), vec![1.0]).unwrap();
        assert!((r.initial_storage() - r.target_storage(0)).abs() < 1e-6);
    }
}
