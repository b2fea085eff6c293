//! TOML run configuration.
//!
//! ```toml
//! window_hours = 24
//! steps = 7
//! cycle_basis = "cache/cycles.json"
//!
//! [model]
//! formulation = "voltage_angle"
//! spin_reserve_factor = 0.1
//!
//! [solver]
//! backend = "highs"
//! time_limit_secs = 60
//!
//! [coupling]
//! mode = "hard"
//! max_iterations = 5
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pcm_algo::SimulationConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    #[serde(flatten)]
    pub simulation: SimulationConfig,
    /// Cycle-basis artifact reused between runs of the same network
    pub cycle_basis: Option<PathBuf>,
}

/// Read a run configuration; no file means all defaults.
pub fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcm_algo::{CouplingMode, FlowFormulation};

    #[test]
    fn test_no_file_gives_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.simulation, SimulationConfig::default());
        assert!(config.cycle_basis.is_none());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            steps = 3
            cycle_basis = "cycles.json"

            [model]
            formulation = "voltage_angle"

            [coupling]
            mode = "soft"
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.steps, 3);
        assert_eq!(config.simulation.window_hours, 24);
        assert_eq!(config.simulation.model.formulation, FlowFormulation::VoltageAngle);
        assert_eq!(config.simulation.coupling.mode, CouplingMode::Soft);
        assert_eq!(config.cycle_basis, Some(PathBuf::from("cycles.json")));
    }
}
