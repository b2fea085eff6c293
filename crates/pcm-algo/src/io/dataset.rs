//! CSV dataset loader.
//!
//! A dataset is a directory of tables:
//!
//! | file                    | shape                         | required |
//! |-------------------------|-------------------------------|----------|
//! | `lines.csv`             | one row per line              | yes      |
//! | `demand.csv`            | hourly, one column per node   | yes      |
//! | `nodes.csv`             | column `name`                 | no       |
//! | `thermal_units.csv`     | one row per unit              | no       |
//! | `nondispatch_units.csv` | one row per unit              | no       |
//! | `storage_units.csv`     | one row per unit              | no       |
//! | `import_units.csv`      | one row per unit              | no       |
//! | `hydro_units.csv`       | one row per unit              | no       |
//! | `availability.csv`      | hourly, one column per unit   | no       |
//! | `contract_price.csv`    | hourly, one column per contract | no     |
//! | `derated_capacity.csv`  | hourly, one column per unit   | no       |
//! | `spin_requirement.csv`  | hourly, column `requirement`  | no       |
//! | `hydro_daily.csv`       | daily, one column per unit    | no       |
//! | `reservoir/`            | basin tables, see [`load_basin`] | no    |
//!
//! Wide tables may carry an index column named `hour`, `day` or `date`,
//! which is ignored. The horizon is the number of rows in `demand.csv`.
//!
//! `hydro_units.csv` accepts optional `ramp_up_mw`, `ramp_down_mw` and
//! `ramp_penalty` columns; an empty ramp cell means no limit.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;
use pcm_core::{
    resolve_line, Asset, HydroUnit, ImportUnit, LineSpec, NonDispatchableUnit, SeriesTable, StorageUnit,
    SystemInput, ThermalUnit,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::reservoir::{Basin, FlowPath, Reservoir, ReservoirParams};

const INDEX_COLUMNS: [&str; 3] = ["hour", "day", "date"];

/// Everything needed to run a simulation.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub input: SystemInput,
    /// Present when the dataset has a `reservoir/` directory
    pub basin: Option<Basin>,
}

/// Thermal table row. A single `ramp_limit_mw` sets both directions unless
/// the directional columns are given.
#[derive(Debug, Deserialize)]
struct ThermalRow {
    name: String,
    node: String,
    min_capacity_mw: f64,
    max_capacity_mw: f64,
    #[serde(default)]
    ramp_limit_mw: Option<f64>,
    #[serde(default)]
    ramp_up_mw: Option<f64>,
    #[serde(default)]
    ramp_down_mw: Option<f64>,
    #[serde(default)]
    startup_ramp_mw: Option<f64>,
    #[serde(default)]
    shutdown_ramp_mw: Option<f64>,
    #[serde(default)]
    min_up_hours: Option<usize>,
    #[serde(default)]
    min_down_hours: Option<usize>,
    #[serde(default)]
    heat_rate: Option<f64>,
    fuel_contract: String,
    #[serde(default)]
    fixed_cost: Option<f64>,
    #[serde(default)]
    opex: Option<f64>,
    #[serde(default)]
    startup_cost: Option<f64>,
    #[serde(default)]
    must_take: Option<bool>,
    #[serde(default)]
    reserve_eligible: Option<bool>,
}

impl ThermalRow {
    fn into_unit(self) -> ThermalUnit {
        let mut unit = ThermalUnit::new(
            &self.name,
            &self.node,
            self.min_capacity_mw,
            self.max_capacity_mw,
            &self.fuel_contract,
        )
        .with_min_up_down(self.min_up_hours.unwrap_or(1), self.min_down_hours.unwrap_or(1))
        .with_costs(
            self.heat_rate.unwrap_or(0.0),
            self.fixed_cost.unwrap_or(0.0),
            self.opex.unwrap_or(0.0),
            self.startup_cost.unwrap_or(0.0),
        );
        let ramp = self.ramp_limit_mw.unwrap_or(self.max_capacity_mw);
        unit.ramp_up_mw = self.ramp_up_mw.unwrap_or(ramp);
        unit.ramp_down_mw = self.ramp_down_mw.unwrap_or(ramp);
        unit.startup_ramp_mw = self.startup_ramp_mw;
        unit.shutdown_ramp_mw = self.shutdown_ramp_mw;
        unit.must_take = self.must_take.unwrap_or(false);
        unit.reserve_eligible = self.reserve_eligible.unwrap_or(true);
        unit
    }
}

#[derive(Debug, Deserialize)]
struct NodeRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RequirementRow {
    requirement: f64,
}

/// Load a dataset directory.
pub fn load_dataset(dir: &Path) -> Result<Dataset> {
    let demand = read_wide_table(&dir.join("demand.csv"))?;
    let horizon = demand.min_len();
    if horizon == 0 {
        bail!("{} has no rows", dir.join("demand.csv").display());
    }

    let mut builder = SystemInput::builder(horizon);
    for row in read_optional_rows::<NodeRow>(&dir.join("nodes.csv"))? {
        builder = builder.node(&row.name);
    }

    let path = dir.join("lines.csv");
    for spec in read_rows::<LineSpec>(&path)? {
        let line = resolve_line(&spec).with_context(|| format!("resolving line in {}", path.display()))?;
        builder = builder.line(line);
    }

    let mut assets: Vec<Asset> = Vec::new();
    assets.extend(
        read_optional_rows::<ThermalRow>(&dir.join("thermal_units.csv"))?
            .into_iter()
            .map(|row| Asset::Thermal(row.into_unit())),
    );
    assets.extend(
        read_optional_rows::<NonDispatchableUnit>(&dir.join("nondispatch_units.csv"))?
            .into_iter()
            .map(Asset::NonDispatchable),
    );
    assets.extend(
        read_optional_rows::<StorageUnit>(&dir.join("storage_units.csv"))?
            .into_iter()
            .map(Asset::Storage),
    );
    assets.extend(
        read_optional_rows::<ImportUnit>(&dir.join("import_units.csv"))?
            .into_iter()
            .map(Asset::Import),
    );
    assets.extend(
        read_optional_rows::<HydroUnit>(&dir.join("hydro_units.csv"))?
            .into_iter()
            .map(Asset::Hydro),
    );
    for asset in assets {
        builder = builder.node(asset.node()).asset(asset);
    }

    for (node, values) in demand.iter() {
        builder = builder.node(node).demand(node, values.to_vec());
    }
    for (unit, values) in read_optional_wide_table(&dir.join("availability.csv"))?.iter() {
        builder = builder.availability(unit, values.to_vec());
    }
    for (contract, values) in read_optional_wide_table(&dir.join("contract_price.csv"))?.iter() {
        builder = builder.contract_price(contract, values.to_vec());
    }
    for (unit, values) in read_optional_wide_table(&dir.join("derated_capacity.csv"))?.iter() {
        builder = builder.derated_capacity(unit, values.to_vec());
    }
    for (unit, values) in read_optional_wide_table(&dir.join("hydro_daily.csv"))?.iter() {
        builder = builder.hydro_daily_energy(unit, values.to_vec());
    }
    let spin = read_optional_rows::<RequirementRow>(&dir.join("spin_requirement.csv"))?;
    if !spin.is_empty() {
        builder = builder.spin_requirement(spin.into_iter().map(|r| r.requirement).collect());
    }

    let input = builder
        .build()
        .with_context(|| format!("validating dataset {}", dir.display()))?;

    let reservoir_dir = dir.join("reservoir");
    let basin = if reservoir_dir.is_dir() {
        Some(load_basin(&reservoir_dir)?)
    } else {
        None
    };

    info!(
        dir = %dir.display(),
        hours = input.horizon_hours(),
        nodes = input.network().nodes().len(),
        lines = input.network().lines().len(),
        assets = input.assets().len(),
        reservoirs = basin.as_ref().map_or(0, |b| b.reservoirs().len()),
        "dataset loaded"
    );
    Ok(Dataset { input, basin })
}

/// Load a reservoir basin directory.
///
/// - `reservoirs.csv`: one row of [`ReservoirParams`] per reservoir
/// - `inflow.csv`: daily natural inflow (m³/day), one column per reservoir
/// - `min_flow.csv` or `mean_annual_flow.csv` (optional): daily, one column per reservoir
/// - `evaporation.csv` (optional): daily, one column per reservoir
/// - `flow_paths.csv` (optional): `source,sink,fraction`
pub fn load_basin(dir: &Path) -> Result<Basin> {
    let params = read_rows::<ReservoirParams>(&dir.join("reservoirs.csv"))?;
    let inflow = read_wide_table(&dir.join("inflow.csv"))?;
    let min_flow = read_optional_wide_table(&dir.join("min_flow.csv"))?;
    let mean_annual_flow = read_optional_wide_table(&dir.join("mean_annual_flow.csv"))?;
    let evaporation = read_optional_wide_table(&dir.join("evaporation.csv"))?;

    let mut reservoirs = Vec::with_capacity(params.len());
    for p in params {
        let name = p.name.clone();
        let series = inflow
            .get(&name)
            .ok_or_else(|| anyhow!("inflow.csv has no column for reservoir '{name}'"))?;
        let mut reservoir = Reservoir::new(p, series.to_vec())?;
        if let Some(values) = min_flow.get(&name) {
            reservoir = reservoir.with_min_flow(values.to_vec())?;
        } else if let Some(values) = mean_annual_flow.get(&name) {
            reservoir = reservoir.with_mean_annual_flow(values)?;
        }
        if let Some(values) = evaporation.get(&name) {
            reservoir = reservoir.with_evaporation(values.to_vec());
        }
        reservoirs.push(reservoir);
    }

    let paths = read_optional_rows::<FlowPath>(&dir.join("flow_paths.csv"))?;
    debug!(reservoirs = reservoirs.len(), paths = paths.len(), "basin tables read");
    Basin::new(reservoirs, paths).with_context(|| format!("building basin from {}", dir.display()))
}

/// Read a wide table: one row per period, one numeric column per entity.
pub fn read_wide_table(path: &Path) -> Result<SeriesTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .clone();
    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !INDEX_COLUMNS.contains(&name.to_ascii_lowercase().as_str()))
        .map(|(i, name)| (i, name.to_string()))
        .collect();

    let mut values: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("reading row {} of {}", row + 1, path.display()))?;
        for (slot, (i, name)) in columns.iter().enumerate() {
            let raw = record.get(*i).unwrap_or("");
            let value: f64 = raw.parse().with_context(|| {
                format!("{} row {}: column '{}' holds '{}'", path.display(), row + 1, name, raw)
            })?;
            values[slot].push(value);
        }
    }

    let mut table = SeriesTable::new();
    for ((_, name), column) in columns.into_iter().zip(values) {
        table.insert(name, column);
    }
    Ok(table)
}

fn read_optional_wide_table(path: &Path) -> Result<SeriesTable> {
    if path.exists() {
        read_wide_table(path)
    } else {
        Ok(SeriesTable::new())
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, result) in reader.deserialize().enumerate() {
        let row: T = result.with_context(|| format!("parsing row {} of {}", i + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_optional_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.exists() {
        read_rows(path)
    } else {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    fn hourly(header: &str, value: &str, hours: usize) -> String {
        let mut out = format!("{header}\n");
        for _ in 0..hours {
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    fn minimal(dir: &Path) {
        write(dir, "lines.csv", "source,sink,susceptance,capacity_mw\nA,B,500,100\n");
        write(
            dir,
            "thermal_units.csv",
            "name,node,min_capacity_mw,max_capacity_mw,ramp_limit_mw,heat_rate,fuel_contract,opex\n\
             ccgt,A,10,80,40,7.5,gas,2\n",
        );
        write(dir, "demand.csv", &hourly("hour,B", "0,30", 24));
        write(dir, "contract_price.csv", &hourly("gas", "4", 24));
    }

    #[test]
    fn test_minimal_dataset_loads() {
        let dir = tempdir().unwrap();
        minimal(dir.path());
        let dataset = load_dataset(dir.path()).unwrap();
        let input = &dataset.input;
        assert_eq!(input.horizon_hours(), 24);
        assert_eq!(input.network().lines().len(), 1);
        assert_eq!(input.demand("B", 5), 30.0);
        let unit = input.thermal_units().next().unwrap();
        assert_eq!(unit.ramp_up_mw, 40.0);
        assert_eq!(unit.ramp_down_mw, 40.0);
        assert_eq!(unit.min_up_hours, 1);
        assert!(dataset.basin.is_none());
    }

    #[test]
    fn test_line_reactance_resolved() {
        let dir = tempdir().unwrap();
        minimal(dir.path());
        write(
            dir.path(),
            "lines.csv",
            "source,sink,reactance_pu,base_mva,capacity_mw\nA,B,0.1,100,100\n",
        );
        let dataset = load_dataset(dir.path()).unwrap();
        assert!((dataset.input.network().lines()[0].susceptance - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_number_names_file_and_column() {
        let dir = tempdir().unwrap();
        minimal(dir.path());
        write(dir.path(), "demand.csv", "B\n30\nlots\n");
        let err = load_dataset(dir.path()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("demand.csv"), "{message}");
        assert!(message.contains("'B'"), "{message}");
    }

    #[test]
    fn test_missing_contract_is_reported() {
        let dir = tempdir().unwrap();
        minimal(dir.path());
        fs::remove_file(dir.path().join("contract_price.csv")).unwrap();
        let err = load_dataset(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("gas"));
    }

    #[test]
    fn test_reservoir_directory_builds_basin() {
        let dir = tempdir().unwrap();
        minimal(dir.path());
        write(dir.path(), "hydro_units.csv", "name,node,max_capacity_mw\nupper_hp,A,50\n");
        let basin_dir = dir.path().join("reservoir");
        fs::create_dir(&basin_dir).unwrap();
        write(
            &basin_dir,
            "reservoirs.csv",
            "name,unit,min_day,max_day,min_level,max_level,max_head,max_storage,max_release,max_generation,turbine_factor\n\
             upper,upper_hp,100,280,0,10,80,1e9,2e7,50,0.9\n\
             lower,,100,280,0,10,40,5e8,2e7,20,0.9\n",
        );
        write(&basin_dir, "inflow.csv", "day,upper,lower\n0,5e6,1e6\n1,5e6,1e6\n");
        write(&basin_dir, "mean_annual_flow.csv", "upper,lower\n5e6,1e6\n5e6,1e6\n");
        write(&basin_dir, "flow_paths.csv", "source,sink,fraction\nupper,lower,1.0\n");

        let dataset = load_dataset(dir.path()).unwrap();
        let basin = dataset.basin.unwrap();
        assert_eq!(basin.order().collect::<Vec<_>>(), vec!["upper", "lower"]);
        assert_eq!(basin.units().collect::<Vec<_>>(), vec!["upper_hp", "lower"]);
        assert!(basin.reservoirs()[0].min_flow(0) > 0.0);
    }

    #[test]
    fn test_hydro_ramp_columns_are_optional() {
        let dir = tempdir().unwrap();
        minimal(dir.path());
        write(
            dir.path(),
            "hydro_units.csv",
            "name,node,max_capacity_mw,ramp_up_mw,ramp_down_mw,ramp_penalty
dam,A,50,5,,0.5
",
        );
        let dataset = load_dataset(dir.path()).unwrap();
        let dam = dataset.input.hydro_units().next().unwrap();
        assert_eq!(dam.ramp_up_mw, Some(5.0));
        assert_eq!(dam.ramp_down_mw, None);
        assert_eq!(dam.ramp_penalty, 0.5);
    }

    #[test]
    fn test_basin_without_inflow_column_fails() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "reservoirs.csv",
            "name,min_day,max_day,min_level,max_level,max_head,max_storage,max_release,max_generation,turbine_factor\n\
             lake,100,280,0,10,80,1e9,2e7,50,0.9\n",
        );
        write(dir.path(), "inflow.csv", "other\n1\n");
        let err = load_basin(dir.path()).unwrap_err();
        assert!(err.to_string().contains("lake"));
    }
}
