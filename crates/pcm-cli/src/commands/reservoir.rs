use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, Result};
use pcm_algo::io::{load_dataset, write_reservoir_days};
use tabwriter::TabWriter;

pub fn handle(dataset: &Path, days: usize, out: &Path) -> Result<()> {
    let data = load_dataset(dataset)?;
    let basin = data
        .basin
        .ok_or_else(|| anyhow!("{} has no reservoir/ directory", dataset.display()))?;
    let records = basin.simulate_rule_curve(days)?;
    write_reservoir_days(&records, out)?;

    let mut totals: BTreeMap<&str, (f64, f64, f64)> = BTreeMap::new();
    for day in &records {
        let entry = totals.entry(day.reservoir.as_str()).or_default();
        entry.0 += day.release;
        entry.1 += day.spill;
        entry.2 += day.energy_mwh;
    }
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "RESERVOIR\tRELEASE (m3)\tSPILL (m3)\tENERGY (MWh)")?;
    for name in basin.order() {
        let (release, spill, energy) = totals.get(name).copied().unwrap_or_default();
        writeln!(writer, "{name}\t{release:.0}\t{spill:.0}\t{energy:.1}")?;
    }
    writer.flush()?;
    Ok(())
}
