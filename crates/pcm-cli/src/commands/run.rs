use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use pcm_algo::io::{load_dataset, load_or_compute_cycle_basis, write_record, write_reservoir_days};
use pcm_algo::{RunSummary, Simulator};
use tabwriter::TabWriter;
use tracing::{error, info, warn};

use pcm_cli::load_config;

pub fn handle(
    dataset: &Path,
    config: Option<&Path>,
    steps: Option<usize>,
    window_hours: Option<usize>,
    out: &Path,
) -> Result<()> {
    let mut run_config = load_config(config)?;
    if let Some(steps) = steps {
        run_config.simulation.steps = steps;
    }
    if let Some(hours) = window_hours {
        run_config.simulation.window_hours = hours;
    }
    let data = load_dataset(dataset)?;

    let mut simulator = Simulator::new(&data.input, &run_config.simulation);
    if let Some(path) = &run_config.cycle_basis {
        simulator = simulator.with_cycle_basis(load_or_compute_cycle_basis(data.input.network(), path)?);
    }
    if let Some(basin) = data.basin {
        simulator = simulator.with_basin(basin);
    }

    match simulator.run() {
        Ok(record) => {
            write_record(&record, out)?;
            print_summary(&record.summary())?;
            info!(out = %out.display(), "run finished");
            Ok(())
        }
        Err(failure) => {
            error!(window = failure.window, "run stopped, writing partial results");
            write_record(&failure.partial, out)?;
            if let Some(last) = &failure.last_iterate {
                warn!(
                    iterations = last.iterations,
                    max_deviation = last.max_deviation,
                    "last coupling iterate was not committed"
                );
                if let Some(proposal) = &last.proposal {
                    write_reservoir_days(proposal.records(), &out.join("rejected_reservoir.csv"))?;
                }
            }
            Err(failure).context("simulation failed")
        }
    }
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "WINDOWS\tTOTAL COST\tSHORTFALL (MWh)\tNON-OPTIMAL")?;
    writeln!(
        writer,
        "{}\t{:.2}\t{:.3}\t{}",
        summary.windows,
        summary.total_cost,
        summary.total_shortfall_mwh,
        summary.non_optimal_windows.len()
    )?;
    writer.flush()?;
    Ok(())
}
