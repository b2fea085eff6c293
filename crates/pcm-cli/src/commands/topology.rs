use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use pcm_algo::io::{load_dataset, save_cycle_basis};
use pcm_core::{cycle_basis, islands};
use tabwriter::TabWriter;
use tracing::info;

pub fn handle(dataset: &Path, out: &Path) -> Result<()> {
    let data = load_dataset(dataset)?;
    let network = data.input.network();
    let basis = cycle_basis(network);
    save_cycle_basis(network, &basis, out)?;
    info!(
        cycles = basis.len(),
        islands = islands(network).len(),
        out = %out.display(),
        "cycle basis saved"
    );

    let lines = network.lines();
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "CYCLE\tLINES")?;
    for (i, cycle) in basis.cycles.iter().enumerate() {
        let members: Vec<String> = cycle
            .members
            .iter()
            .map(|m| {
                let sign = if m.sign > 0 { '+' } else { '-' };
                format!("{sign}{}", lines[m.line].name)
            })
            .collect();
        writeln!(writer, "{i}\t{}", members.join(" "))?;
    }
    writer.flush()?;
    Ok(())
}
