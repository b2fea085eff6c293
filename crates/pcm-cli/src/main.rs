use std::process::ExitCode;

use clap::Parser;
use pcm_cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {e}");
    }

    let result = match &cli.command {
        Commands::Run {
            dataset,
            config,
            steps,
            window_hours,
            out,
        } => commands::run::handle(dataset, config.as_deref(), *steps, *window_hours, out),
        Commands::Topology { dataset, out } => commands::topology::handle(dataset, out),
        Commands::Reservoir { dataset, days, out } => commands::reservoir::handle(dataset, *days, out),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
