use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

#[derive(Parser, Debug)]
#[command(name = "pcm", author, version, about = "Rolling-horizon production cost model", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate a dataset and write the result tables
    Run {
        /// Dataset directory
        #[arg(long, value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        /// TOML run configuration
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
        /// Number of windows; overrides the configuration
        #[arg(long)]
        steps: Option<usize>,
        /// Hours per window; overrides the configuration
        #[arg(long)]
        window_hours: Option<usize>,
        /// Output directory
        #[arg(long, value_hint = ValueHint::DirPath)]
        out: PathBuf,
    },
    /// Compute the cycle basis of a dataset and persist it
    Topology {
        #[arg(long, value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        /// Cycle-basis artifact (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
    /// Run the reservoir basin on its rule curve
    Reservoir {
        #[arg(long, value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        /// Days to simulate
        #[arg(long)]
        days: usize,
        /// Daily trajectory (CSV)
        #[arg(long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
}
