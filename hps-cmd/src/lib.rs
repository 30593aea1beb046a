//! Command implementations for the hydropower site CLI.
//!
//! `locations` writes the location set, `fetch` runs the checkpointed loop
//! for one indicator, and `merge` joins the per-indicator results into the
//! final labeled table.

use clap::{Args, Subcommand};
use hps_data::checkpoint::DEFAULT_CHECKPOINT_INTERVAL;
use hps_sites::indicator::Indicator;
use std::path::PathBuf;

pub mod config;
pub mod fetch;
pub mod locations;
pub mod merge;

use config::DataPaths;

/// Input and output locations shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Root of the data directory
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Power-plant database CSV (default: <data-dir>/GloHydroRes_vs1.csv)
    #[arg(long)]
    pub plants: Option<PathBuf>,

    /// River geometry CSV (default: <data-dir>/HydroRIVERS_v10_eu.csv)
    #[arg(long)]
    pub rivers: Option<PathBuf>,
}

impl DataArgs {
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir, self.plants.clone(), self.rivers.clone())
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Write the location set (plants, then sampled background points)
    Locations {
        #[command(flatten)]
        data: DataArgs,

        /// Only European hydropower plants, no background points
        #[arg(long)]
        plants_only: bool,

        /// Output CSV (default: <data-dir>/results/locations.csv)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Fetch one indicator for every location, resuming from its checkpoint
    Fetch {
        /// ndvi, ndwi, ndbi, precipitation, discharge or slope
        indicator: Indicator,

        #[command(flatten)]
        data: DataArgs,

        /// Only European hydropower plants, no background points
        #[arg(long)]
        plants_only: bool,

        /// Save the checkpoint every N locations
        #[arg(long, default_value_t = DEFAULT_CHECKPOINT_INTERVAL)]
        checkpoint_interval: usize,
    },

    /// Merge the available indicator results into one labeled table
    Merge {
        #[command(flatten)]
        data: DataArgs,

        /// Output CSV (default: <data-dir>/results/final_data.csv)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Locations {
            data,
            plants_only,
            output,
        } => locations::run_locations(&data.paths(), plants_only, output),
        Command::Fetch {
            indicator,
            data,
            plants_only,
            checkpoint_interval,
        } => fetch::run_fetch(&data.paths(), indicator, plants_only, checkpoint_interval).await,
        Command::Merge { data, output } => merge::run_merge(&data.paths(), output),
    }
}
