//! Fixed pipeline settings, the data-directory layout and secrets from the
//! environment.

use anyhow::Context;
use chrono::NaiveDate;
use hps_data::{checkpoint::DEFAULT_CHECKPOINT_INTERVAL, merge::MERGED_FILE_NAME};
use hps_sites::{indicator::Indicator, river::BackgroundSampler};
use hps_utils::dates::DateWindow;
use std::{path::PathBuf, time::Duration};

pub const USERNAME_VAR: &str = "CDSE_USERNAME";
pub const PASSWORD_VAR: &str = "CDSE_PASSWORD";

pub const PLANTS_FILE_NAME: &str = "GloHydroRes_vs1.csv";
pub const RIVERS_FILE_NAME: &str = "HydroRIVERS_v10_eu.csv";
pub const LOCATIONS_FILE_NAME: &str = "locations.csv";

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Days averaged for precipitation
    pub precipitation_window: DateWindow,
    /// Growing season averaged for the spectral indices
    pub spectral_window: DateWindow,
    pub sampler: BackgroundSampler,
    pub checkpoint_interval: usize,
    /// Open-Meteo rate limit
    pub precipitation_pause: Duration,
    pub http_timeout: Duration,
}

fn window(start: (i32, u32, u32), end: (i32, u32, u32)) -> DateWindow {
    let date = |(y, m, d): (i32, u32, u32)| NaiveDate::from_ymd_opt(y, m, d).unwrap();
    DateWindow::new(date(start), date(end)).unwrap()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            precipitation_window: window((2024, 1, 1), (2024, 12, 31)),
            spectral_window: window((2024, 4, 1), (2024, 9, 30)),
            sampler: BackgroundSampler::default(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            precipitation_pause: Duration::from_millis(1200),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Pause inserted after each remote request for `indicator`.
    pub fn request_pause(&self, indicator: Indicator) -> Duration {
        match indicator {
            Indicator::Precipitation => self.precipitation_pause,
            _ => Duration::ZERO,
        }
    }
}

/// Where inputs, checkpoints and results live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub plants: PathBuf,
    pub rivers: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>, plants: Option<PathBuf>, rivers: Option<PathBuf>) -> Self {
        let root = root.into();
        DataPaths {
            plants: plants.unwrap_or_else(|| root.join(PLANTS_FILE_NAME)),
            rivers: rivers.unwrap_or_else(|| root.join(RIVERS_FILE_NAME)),
            root,
        }
    }

    pub fn intermediary_dir(&self) -> PathBuf {
        self.root.join("intermediary")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn checkpoint(&self, indicator: Indicator) -> PathBuf {
        self.intermediary_dir().join(indicator.checkpoint_file_name())
    }

    pub fn result(&self, indicator: Indicator) -> PathBuf {
        self.results_dir().join(indicator.result_file_name())
    }

    pub fn merged(&self) -> PathBuf {
        self.results_dir().join(MERGED_FILE_NAME)
    }

    pub fn locations(&self) -> PathBuf {
        self.results_dir().join(LOCATIONS_FILE_NAME)
    }
}

/// Copernicus Data Space username and password, read from the environment
/// or a `.env` file.
pub fn copernicus_login() -> anyhow::Result<(String, String)> {
    dotenvy::dotenv().ok();
    let username = std::env::var(USERNAME_VAR)
        .with_context(|| format!("{} is not set (environment or .env)", USERNAME_VAR))?;
    let password = std::env::var(PASSWORD_VAR)
        .with_context(|| format!("{} is not set (environment or .env)", PASSWORD_VAR))?;
    Ok((username, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.precipitation_window.num_days(), 366);
        assert_eq!(config.spectral_window.to_string(), "2024-04-01..2024-09-30");
        assert_eq!(config.checkpoint_interval, 200);
        assert_eq!(config.sampler.sample_size, 9000);
        assert_eq!(config.sampler.seed, 42);
        assert_eq!(config.request_pause(Indicator::Precipitation), Duration::from_millis(1200));
        assert_eq!(config.request_pause(Indicator::Ndvi), Duration::ZERO);
    }

    #[test]
    fn test_data_paths() {
        let paths = DataPaths::new("data", None, Some(PathBuf::from("/tmp/rivers.csv")));
        assert_eq!(paths.plants, PathBuf::from("data/GloHydroRes_vs1.csv"));
        assert_eq!(paths.rivers, PathBuf::from("/tmp/rivers.csv"));
        assert_eq!(
            paths.checkpoint(Indicator::Slope),
            PathBuf::from("data/intermediary/slope_degrees_intermediate.csv")
        );
        assert_eq!(
            paths.result(Indicator::Discharge),
            PathBuf::from("data/results/average_discharge.csv")
        );
        assert_eq!(paths.merged(), PathBuf::from("data/results/final_data.csv"));
    }
}
