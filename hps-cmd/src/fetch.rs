//! Checkpointed fetching of one indicator for the whole location set.
//!
//! Every indicator runs through the same [`FetchLoop`]; only the fetcher,
//! the authenticator and the pause between requests differ.
//!
//! | indicator       | source                          | credentials |
//! |-----------------|---------------------------------|-------------|
//! | precipitation   | Open-Meteo ERA5 archive         | none        |
//! | ndvi/ndwi/ndbi  | Sentinel-2 L2A process API      | Copernicus  |
//! | slope           | Copernicus DEM process API      | Copernicus  |
//! | discharge       | local river table               | none        |

use crate::{
    config::{self, DataPaths, PipelineConfig},
    locations,
};
use anyhow::Context;
use hps_data::{
    checkpoint::CheckpointStore,
    fetch_loop::{FetchLoop, FetchReport},
};
use hps_sites::{
    copernicus::{CopernicusAuth, SlopeFetcher, SpectralIndex, SpectralIndexFetcher},
    discharge::DischargeLookup,
    fetcher::{Anonymous, Authenticator, Credentials, IndicatorFetcher},
    indicator::Indicator,
    location::LocationRecord,
    open_meteo::PrecipitationFetcher,
    river::{self, RiverIndex},
};
use log::info;
use std::path::Path;

fn http_client(config: &PipelineConfig) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")
}

async fn copernicus_session(client: &reqwest::Client) -> anyhow::Result<(CopernicusAuth, Credentials)> {
    let (username, password) = config::copernicus_login()?;
    let auth = CopernicusAuth::new(client.clone(), username, password);
    let credentials = auth
        .login()
        .await
        .context("Copernicus Data Space login failed")?;
    Ok((auth, credentials))
}

async fn drive<F, A>(
    mut fetch_loop: FetchLoop<F, A>,
    indicator: Indicator,
    locations: &[LocationRecord],
    result_path: &Path,
) -> anyhow::Result<FetchReport>
where
    F: IndicatorFetcher,
    A: Authenticator,
{
    fetch_loop
        .run(locations, result_path)
        .await
        .with_context(|| format!("Fetching {} stopped", indicator))
}

/// Fetch `indicator` for every location, resuming from its checkpoint.
pub async fn run_fetch(
    paths: &DataPaths,
    indicator: Indicator,
    plants_only: bool,
    checkpoint_interval: usize,
) -> anyhow::Result<()> {
    let config = PipelineConfig::default();
    let locations = locations::load_locations(paths, &config, plants_only)?;
    let store = CheckpointStore::new(paths.checkpoint(indicator), indicator)
        .with_interval(checkpoint_interval);
    let result_path = paths.result(indicator);
    let pause = config.request_pause(indicator);

    let report = match indicator {
        Indicator::Discharge => {
            let rivers = river::load_rivers(&paths.rivers)
                .with_context(|| format!("Failed to read rivers from {}", paths.rivers.display()))?;
            let index = RiverIndex::new(rivers);
            if index.is_empty() {
                anyhow::bail!("No river segments in {}", paths.rivers.display());
            }
            info!("Indexed {} river segments", index.len());
            let lookup = DischargeLookup::new(index);
            let fetch_loop = FetchLoop::new(lookup, Anonymous, Credentials::anonymous(), store);
            drive(fetch_loop, indicator, &locations, &result_path).await?
        }
        Indicator::Precipitation => {
            let client = http_client(&config)?;
            let fetcher = PrecipitationFetcher::new(client, config.precipitation_window);
            let fetch_loop = FetchLoop::new(fetcher, Anonymous, Credentials::anonymous(), store)
                .with_request_pause(pause);
            drive(fetch_loop, indicator, &locations, &result_path).await?
        }
        Indicator::Slope => {
            let client = http_client(&config)?;
            let (auth, credentials) = copernicus_session(&client).await?;
            let fetch_loop = FetchLoop::new(SlopeFetcher::new(client), auth, credentials, store)
                .with_request_pause(pause);
            drive(fetch_loop, indicator, &locations, &result_path).await?
        }
        Indicator::Ndvi | Indicator::Ndwi | Indicator::Ndbi => {
            let index = SpectralIndex::from_indicator(indicator)
                .with_context(|| format!("{} is not a spectral index", indicator))?;
            let client = http_client(&config)?;
            let (auth, credentials) = copernicus_session(&client).await?;
            let fetcher = SpectralIndexFetcher::new(client, index, config.spectral_window);
            let fetch_loop = FetchLoop::new(fetcher, auth, credentials, store)
                .with_request_pause(pause);
            drive(fetch_loop, indicator, &locations, &result_path).await?
        }
    };

    info!(
        "{}: {} of {} locations have a value, results in {}",
        indicator,
        report.with_value(),
        report.records.len(),
        result_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::tests::data_dir;
    use std::fs;

    #[tokio::test]
    async fn test_fetch_discharge_end_to_end() {
        let (_tmp, paths) = data_dir();
        run_fetch(&paths, Indicator::Discharge, false, 200).await.unwrap();

        let expected = "name,latitude,longitude,discharge\nKops,47,10,40\n,60,5,12.5\n";
        assert_eq!(fs::read_to_string(paths.result(Indicator::Discharge)).unwrap(), expected);
        assert_eq!(
            fs::read_to_string(paths.checkpoint(Indicator::Discharge)).unwrap(),
            expected
        );

        // a second run is served from the checkpoint
        run_fetch(&paths, Indicator::Discharge, false, 200).await.unwrap();
        assert_eq!(fs::read_to_string(paths.result(Indicator::Discharge)).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_fetch_discharge_without_rivers_fails() {
        let (_tmp, paths) = data_dir();
        fs::write(&paths.rivers, "geometry,DIS_AV_CMS\n").unwrap();
        let result = run_fetch(&paths, Indicator::Discharge, true, 200).await;
        assert!(result.is_err());
        assert!(!paths.result(Indicator::Discharge).exists());
    }
}
