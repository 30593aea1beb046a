//! Mean daily precipitation from the Open-Meteo ERA5 archive.
//!
//! # Open-Meteo API
//!
//! - URL: `https://archive-api.open-meteo.com/v1/era5`
//! - Query: `latitude`, `longitude`, `start_date`, `end_date` (YYYY-MM-DD),
//!   `daily=precipitation_sum`, `timezone=UTC`
//! - Response: `{"daily": {"time": [...], "precipitation_sum": [1.2, null, ...]}}`
//!
//! Days reported as `null` are left out of the average.

use crate::{
    fetcher::{Credentials, FetchFailure, FetchOutcome, IndicatorFetcher},
    indicator::Indicator,
    location::LocationRecord,
};
use hps_utils::dates::{format_date, DateWindow};
use log::warn;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// ERA5 reanalysis archive endpoint.
pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/era5";

#[derive(Debug, Deserialize)]
pub struct ArchiveResponse {
    pub daily: Option<DailySeries>,
}

#[derive(Debug, Deserialize)]
pub struct DailySeries {
    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
}

impl ArchiveResponse {
    /// Mean of the reported daily precipitation sums in mm.
    pub fn mean_daily_precipitation(&self) -> Option<f64> {
        let days = self.daily.as_ref()?;
        let valid: Vec<f64> = days
            .precipitation_sum
            .iter()
            .flatten()
            .copied()
            .filter(|p| p.is_finite())
            .collect();
        if valid.is_empty() {
            None
        } else {
            Some(valid.iter().sum::<f64>() / valid.len() as f64)
        }
    }
}

/// Fetches mean daily precipitation over a fixed date window.
#[derive(Debug, Clone)]
pub struct PrecipitationFetcher {
    client: Client,
    window: DateWindow,
    url: String,
}

impl PrecipitationFetcher {
    pub fn new(client: Client, window: DateWindow) -> Self {
        PrecipitationFetcher {
            client,
            window,
            url: ARCHIVE_URL.to_string(),
        }
    }

    /// Point the fetcher at another archive endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl IndicatorFetcher for PrecipitationFetcher {
    fn indicator(&self) -> Indicator {
        Indicator::Precipitation
    }

    async fn fetch(&self, location: &LocationRecord, _credentials: &Credentials) -> FetchOutcome {
        let start = format_date(&self.window.start());
        let end = format_date(&self.window.end());
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("start_date", start),
            ("end_date", end),
            ("daily", "precipitation_sum".to_string()),
            ("timezone", "UTC".to_string()),
        ];

        let response = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                warn!("Open-Meteo request failed for {}: {}", location.display_name(), e);
                FetchFailure::Network(e.to_string())
            })?;

        if response.status() != StatusCode::OK {
            warn!(
                "Bad response status for {}: {}",
                location.display_name(),
                response.status()
            );
            return Err(FetchFailure::Status(response.status().as_u16()));
        }

        let body: ArchiveResponse = response
            .json()
            .await
            .map_err(|e| FetchFailure::InvalidResponse(e.to_string()))?;
        body.mean_daily_precipitation()
            .ok_or(FetchFailure::NoValidData)
    }
}
