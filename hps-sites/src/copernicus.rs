//! Copernicus Data Space clients: token issuing and the Sentinel Hub
//! process API used for spectral indices and terrain slope.
//!
//! # Authentication
//!
//! OpenID Connect token endpoint with the public `cdse-public` client.
//! `grant_type=password` logs in, `grant_type=refresh_token` renews.
//!
//! # Process API
//!
//! `POST /api/v1/process` with a bounding box around the location, an
//! evalscript, and a request for a single-band FLOAT32 GeoTIFF. A 401
//! answer means the bearer token expired.

use crate::{
    error::{Result, SiteError},
    fetcher::{Authenticator, Credentials, FetchFailure, FetchOutcome, IndicatorFetcher},
    indicator::Indicator,
    location::LocationRecord,
    raster,
};
use hps_utils::dates::DateWindow;
use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

pub const AUTH_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const PROCESS_URL: &str = "https://sh.dataspace.copernicus.eu/api/v1/process";
pub const CLIENT_ID: &str = "cdse-public";

/// Output raster edge length in pixels.
const OUTPUT_SIZE: u32 = 50;
/// Scene classes never used: cloud shadow, clouds, cirrus, snow.
const INVALID_SCL: [u8; 5] = [3, 8, 9, 10, 11];
/// Scene class for water.
const WATER_SCL: u8 = 6;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Issues and refreshes Copernicus Data Space tokens.
#[derive(Clone)]
pub struct CopernicusAuth {
    client: Client,
    username: String,
    password: String,
    url: String,
}

impl std::fmt::Debug for CopernicusAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopernicusAuth")
            .field("username", &self.username)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl CopernicusAuth {
    pub fn new(client: Client, username: impl Into<String>, password: impl Into<String>) -> Self {
        CopernicusAuth {
            client,
            username: username.into(),
            password: password.into(),
            url: AUTH_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<Credentials> {
        let response = self.client.post(&self.url).form(form).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SiteError::Authentication(format!("{}: {}", status, body)));
        }
        let token: TokenResponse = response.json().await?;
        Ok(Credentials::new(token.access_token, token.refresh_token))
    }

    /// Log in with username and password.
    pub async fn login(&self) -> Result<Credentials> {
        info!("Authenticating with Copernicus Data Space as {}", self.username);
        self.request_token(&[
            ("client_id", CLIENT_ID),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("grant_type", "password"),
        ])
        .await
    }
}

impl Authenticator for CopernicusAuth {
    async fn refresh(&self, current: &Credentials) -> Result<Credentials> {
        let refresh_token = current.refresh_token().ok_or_else(|| {
            SiteError::Authentication("no refresh token was issued".to_string())
        })?;
        info!("Refreshing Copernicus Data Space tokens");
        self.request_token(&[
            ("client_id", CLIENT_ID),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

/// Normalized-difference indices computed from Sentinel-2 L2A bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectralIndex {
    Ndvi,
    Ndwi,
    Ndbi,
}

impl SpectralIndex {
    pub fn indicator(&self) -> Indicator {
        match self {
            SpectralIndex::Ndvi => Indicator::Ndvi,
            SpectralIndex::Ndwi => Indicator::Ndwi,
            SpectralIndex::Ndbi => Indicator::Ndbi,
        }
    }

    pub fn from_indicator(indicator: Indicator) -> Option<Self> {
        match indicator {
            Indicator::Ndvi => Some(SpectralIndex::Ndvi),
            Indicator::Ndwi => Some(SpectralIndex::Ndwi),
            Indicator::Ndbi => Some(SpectralIndex::Ndbi),
            _ => None,
        }
    }

    /// `(positive, negative)` bands of `(p - n) / (p + n)`.
    pub fn bands(&self) -> (&'static str, &'static str) {
        match self {
            SpectralIndex::Ndvi => ("B08", "B04"),
            SpectralIndex::Ndwi => ("B03", "B08"),
            SpectralIndex::Ndbi => ("B11", "B08"),
        }
    }

    /// Scene classes whose samples are dropped. NDVI also drops water.
    pub fn excluded_scene_classes(&self) -> Vec<u8> {
        let mut classes = INVALID_SCL.to_vec();
        if *self == SpectralIndex::Ndvi {
            classes.push(WATER_SCL);
            classes.sort_unstable();
        }
        classes
    }

    /// Evalscript averaging the index over all valid samples of each pixel.
    pub fn evalscript(&self) -> String {
        let id = self.indicator().column();
        let (p, n) = self.bands();
        let excluded = self
            .excluded_scene_classes()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"//VERSION=3
function setup() {{
  return {{
    input: [{{ bands: ["{p}", "{n}", "SCL"], units: "DN" }}],
    output: [{{ id: "{id}", bands: 1, sampleType: "FLOAT32" }}],
    mosaicking: "ORBIT"
  }};
}}

function evaluatePixel(samples) {{
  var sum = 0;
  var count = 0;
  for (var i = 0; i < samples.length; i++) {{
    var s = samples[i];
    if ([{excluded}].includes(s.SCL)) {{
      continue;
    }}
    var value = (s.{p} - s.{n}) / (s.{p} + s.{n});
    if (!isNaN(value) && isFinite(value)) {{
      sum += value;
      count++;
    }}
  }}
  return {{ {id}: [count === 0 ? NaN : sum / count] }};
}}
"#
        )
    }
}

/// Lon/lat bounding box of `buffer_deg` around a location.
fn bbox(location: &LocationRecord, buffer_deg: f64) -> [f64; 4] {
    [
        location.longitude - buffer_deg,
        location.latitude - buffer_deg,
        location.longitude + buffer_deg,
        location.latitude + buffer_deg,
    ]
}

fn output_spec(identifier: &str) -> Value {
    json!({
        "width": OUTPUT_SIZE,
        "height": OUTPUT_SIZE,
        "responses": [{
            "identifier": identifier,
            "format": { "type": "image/tiff" }
        }]
    })
}

/// Post a process request and return the raster bytes.
async fn process(
    client: &Client,
    url: &str,
    credentials: &Credentials,
    payload: &Value,
    location: &LocationRecord,
) -> std::result::Result<Vec<u8>, FetchFailure> {
    let response = client
        .post(url)
        .header(reqwest::header::AUTHORIZATION, credentials.bearer())
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            warn!("Process request failed for {}: {}", location.display_name(), e);
            FetchFailure::Network(e.to_string())
        })?;

    match response.status() {
        StatusCode::OK => {}
        StatusCode::UNAUTHORIZED => return Err(FetchFailure::AuthExpired),
        status => {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Error {} for {}: {}",
                status,
                location.display_name(),
                body
            );
            return Err(FetchFailure::Status(status.as_u16()));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchFailure::Network(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Temporal-mean spectral index around each location.
#[derive(Debug, Clone)]
pub struct SpectralIndexFetcher {
    client: Client,
    index: SpectralIndex,
    window: DateWindow,
    url: String,
}

impl SpectralIndexFetcher {
    /// ~100 m at the equator
    pub const BUFFER_DEGREES: f64 = 0.0009;
    pub const MAX_CLOUD_COVER: u8 = 10;

    pub fn new(client: Client, index: SpectralIndex, window: DateWindow) -> Self {
        SpectralIndexFetcher {
            client,
            index,
            window,
            url: PROCESS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn payload(&self, location: &LocationRecord) -> Value {
        let mut data = json!({
            "type": "sentinel-2-l2a",
            "dataFilter": {
                "timeRange": {
                    "from": self.window.start_timestamp(),
                    "to": self.window.end_timestamp(),
                },
                "maxCloudCoverPercentage": Self::MAX_CLOUD_COVER,
            }
        });
        if self.index == SpectralIndex::Ndvi {
            data["processing"] = json!({ "atmosphericCorrection": "NONE" });
        }
        json!({
            "evalscript": self.index.evalscript(),
            "input": {
                "bounds": { "bbox": bbox(location, Self::BUFFER_DEGREES) },
                "data": [data],
            },
            "output": output_spec(self.index.indicator().column()),
        })
    }
}

impl IndicatorFetcher for SpectralIndexFetcher {
    fn indicator(&self) -> Indicator {
        self.index.indicator()
    }

    async fn fetch(&self, location: &LocationRecord, credentials: &Credentials) -> FetchOutcome {
        let payload = self.payload(location);
        let bytes = process(&self.client, &self.url, credentials, &payload, location).await?;
        let band = raster::decode_band(&bytes)
            .map_err(|e| FetchFailure::InvalidResponse(e.to_string()))?;
        raster::band_mean(&band).ok_or(FetchFailure::NoValidData)
    }
}

/// Mean terrain slope from the Copernicus 30 m DEM.
#[derive(Debug, Clone)]
pub struct SlopeFetcher {
    client: Client,
    url: String,
}

impl SlopeFetcher {
    /// ~500 m at the equator
    pub const BUFFER_DEGREES: f64 = 0.0045;
    pub const PIXEL_SIZE_M: f64 = 30.0;
    pub const DEM_INSTANCE: &'static str = "COPERNICUS_30";

    const EVALSCRIPT: &'static str = r#"//VERSION=3
function setup() {
  return {
    input: ["DEM"],
    output: { bands: 1, sampleType: "FLOAT32" }
  };
}

function evaluatePixel(sample) {
  return [sample.DEM];
}
"#;

    pub fn new(client: Client) -> Self {
        SlopeFetcher {
            client,
            url: PROCESS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn payload(&self, location: &LocationRecord) -> Value {
        json!({
            "evalscript": Self::EVALSCRIPT,
            "input": {
                "bounds": { "bbox": bbox(location, Self::BUFFER_DEGREES) },
                "data": [{
                    "type": "dem",
                    "dataFilter": { "demInstance": Self::DEM_INSTANCE }
                }],
            },
            "output": output_spec("default"),
        })
    }
}

impl IndicatorFetcher for SlopeFetcher {
    fn indicator(&self) -> Indicator {
        Indicator::Slope
    }

    async fn fetch(&self, location: &LocationRecord, credentials: &Credentials) -> FetchOutcome {
        let payload = self.payload(location);
        let bytes = process(&self.client, &self.url, credentials, &payload, location).await?;
        let dem = raster::decode_band(&bytes)
            .map_err(|e| FetchFailure::InvalidResponse(e.to_string()))?;
        raster::mean_slope_degrees(&dem, Self::PIXEL_SIZE_M).ok_or(FetchFailure::NoValidData)
    }
}
