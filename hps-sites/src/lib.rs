//! Core types and indicator sources for hydropower site data.
//!
//! Locations are keyed by coordinates rounded to six decimals (see
//! [`coordinate::CoordKey`]). Plants come from a power-plant database,
//! background points are sampled from river geometries, and each indicator
//! is produced by an [`fetcher::IndicatorFetcher`]. The remote clients
//! (Open-Meteo, Copernicus Data Space) are only compiled with the `api`
//! feature.

pub mod coordinate;
pub mod discharge;
pub mod error;
pub mod fetcher;
pub mod indicator;
pub mod location;
pub mod plant;
pub mod river;

#[cfg(feature = "api")]
pub mod copernicus;
#[cfg(feature = "api")]
pub mod open_meteo;
#[cfg(feature = "api")]
pub mod raster;

pub use error::{Result, SiteError};
