use crate::{error::Result, location::LocationRecord};
use csv::ReaderBuilder;
use log::{debug, warn};
use serde::Deserialize;
use std::{collections::HashSet, fs::File, io::Read, path::Path};

/// Embedded allow-list of European country names (one per row, with header).
pub static EUROPEAN_COUNTRIES_CSV: &str = include_str!("../../fixtures/european_countries.csv");

/// Fuel value marking hydropower rows in the Global Power Plant Database.
pub const HYDRO_FUEL: &str = "Hydro";

/// One row of a power-plant table. Both the Global Power Plant Database
/// (`latitude`, `longitude`, `country_long`, `primary_fuel`) and GloHydroRes
/// (`plant_lat`, `plant_lon`, `country`) layouts deserialize into it.
#[derive(Debug, Deserialize)]
struct PlantRow {
    name: Option<String>,
    #[serde(alias = "plant_lat")]
    latitude: Option<f64>,
    #[serde(alias = "plant_lon")]
    longitude: Option<f64>,
    country: Option<String>,
    country_long: Option<String>,
    primary_fuel: Option<String>,
}

impl PlantRow {
    fn country_name(&self) -> Option<&str> {
        self.country_long
            .as_deref()
            .or(self.country.as_deref())
            .map(str::trim)
    }
}

/// Which plants count as candidate hydropower sites.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantFilter {
    /// Required `primary_fuel`; ignored for tables without that column.
    pub fuel: String,
    pub countries: HashSet<String>,
}

impl PlantFilter {
    /// Hydro plants located in Europe.
    pub fn european_hydro() -> Self {
        PlantFilter {
            fuel: HYDRO_FUEL.to_string(),
            countries: european_countries().into_iter().collect(),
        }
    }

    fn accepts(&self, row: &PlantRow) -> bool {
        let fuel_ok = match row.primary_fuel.as_deref() {
            Some(fuel) => fuel.trim() == self.fuel,
            None => true,
        };
        let country_ok = row
            .country_name()
            .map(|c| self.countries.contains(c))
            .unwrap_or(false);
        fuel_ok && country_ok
    }
}

/// Country names in the embedded European allow-list.
pub fn european_countries() -> Vec<String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(EUROPEAN_COUNTRIES_CSV.as_bytes());
    rdr.records()
        .filter_map(|row| row.ok())
        .filter_map(|row| row.get(0).map(|c| c.trim().to_string()))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Parse a power-plant CSV, keeping the rows accepted by `filter`.
///
/// Rows without finite coordinates are skipped.
pub fn parse_plant_csv<R: Read>(reader: R, filter: &PlantFilter) -> Result<Vec<LocationRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut plants = Vec::new();
    let mut skipped = 0u32;
    for row in rdr.deserialize() {
        let row: PlantRow = row?;
        if !filter.accepts(&row) {
            continue;
        }
        match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                let name = row
                    .name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty());
                plants.push(LocationRecord {
                    name,
                    latitude: lat,
                    longitude: lon,
                });
            }
            _ => {
                warn!(
                    "Skipping plant {:?} without usable coordinates",
                    row.name.as_deref().unwrap_or("")
                );
                skipped += 1;
            }
        }
    }
    debug!("Parsed {} plants, skipped {}", plants.len(), skipped);
    Ok(plants)
}

/// Read and filter a power-plant CSV file.
pub fn load_plants(path: &Path, filter: &PlantFilter) -> Result<Vec<LocationRecord>> {
    let file = File::open(path)?;
    parse_plant_csv(file, filter)
}
