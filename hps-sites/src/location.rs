use crate::{
    coordinate::CoordKey,
    error::Result,
    plant::{self, PlantFilter},
    river::{self, BackgroundSampler},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A location to collect indicators for. Plants carry a name; sampled
/// river background points do not.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationRecord {
    pub fn plant(name: &str, latitude: f64, longitude: f64) -> Self {
        LocationRecord {
            name: Some(name.to_string()),
            latitude,
            longitude,
        }
    }

    pub fn background(latitude: f64, longitude: f64) -> Self {
        LocationRecord {
            name: None,
            latitude,
            longitude,
        }
    }

    pub fn key(&self) -> CoordKey {
        CoordKey::new(self.latitude, self.longitude)
    }

    /// Name for log lines; background points are shown as `<background>`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<background>")
    }
}

/// Produces the ordered set of locations a fetch run iterates over.
pub trait LocationProvider {
    fn locations(&self) -> Result<Vec<LocationRecord>>;
}

/// Hydropower plants read from a power-plant database and filtered by fuel
/// and country.
#[derive(Debug, Clone)]
pub struct PlantLocations {
    pub path: PathBuf,
    pub filter: PlantFilter,
}

impl PlantLocations {
    pub fn new(path: impl Into<PathBuf>, filter: PlantFilter) -> Self {
        PlantLocations {
            path: path.into(),
            filter,
        }
    }
}

impl LocationProvider for PlantLocations {
    fn locations(&self) -> Result<Vec<LocationRecord>> {
        let plants = plant::load_plants(&self.path, &self.filter)?;
        info!("Loaded {} plants from {}", plants.len(), self.path.display());
        Ok(plants)
    }
}

/// Plants followed by background points sampled from rivers away from
/// every plant.
#[derive(Debug, Clone)]
pub struct PlantsWithBackground {
    pub plants: PlantLocations,
    pub rivers_path: PathBuf,
    pub sampler: BackgroundSampler,
}

impl PlantsWithBackground {
    pub fn new(
        plants: PlantLocations,
        rivers_path: impl Into<PathBuf>,
        sampler: BackgroundSampler,
    ) -> Self {
        PlantsWithBackground {
            plants,
            rivers_path: rivers_path.into(),
            sampler,
        }
    }
}

impl LocationProvider for PlantsWithBackground {
    fn locations(&self) -> Result<Vec<LocationRecord>> {
        let plants = self.plants.locations()?;
        let rivers = river::load_rivers(&self.rivers_path)?;
        let background = self.sampler.sample(&rivers, &plants);
        info!(
            "Location set: {} plants + {} background points",
            plants.len(),
            background.len()
        );
        let mut locations = plants;
        locations.extend(background);
        Ok(locations)
    }
}
