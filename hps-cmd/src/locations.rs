//! Building and writing the location set.

use crate::config::{DataPaths, PipelineConfig};
use anyhow::Context;
use hps_data::table;
use hps_sites::{
    location::{LocationProvider, LocationRecord, PlantLocations, PlantsWithBackground},
    plant::PlantFilter,
};
use log::info;
use std::path::PathBuf;

/// Plants alone, or plants followed by sampled river background points.
pub fn provider(
    paths: &DataPaths,
    config: &PipelineConfig,
    plants_only: bool,
) -> Box<dyn LocationProvider> {
    let plants = PlantLocations::new(&paths.plants, PlantFilter::european_hydro());
    if plants_only {
        Box::new(plants)
    } else {
        Box::new(PlantsWithBackground::new(
            plants,
            &paths.rivers,
            config.sampler.clone(),
        ))
    }
}

pub fn load_locations(
    paths: &DataPaths,
    config: &PipelineConfig,
    plants_only: bool,
) -> anyhow::Result<Vec<LocationRecord>> {
    provider(paths, config, plants_only)
        .locations()
        .with_context(|| {
            format!(
                "Failed to build location set from {} and {}",
                paths.plants.display(),
                paths.rivers.display()
            )
        })
}

/// Write the location set as `name,latitude,longitude`.
pub fn run_locations(
    paths: &DataPaths,
    plants_only: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = PipelineConfig::default();
    let locations = load_locations(paths, &config, plants_only)?;
    let output = output.unwrap_or_else(|| paths.locations());
    table::save_locations(&output, &locations)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let plants = locations.iter().filter(|l| l.name.is_some()).count();
    info!(
        "Wrote {} locations ({} plants, {} background) to {}",
        locations.len(),
        plants,
        locations.len() - plants,
        output.display()
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// A data directory with two plants (one outside Europe) and three rivers:
    /// one next to the plant, one eligible, one below the discharge threshold.
    pub(crate) fn data_dir() -> (TempDir, DataPaths) {
        let tmp = TempDir::new().unwrap();
        let paths = DataPaths::new(tmp.path(), None, None);
        fs::write(
            &paths.plants,
            "name,plant_lat,plant_lon,country\n\
             Kops,47.0,10.0,Austria\n\
             Itaipu,-25.4,-54.6,Brazil\n",
        )
        .unwrap();
        fs::write(
            &paths.rivers,
            "geometry,DIS_AV_CMS\n\
             \"LINESTRING (10.0 47.01, 10.0 47.02)\",40.0\n\
             \"LINESTRING (5.0 60.0, 5.1 60.1)\",12.5\n\
             \"LINESTRING (6.0 61.0, 6.1 61.1)\",0.5\n",
        )
        .unwrap();
        (tmp, paths)
    }

    #[test]
    fn test_run_locations() {
        let (_tmp, paths) = data_dir();
        run_locations(&paths, false, None).unwrap();
        let contents = fs::read_to_string(paths.locations()).unwrap();
        assert_eq!(contents, "name,latitude,longitude\nKops,47.0,10.0\n,60.0,5.0\n");
    }

    #[test]
    fn test_plants_only() {
        let (tmp, paths) = data_dir();
        let output = tmp.path().join("plants.csv");
        run_locations(&paths, true, Some(output.clone())).unwrap();
        let contents = fs::read_to_string(output).unwrap();
        assert_eq!(contents, "name,latitude,longitude\nKops,47.0,10.0\n");
    }

    #[test]
    fn test_missing_plant_database() {
        let tmp = TempDir::new().unwrap();
        let paths = DataPaths::new(tmp.path(), None, None);
        assert!(run_locations(&paths, true, None).is_err());
    }
}
