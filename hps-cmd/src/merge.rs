//! Joining the per-indicator results into the final dataset.

use crate::config::DataPaths;
use anyhow::Context;
use hps_data::merge::{self, IndicatorTable};
use hps_sites::indicator::Indicator;
use log::{info, warn};
use std::path::PathBuf;

/// Column order of the merged table.
pub const MERGE_ORDER: [Indicator; 6] = [
    Indicator::Ndvi,
    Indicator::Discharge,
    Indicator::Ndwi,
    Indicator::Precipitation,
    Indicator::Slope,
    Indicator::Ndbi,
];

/// Load every result table that exists, in [`MERGE_ORDER`].
pub fn load_result_tables(paths: &DataPaths) -> anyhow::Result<Vec<IndicatorTable>> {
    let mut tables = Vec::new();
    for indicator in MERGE_ORDER {
        let path = paths.result(indicator);
        if !path.exists() {
            warn!("Skipping {}: {} not found", indicator, path.display());
            continue;
        }
        let table = IndicatorTable::load(&path, indicator.column())
            .with_context(|| format!("Failed to read {}", path.display()))?;
        info!("Loaded {} {} rows", table.records.len(), indicator);
        tables.push(table);
    }
    Ok(tables)
}

pub fn run_merge(paths: &DataPaths, output: Option<PathBuf>) -> anyhow::Result<()> {
    let tables = load_result_tables(paths)?;
    if tables.is_empty() {
        anyhow::bail!(
            "No indicator results found in {}",
            paths.results_dir().display()
        );
    }
    let merged = merge::merge(&tables)?;
    let output = output.unwrap_or_else(|| paths.merged());
    merge::save_merged_table(&output, &merged)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let plants = merged.rows.iter().filter(|r| r.label == 1).count();
    info!(
        "Final dataset: {} rows ({} plants, {} background), columns: {}",
        merged.len(),
        plants,
        merged.len() - plants,
        merged.columns.join(", ")
    );
    Ok(())
}
