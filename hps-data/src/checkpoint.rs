//! Resumable per-indicator checkpoints.
//!
//! A checkpoint is an indicator table keyed by rounded coordinates. A run
//! loads it once, consults it before every fetch, and rewrites it from the
//! in-memory buffer every `interval` records. Rows loaded from disk that the
//! current run has not reached yet are carried over on every flush, so a
//! checkpoint never loses rows.

use crate::{error::Result, table};
use hps_sites::{coordinate::CoordKey, indicator::Indicator, indicator::IndicatorRecord};
use log::{debug, info};
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 200;

/// Previously computed values, at most one per rounded coordinate pair.
#[derive(Debug, Clone, Default)]
pub struct CheckpointTable {
    records: Vec<IndicatorRecord>,
    index: HashMap<CoordKey, usize>,
}

impl CheckpointTable {
    /// Build a table; the first row for each coordinate wins.
    pub fn from_records(rows: Vec<IndicatorRecord>) -> Self {
        let mut table = CheckpointTable::default();
        for row in rows {
            let key = row.key();
            if table.index.contains_key(&key) {
                continue;
            }
            table.index.insert(key, table.records.len());
            table.records.push(row);
        }
        table
    }

    pub fn lookup(&self, latitude: f64, longitude: f64) -> Option<&IndicatorRecord> {
        self.index
            .get(&CoordKey::new(latitude, longitude))
            .map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[IndicatorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Records produced by the current run, in input order.
#[derive(Debug, Clone, Default)]
pub struct ResultBuffer {
    records: Vec<IndicatorRecord>,
}

impl ResultBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        ResultBuffer {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: IndicatorRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[IndicatorRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<IndicatorRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads and writes the checkpoint file of one indicator.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    indicator: Indicator,
    interval: usize,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, indicator: Indicator) -> Self {
        CheckpointStore {
            path: path.into(),
            indicator,
            interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    /// Flush every `interval` records (at least 1).
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Load the checkpoint, or an empty table if none exists yet.
    pub fn load(&self) -> Result<CheckpointTable> {
        if !self.path.exists() {
            info!(
                "No checkpoint at {}, starting fresh",
                self.path.display()
            );
            return Ok(CheckpointTable::default());
        }
        let rows = table::load_indicator_table(&self.path, self.indicator.column())?;
        let table = CheckpointTable::from_records(rows);
        info!(
            "Loaded checkpoint with {} {} rows from {}",
            table.len(),
            self.indicator,
            self.path.display()
        );
        Ok(table)
    }

    pub fn lookup<'t>(
        &self,
        table: &'t CheckpointTable,
        latitude: f64,
        longitude: f64,
    ) -> Option<&'t IndicatorRecord> {
        table.lookup(latitude, longitude)
    }

    /// Append a record and flush when the buffer length reaches a multiple
    /// of the interval. Returns whether a flush happened.
    pub fn append_and_maybe_flush(
        &self,
        buffer: &mut ResultBuffer,
        record: IndicatorRecord,
        table: &CheckpointTable,
    ) -> Result<bool> {
        buffer.push(record);
        if buffer.len() % self.interval == 0 {
            self.flush(buffer, table)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Rewrite the checkpoint: buffer rows first, then loaded rows the buffer
    /// does not cover, one row per coordinate.
    pub fn flush(&self, buffer: &ResultBuffer, table: &CheckpointTable) -> Result<()> {
        let mut seen = HashSet::new();
        let rows: Vec<IndicatorRecord> = buffer
            .records()
            .iter()
            .chain(table.records())
            .filter(|r| seen.insert(r.key()))
            .cloned()
            .collect();
        table::save_indicator_table(&self.path, self.indicator.column(), &rows)?;
        debug!(
            "Checkpoint flushed: {} rows to {}",
            rows.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Write the result table from the buffer and flush the checkpoint one
    /// last time.
    pub fn finalize(
        &self,
        buffer: &ResultBuffer,
        table: &CheckpointTable,
        result_path: &Path,
    ) -> Result<()> {
        table::save_indicator_table(result_path, self.indicator.column(), buffer.records())?;
        self.flush(buffer, table)?;
        info!(
            "Saved {} {} rows to {}",
            buffer.len(),
            self.indicator,
            result_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(name: Option<&str>, latitude: f64, longitude: f64, value: Option<f64>) -> IndicatorRecord {
        IndicatorRecord {
            name: name.map(str::to_string),
            latitude,
            longitude,
            value,
        }
    }

    #[test]
    fn test_load_missing_checkpoint_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path().join("ndvi_intermediate.csv"), Indicator::Ndvi);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_first_row_wins_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("precipitation_intermediate.csv");
        fs::write(
            &path,
            "name,latitude,longitude,precipitation\n\
             A,45.0,8.0,3.2\n\
             B,45.0000001,8.0,9.9\n\
             ,46.0,9.0,\n",
        )
        .unwrap();
        let store = CheckpointStore::new(&path, Indicator::Precipitation);
        let table = store.load().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(store.lookup(&table, 45.0, 8.0000002).unwrap().value, Some(3.2));
        assert_eq!(store.lookup(&table, 46.0, 9.0).unwrap().value, None);
        assert!(store.lookup(&table, 46.00001, 9.0).is_none());
    }

    #[test]
    fn test_flush_at_multiples_of_interval() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ndwi_intermediate.csv");
        let store = CheckpointStore::new(&path, Indicator::Ndwi).with_interval(2);
        let table = CheckpointTable::default();
        let mut buffer = ResultBuffer::default();

        let flushed: Vec<bool> = (0..5)
            .map(|i| {
                store
                    .append_and_maybe_flush(&mut buffer, record(None, i as f64, 0.0, Some(1.0)), &table)
                    .unwrap()
            })
            .collect();
        assert_eq!(flushed, vec![false, true, false, true, false]);
        assert_eq!(store.load().unwrap().len(), 4);
    }

    #[test]
    fn test_flush_keeps_loaded_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("slope_degrees_intermediate.csv");
        let store = CheckpointStore::new(&path, Indicator::Slope);
        let table = CheckpointTable::from_records(vec![
            record(Some("A"), 45.0, 8.0, Some(3.2)),
            record(Some("B"), 46.0, 9.0, Some(7.5)),
        ]);
        let mut buffer = ResultBuffer::default();
        buffer.push(record(Some("A"), 45.0, 8.0, Some(3.2)));
        buffer.push(record(Some("C"), 47.0, 10.0, None));
        store.flush(&buffer, &table).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(
            reloaded.records().iter().map(|r| r.name.as_deref()).collect::<Vec<_>>(),
            vec![Some("A"), Some("C"), Some("B")]
        );
    }

    #[test]
    fn test_finalize_writes_result_and_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let checkpoint = tmp.path().join("intermediary").join("discharge_intermediate.csv");
        let result = tmp.path().join("results").join("average_discharge.csv");
        let store = CheckpointStore::new(&checkpoint, Indicator::Discharge);
        let mut buffer = ResultBuffer::default();
        buffer.push(record(Some("A"), 45.0, 8.0, Some(12.0)));
        store.finalize(&buffer, &CheckpointTable::default(), &result).unwrap();

        let expected = "name,latitude,longitude,discharge\nA,45,8,12\n";
        assert_eq!(fs::read_to_string(&result).unwrap(), expected);
        assert_eq!(fs::read_to_string(&checkpoint).unwrap(), expected);
    }
}
