//! Joins per-indicator tables into one labeled table.
//!
//! Rows are joined on (name, rounded latitude, rounded longitude) with full
//! outer semantics, then collapsed to one row per rounded coordinate pair.
//! When several joined rows share a coordinate pair the one with the most
//! values wins, then a named row over a nameless one, then the earliest.

use crate::{
    error::{DataError, Result},
    table,
};
use hps_sites::{coordinate::CoordKey, indicator::IndicatorRecord};
use log::info;
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    io::Write,
    path::Path,
};

/// File name of the merged table inside the results directory.
pub const MERGED_FILE_NAME: &str = "final_data.csv";

/// One indicator column and its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorTable {
    pub column: String,
    pub records: Vec<IndicatorRecord>,
}

impl IndicatorTable {
    pub fn new(column: impl Into<String>, records: Vec<IndicatorRecord>) -> Self {
        IndicatorTable {
            column: column.into(),
            records,
        }
    }

    pub fn load(path: &Path, column: &str) -> Result<Self> {
        Ok(IndicatorTable::new(column, table::load_indicator_table(path, column)?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// One value per column of the [`MergedTable`]
    pub values: Vec<Option<f64>>,
    /// 1 for a hydropower plant, 0 for a background point
    pub label: u8,
}

impl MergedRecord {
    fn non_null(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    pub columns: Vec<String>,
    pub rows: Vec<MergedRecord>,
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in `row`, if the column exists.
    pub fn value(&self, row: &MergedRecord, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        row.values.get(idx).copied().flatten()
    }
}

fn join_name(name: &Option<String>) -> Option<String> {
    name.as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Merge indicator tables in the given order.
pub fn merge(tables: &[IndicatorTable]) -> Result<MergedTable> {
    if tables.is_empty() {
        return Err(DataError::EmptyMerge);
    }
    let columns: Vec<String> = tables.iter().map(|t| t.column.clone()).collect();

    // full outer join on (name, rounded coordinates)
    let mut joined: Vec<(CoordKey, MergedRecord)> = Vec::new();
    let mut join_index: HashMap<(Option<String>, CoordKey), usize> = HashMap::new();
    for (t, indicator_table) in tables.iter().enumerate() {
        let mut seen = HashSet::new();
        for record in &indicator_table.records {
            let key = record.key();
            let join_key = (join_name(&record.name), key);
            if !seen.insert(join_key.clone()) {
                continue;
            }
            match join_index.entry(join_key) {
                Entry::Occupied(entry) => {
                    joined[*entry.get()].1.values[t] = record.value;
                }
                Entry::Vacant(entry) => {
                    let mut values = vec![None; tables.len()];
                    values[t] = record.value;
                    let name = entry.key().0.clone();
                    entry.insert(joined.len());
                    joined.push((
                        key,
                        MergedRecord {
                            label: u8::from(name.is_some()),
                            name,
                            latitude: key.latitude(),
                            longitude: key.longitude(),
                            values,
                        },
                    ));
                }
            }
        }
    }
    let joined_len = joined.len();

    // one row per coordinate pair, in order of first appearance
    let mut rows: Vec<MergedRecord> = Vec::new();
    let mut by_coordinate: HashMap<CoordKey, usize> = HashMap::new();
    for (key, candidate) in joined {
        match by_coordinate.entry(key) {
            Entry::Occupied(entry) => {
                let current = &mut rows[*entry.get()];
                let better = (candidate.non_null(), candidate.label) > (current.non_null(), current.label);
                if better {
                    *current = candidate;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(rows.len());
                rows.push(candidate);
            }
        }
    }

    info!(
        "Merged {} tables: {} joined rows, {} unique locations",
        tables.len(),
        joined_len,
        rows.len()
    );
    Ok(MergedTable { columns, rows })
}

/// Write `name,latitude,longitude,<columns...>,label`.
pub fn write_merged_table<W: Write>(writer: W, merged: &MergedTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["name", "latitude", "longitude"];
    header.extend(merged.columns.iter().map(String::as_str));
    header.push("label");
    wtr.write_record(&header)?;

    for row in &merged.rows {
        let mut fields = Vec::with_capacity(merged.columns.len() + 4);
        fields.push(row.name.clone().unwrap_or_default());
        fields.push(row.latitude.to_string());
        fields.push(row.longitude.to_string());
        fields.extend(row.values.iter().map(|v| table::format_value(*v)));
        fields.push(row.label.to_string());
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Save the merged table atomically.
pub fn save_merged_table(path: &Path, merged: &MergedTable) -> Result<()> {
    table::write_atomically(path, |file| write_merged_table(file, merged))?;
    info!("Saved {} merged rows to {}", merged.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: Option<&str>, latitude: f64, longitude: f64, value: Option<f64>) -> IndicatorRecord {
        IndicatorRecord {
            name: name.map(str::to_string),
            latitude,
            longitude,
            value,
        }
    }

    #[test]
    fn test_row_count_is_distinct_coordinates() {
        let a = IndicatorTable::new(
            "ndvi",
            vec![
                record(Some("A"), 45.0, 8.0, Some(0.1)),
                record(Some("B"), 46.0, 9.0, Some(0.2)),
                record(None, 47.0, 10.0, Some(0.3)),
            ],
        );
        let b = IndicatorTable::new(
            "discharge",
            vec![
                record(Some("B"), 46.000_000_1, 9.0, Some(20.0)),
                record(None, 48.0, 11.0, Some(5.0)),
            ],
        );
        let merged = merge(&[a, b]).unwrap();

        assert_eq!(merged.columns, vec!["ndvi", "discharge"]);
        assert_eq!(merged.len(), 4);
        let b_row = &merged.rows[1];
        assert_eq!(b_row.name.as_deref(), Some("B"));
        assert_eq!(b_row.values, vec![Some(0.2), Some(20.0)]);
        assert_eq!(merged.value(&merged.rows[3], "discharge"), Some(5.0));
        assert_eq!(merged.value(&merged.rows[3], "ndvi"), None);
    }

    #[test]
    fn test_labels() {
        let table = IndicatorTable::new(
            "slope_degrees",
            vec![
                record(Some("Kops"), 47.0, 10.0, Some(12.0)),
                record(None, 60.0, 5.0, Some(3.0)),
                record(Some(""), 61.0, 6.0, Some(4.0)),
            ],
        );
        let merged = merge(&[table]).unwrap();
        let labels: Vec<u8> = merged.rows.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![1, 0, 0]);
    }

    #[test]
    fn test_dedupe_prefers_most_values_then_named() {
        let a = IndicatorTable::new(
            "ndvi",
            vec![
                record(None, 45.0, 8.0, Some(0.5)),
                record(Some("P"), 50.0, 7.0, Some(0.4)),
            ],
        );
        let b = IndicatorTable::new(
            "ndwi",
            vec![
                record(Some("X"), 45.000_000_2, 8.0, Some(0.1)),
                record(None, 50.0, 7.0, Some(-0.2)),
            ],
        );
        let c = IndicatorTable::new(
            "precipitation",
            vec![record(Some("X"), 45.0, 8.0, Some(2.0))],
        );
        let merged = merge(&[a, b, c]).unwrap();

        assert_eq!(merged.len(), 2);
        // X has two values, the nameless row only one
        assert_eq!(merged.rows[0].name.as_deref(), Some("X"));
        assert_eq!(merged.rows[0].values, vec![None, Some(0.1), Some(2.0)]);
        assert_eq!(merged.rows[0].latitude, 45.0);
        // one value each: the named row wins
        assert_eq!(merged.rows[1].name.as_deref(), Some("P"));
        assert_eq!(merged.rows[1].label, 1);
    }

    #[test]
    fn test_first_row_per_join_key_wins_within_a_table() {
        let table = IndicatorTable::new(
            "ndvi",
            vec![
                record(Some("A"), 45.0, 8.0, Some(0.1)),
                record(Some("A"), 45.0, 8.0, Some(0.9)),
            ],
        );
        let merged = merge(&[table]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.rows[0].values, vec![Some(0.1)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(merge(&[]), Err(DataError::EmptyMerge)));
    }

    #[test]
    fn test_write_merged_table() {
        let a = IndicatorTable::new(
            "ndvi",
            vec![
                record(Some("Kops"), 47.0, 10.0, Some(0.3)),
                record(None, 60.5, 5.25, None),
            ],
        );
        let b = IndicatorTable::new("discharge", vec![record(Some("Kops"), 47.0, 10.0, Some(40.0))]);
        let merged = merge(&[a, b]).unwrap();

        let mut out = Vec::new();
        write_merged_table(&mut out, &merged).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "name,latitude,longitude,ndvi,discharge,label\n\
             Kops,47,10,0.3,40,1\n\
             ,60.5,5.25,,,0\n"
        );
    }
}
