//! Reading and writing indicator, location and merged CSV tables.
//!
//! Indicator tables have the header `name,latitude,longitude,<column>`.
//! A missing value is written as an empty field. On read, empty fields,
//! `nan`, `null`, `none` (any case) and non-finite numbers are all
//! treated as missing.
//!
//! Every write goes to a temporary file next to the target which is then
//! renamed over it, so readers never see a half-written table.

use crate::error::{DataError, Result};
use hps_sites::{indicator::IndicatorRecord, location::LocationRecord};
use log::debug;
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
};
use tempfile::NamedTempFile;

/// Parse a value field; `None` for anything that is not a finite number.
pub fn parse_value(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    match field.to_ascii_lowercase().as_str() {
        "nan" | "null" | "none" => None,
        _ => field.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn parse_name(field: &str) -> Option<String> {
    let field = field.trim();
    match field.to_ascii_lowercase().as_str() {
        "" | "nan" | "none" | "null" => None,
        _ => Some(field.to_string()),
    }
}

fn parse_coordinate(field: &str, source_name: &str) -> Result<f64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DataError::InvalidCoordinate {
            value: field.to_string(),
            source_name: source_name.to_string(),
        })
}

fn column_index(headers: &csv::StringRecord, column: &str, source_name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| DataError::MissingColumn {
            column: column.to_string(),
            source_name: source_name.to_string(),
        })
}

/// Read an indicator table, taking values from `column`. The `name` column
/// is optional; `latitude` and `longitude` are required.
pub fn read_indicator_table<R: Read>(
    reader: R,
    column: &str,
    source_name: &str,
) -> Result<Vec<IndicatorRecord>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let name_idx = headers.iter().position(|h| h.trim() == "name");
    let lat_idx = column_index(&headers, "latitude", source_name)?;
    let lon_idx = column_index(&headers, "longitude", source_name)?;
    let value_idx = column_index(&headers, column, source_name)?;

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let field = |idx: usize| row.get(idx).unwrap_or("");
        records.push(IndicatorRecord {
            name: name_idx.map(field).and_then(parse_name),
            latitude: parse_coordinate(field(lat_idx), source_name)?,
            longitude: parse_coordinate(field(lon_idx), source_name)?,
            value: parse_value(field(value_idx)),
        });
    }
    Ok(records)
}

/// Load an indicator table from disk.
pub fn load_indicator_table(path: &Path, column: &str) -> Result<Vec<IndicatorRecord>> {
    let file = File::open(path)?;
    let records = read_indicator_table(file, column, &path.display().to_string())?;
    debug!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// Write an indicator table with the header `name,latitude,longitude,<column>`.
pub fn write_indicator_table<'a, W, I>(writer: W, column: &str, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a IndicatorRecord>,
{
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["name", "latitude", "longitude", column])?;
    for record in records {
        wtr.write_record([
            record.name.clone().unwrap_or_default(),
            record.latitude.to_string(),
            record.longitude.to_string(),
            format_value(record.value),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Empty string for a missing value.
pub fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write `path` through a temporary file in the same directory, creating
/// parent directories as needed.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| DataError::Persist {
        path: path.display().to_string(),
        reason: e.error.to_string(),
    })?;
    Ok(())
}

/// Save an indicator table atomically.
pub fn save_indicator_table(path: &Path, column: &str, records: &[IndicatorRecord]) -> Result<()> {
    write_atomically(path, |file| write_indicator_table(file, column, records))?;
    debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

/// Save a location set as `name,latitude,longitude`.
pub fn save_locations(path: &Path, locations: &[LocationRecord]) -> Result<()> {
    write_atomically(path, |file| {
        let mut wtr = csv::Writer::from_writer(file);
        for location in locations {
            wtr.serialize(location)?;
        }
        wtr.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("3.25"), Some(3.25));
        assert_eq!(parse_value(" -0.5 "), Some(-0.5));
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("nan"), None);
        assert_eq!(parse_value("null"), None);
        assert_eq!(parse_value("None"), None);
        assert_eq!(parse_value("inf"), None);
        assert_eq!(parse_value("abc"), None);
    }

    #[test]
    fn test_read_indicator_table() {
        let data = "\
name,latitude,longitude,ndvi
Kaprun,47.213456,12.721235,0.41
,60.5,5.25,
Kops,47.0,10.0,NaN
";
        let records = read_indicator_table(data.as_bytes(), "ndvi", "test").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name.as_deref(), Some("Kaprun"));
        assert_eq!(records[0].value, Some(0.41));
        assert_eq!(records[1].name, None);
        assert_eq!(records[1].latitude, 60.5);
        assert_eq!(records[1].value, None);
        assert_eq!(records[2].value, None);
    }

    #[test]
    fn test_read_without_name_column() {
        let data = "latitude,longitude,discharge\n46.0,8.0,12.5\n";
        let records = read_indicator_table(data.as_bytes(), "discharge", "test").unwrap();
        assert_eq!(records[0].name, None);
        assert_eq!(records[0].value, Some(12.5));
    }

    #[test]
    fn test_missing_value_column() {
        let data = "name,latitude,longitude,ndwi\nA,1.0,2.0,0.1\n";
        let err = read_indicator_table(data.as_bytes(), "ndvi", "test").unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { ref column, .. } if column == "ndvi"));
    }

    #[test]
    fn test_invalid_coordinate() {
        let data = "name,latitude,longitude,ndvi\nA,north,2.0,0.1\n";
        let err = read_indicator_table(data.as_bytes(), "ndvi", "test").unwrap_err();
        assert!(matches!(err, DataError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_save_and_load_indicator_table() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("hydropower_ndvi.csv");
        let records = vec![
            IndicatorRecord {
                name: Some("Kops".to_string()),
                latitude: 47.0,
                longitude: 10.0,
                value: Some(0.3),
            },
            IndicatorRecord {
                name: None,
                latitude: 60.0,
                longitude: 5.0,
                value: None,
            },
        ];
        save_indicator_table(&path, "ndvi", &records).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "name,latitude,longitude,ndvi\nKops,47,10,0.3\n,60,5,\n");
        assert_eq!(load_indicator_table(&path, "ndvi").unwrap(), records);
    }

    #[test]
    fn test_save_locations() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("locations.csv");
        let locations = vec![
            LocationRecord::plant("Kops", 47.0, 10.0),
            LocationRecord::background(60.5, 5.25),
        ];
        save_locations(&path, &locations).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "name,latitude,longitude\nKops,47.0,10.0\n,60.5,5.25\n");
    }
}
