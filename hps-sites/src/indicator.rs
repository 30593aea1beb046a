use crate::coordinate::CoordKey;
use crate::error::SiteError;
use crate::location::LocationRecord;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The scalar measurements collected for every location.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Ndvi,
    Ndwi,
    Ndbi,
    Precipitation,
    Discharge,
    Slope,
}

impl Indicator {
    pub const ALL: [Indicator; 6] = [
        Indicator::Ndvi,
        Indicator::Ndwi,
        Indicator::Ndbi,
        Indicator::Precipitation,
        Indicator::Discharge,
        Indicator::Slope,
    ];

    /// Column header used in result, checkpoint and merged tables.
    pub fn column(&self) -> &'static str {
        match self {
            Indicator::Ndvi => "ndvi",
            Indicator::Ndwi => "ndwi",
            Indicator::Ndbi => "ndbi",
            Indicator::Precipitation => "precipitation",
            Indicator::Discharge => "discharge",
            Indicator::Slope => "slope_degrees",
        }
    }

    /// File name of the per-indicator result table.
    pub fn result_file_name(&self) -> &'static str {
        match self {
            Indicator::Ndvi => "hydropower_ndvi.csv",
            Indicator::Ndwi => "hydropower_ndwi.csv",
            Indicator::Ndbi => "hydropower_ndbi.csv",
            Indicator::Precipitation => "hydropower_precipitation.csv",
            Indicator::Discharge => "average_discharge.csv",
            Indicator::Slope => "hydropower_slopes.csv",
        }
    }

    /// File name of the resumable checkpoint table.
    pub fn checkpoint_file_name(&self) -> String {
        format!("{}_intermediate.csv", self.column())
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Indicator::Slope => "slope",
            other => other.column(),
        };
        f.write_str(name)
    }
}

impl FromStr for Indicator {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ndvi" => Ok(Indicator::Ndvi),
            "ndwi" => Ok(Indicator::Ndwi),
            "ndbi" => Ok(Indicator::Ndbi),
            "precipitation" | "precip" => Ok(Indicator::Precipitation),
            "discharge" => Ok(Indicator::Discharge),
            "slope" | "slope_degrees" => Ok(Indicator::Slope),
            _ => Err(SiteError::UnknownIndicator(s.to_string())),
        }
    }
}

/// One row of a per-indicator table. `value` is `None` when the fetch
/// failed or no valid samples existed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub value: Option<f64>,
}

impl IndicatorRecord {
    pub fn from_location(location: &LocationRecord, value: Option<f64>) -> Self {
        IndicatorRecord {
            name: location.name.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            value,
        }
    }

    pub fn key(&self) -> CoordKey {
        CoordKey::new(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_from_str() {
        assert_eq!("NDVI".parse::<Indicator>().unwrap(), Indicator::Ndvi);
        assert_eq!("slope_degrees".parse::<Indicator>().unwrap(), Indicator::Slope);
        assert_eq!(" precipitation ".parse::<Indicator>().unwrap(), Indicator::Precipitation);
        assert!("evi".parse::<Indicator>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for indicator in Indicator::ALL {
            assert_eq!(indicator.to_string().parse::<Indicator>().unwrap(), indicator);
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(Indicator::Slope.result_file_name(), "hydropower_slopes.csv");
        assert_eq!(Indicator::Discharge.result_file_name(), "average_discharge.csv");
        assert_eq!(
            Indicator::Precipitation.checkpoint_file_name(),
            "precipitation_intermediate.csv"
        );
    }

    #[test]
    fn test_record_from_location() {
        let location = LocationRecord::plant("Kaprun", 47.2134561, 12.7212349);
        let record = IndicatorRecord::from_location(&location, Some(0.41));
        assert_eq!(record.name.as_deref(), Some("Kaprun"));
        assert_eq!(record.value, Some(0.41));
        assert_eq!(record.key(), CoordKey::new(47.213456, 12.721235));
    }
}
