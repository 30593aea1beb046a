use crate::{
    fetcher::{Credentials, FetchFailure, FetchOutcome, IndicatorFetcher},
    indicator::Indicator,
    location::LocationRecord,
    river::RiverIndex,
};
use log::debug;

/// Average discharge of the river nearest to each location.
#[derive(Debug, Clone)]
pub struct DischargeLookup {
    index: RiverIndex,
}

impl DischargeLookup {
    pub fn new(index: RiverIndex) -> Self {
        DischargeLookup { index }
    }
}

impl IndicatorFetcher for DischargeLookup {
    fn indicator(&self) -> Indicator {
        Indicator::Discharge
    }

    async fn fetch(&self, location: &LocationRecord, _credentials: &Credentials) -> FetchOutcome {
        let (segment, distance) = self
            .index
            .nearest(location.latitude, location.longitude)
            .ok_or(FetchFailure::NoValidData)?;
        debug!(
            "Nearest river to {} is {:.0} m away",
            location.display_name(),
            distance
        );
        segment.discharge.ok_or(FetchFailure::NoValidData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::river::parse_river_csv;

    fn lookup() -> DischargeLookup {
        let csv_data = "\
geometry,DIS_AV_CMS
\"LINESTRING (8.0 46.0, 8.01 46.01)\",55.5
\"LINESTRING (8.3 46.3, 8.31 46.31)\",
";
        DischargeLookup::new(RiverIndex::new(parse_river_csv(csv_data.as_bytes()).unwrap()))
    }

    #[tokio::test]
    async fn test_fetch_nearest_discharge() {
        let lookup = lookup();
        let location = LocationRecord::plant("Test", 46.002, 8.001);
        let value = lookup.fetch(&location, &Credentials::anonymous()).await;
        assert_eq!(value, Ok(55.5));
    }

    #[tokio::test]
    async fn test_fetch_river_without_discharge() {
        let lookup = lookup();
        let location = LocationRecord::background(46.305, 8.305);
        let value = lookup.fetch(&location, &Credentials::anonymous()).await;
        assert_eq!(value, Err(FetchFailure::NoValidData));
    }

    #[tokio::test]
    async fn test_fetch_far_from_any_river() {
        let lookup = lookup();
        let location = LocationRecord::background(70.0, 30.0);
        let value = lookup.fetch(&location, &Credentials::anonymous()).await;
        assert_eq!(value, Err(FetchFailure::NoValidData));
    }
}
