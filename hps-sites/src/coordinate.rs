use serde::{Deserialize, Serialize};
use std::fmt;

/// Six decimal places are kept for every join and lookup.
const SCALE: f64 = 1_000_000.0;

/// A coordinate pair rounded to six decimals, held as integer micro-degrees
/// so equality and hashing are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoordKey {
    lat_micro: i64,
    lon_micro: i64,
}

impl CoordKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        CoordKey {
            lat_micro: (latitude * SCALE).round() as i64,
            lon_micro: (longitude * SCALE).round() as i64,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.lat_micro as f64 / SCALE
    }

    pub fn longitude(&self) -> f64 {
        self.lon_micro as f64 / SCALE
    }
}

impl fmt::Display for CoordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude(), self.longitude())
    }
}
