//! River segments: loading, background sampling and nearest-river lookup.
//!
//! Rivers are read from a CSV export of the HydroRIVERS layer with a WKT
//! `geometry` column (EPSG:4326, `x` = longitude) and the long-term mean
//! discharge `DIS_AV_CMS` in m³/s.

use crate::{
    error::{Result, SiteError},
    location::LocationRecord,
};
use csv::ReaderBuilder;
use geo::{Closest, Coord, Geometry, HaversineClosestPoint, HaversineDistance, MultiLineString, Point};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::Read,
    path::Path,
};
use wkt::TryFromWkt;

/// Meters per degree of arc on the mean Earth radius used by `geo`.
const METERS_PER_DEGREE: f64 = 111_195.0;

#[derive(Debug, Deserialize)]
struct RiverRow {
    geometry: String,
    #[serde(rename = "DIS_AV_CMS")]
    discharge: Option<f64>,
}

/// A river reach with its long-term average discharge.
#[derive(Debug, Clone, PartialEq)]
pub struct RiverSegment {
    pub geometry: MultiLineString<f64>,
    /// Mean discharge in m³/s, when known.
    pub discharge: Option<f64>,
}

impl RiverSegment {
    /// First vertex of the first line, used as the segment's sample point.
    pub fn first_coordinate(&self) -> Option<Coord<f64>> {
        self.geometry.0.first().and_then(|line| line.0.first()).copied()
    }

    fn vertices(&self) -> impl Iterator<Item = &Coord<f64>> {
        self.geometry.0.iter().flat_map(|line| line.0.iter())
    }

    /// `(start, end)` of every straight piece; a single-vertex line is a
    /// piece of zero length.
    fn pieces(&self) -> impl Iterator<Item = (Coord<f64>, Coord<f64>)> + '_ {
        self.geometry.0.iter().flat_map(|line| {
            let single = (line.0.len() == 1).then(|| (line.0[0], line.0[0]));
            single
                .into_iter()
                .chain(line.0.windows(2).map(|pair| (pair[0], pair[1])))
        })
    }

    /// Great-circle distance in meters from `point` to the closest point on
    /// the river's lines.
    pub fn distance_m(&self, point: &Point<f64>) -> f64 {
        match self.geometry.haversine_closest_point(point) {
            Closest::Intersection(closest) | Closest::SinglePoint(closest) => {
                closest.haversine_distance(point)
            }
            Closest::Indeterminate => self
                .vertices()
                .map(|c| Point::from(*c).haversine_distance(point))
                .fold(f64::INFINITY, f64::min),
        }
    }
}

fn parse_geometry(wkt: &str) -> std::result::Result<MultiLineString<f64>, String> {
    let geometry = Geometry::<f64>::try_from_wkt_str(wkt).map_err(|e| e.to_string())?;
    let lines = match geometry {
        Geometry::LineString(line) => MultiLineString::new(vec![line]),
        Geometry::MultiLineString(lines) => lines,
        _ => return Err("expected LINESTRING or MULTILINESTRING".to_string()),
    };
    if lines.0.iter().all(|line| line.0.is_empty()) {
        return Err("geometry has no coordinates".to_string());
    }
    Ok(lines)
}

/// Parse a river CSV (`geometry`, `DIS_AV_CMS`).
pub fn parse_river_csv<R: Read>(reader: R) -> Result<Vec<RiverSegment>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut rivers = Vec::new();
    for (i, row) in rdr.deserialize().enumerate() {
        let row: RiverRow = row?;
        // header is line 1
        let geometry = parse_geometry(&row.geometry)
            .map_err(|e| SiteError::Geometry(format!("line {}: {}", i + 2, e)))?;
        rivers.push(RiverSegment {
            geometry,
            discharge: row.discharge.filter(|d| d.is_finite()),
        });
    }
    Ok(rivers)
}

/// Read a river CSV file.
pub fn load_rivers(path: &Path) -> Result<Vec<RiverSegment>> {
    let file = File::open(path)?;
    let rivers = parse_river_csv(file)?;
    info!("Loaded {} river segments from {}", rivers.len(), path.display());
    Ok(rivers)
}

/// Uniform lat/lon bucket grid over item indices.
#[derive(Debug, Clone)]
struct SpatialGrid {
    cell_deg: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    fn new(cell_deg: f64) -> Self {
        SpatialGrid {
            cell_deg,
            cells: HashMap::new(),
        }
    }

    fn cell_of(&self, latitude: f64, longitude: f64) -> (i64, i64) {
        (
            (latitude / self.cell_deg).floor() as i64,
            (longitude / self.cell_deg).floor() as i64,
        )
    }

    fn insert(&mut self, latitude: f64, longitude: f64, index: usize) {
        let cell = self.cell_of(latitude, longitude);
        self.insert_cell(cell, index);
    }

    fn insert_cell(&mut self, cell: (i64, i64), index: usize) {
        let bucket = self.cells.entry(cell).or_default();
        if bucket.last() != Some(&index) {
            bucket.push(index);
        }
    }

    /// Register `index` in every cell the box between two corners touches.
    fn insert_box(&mut self, a: Coord<f64>, b: Coord<f64>, index: usize) {
        let (row_a, col_a) = self.cell_of(a.y, a.x);
        let (row_b, col_b) = self.cell_of(b.y, b.x);
        for r in row_a.min(row_b)..=row_a.max(row_b) {
            for c in col_a.min(col_b)..=col_a.max(col_b) {
                self.insert_cell((r, c), index);
            }
        }
    }

    /// Items in every cell touched by a lat/lon box, without duplicates.
    fn in_box(&self, min: Coord<f64>, max: Coord<f64>) -> HashSet<usize> {
        let (row_min, col_min) = self.cell_of(min.y, min.x);
        let (row_max, col_max) = self.cell_of(max.y, max.x);
        let mut found = HashSet::new();
        for r in row_min..=row_max {
            for c in col_min..=col_max {
                if let Some(bucket) = self.cells.get(&(r, c)) {
                    found.extend(bucket.iter().copied());
                }
            }
        }
        found
    }

    /// Items in cells at Chebyshev distance exactly `ring` from a point.
    fn ring(&self, latitude: f64, longitude: f64, ring: i64) -> Vec<usize> {
        let (row, col) = self.cell_of(latitude, longitude);
        let mut found = Vec::new();
        for r in row - ring..=row + ring {
            for c in col - ring..=col + ring {
                if (r - row).abs() != ring && (c - col).abs() != ring {
                    continue;
                }
                if let Some(bucket) = self.cells.get(&(r, c)) {
                    found.extend_from_slice(bucket);
                }
            }
        }
        found
    }
}

/// Draws nameless background points from rivers that are large enough and
/// far enough from every plant.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSampler {
    pub sample_size: usize,
    pub seed: u64,
    /// Rivers with any vertex closer than this to a plant are excluded.
    pub exclusion_radius_m: f64,
    /// Minimum `DIS_AV_CMS` for a river to be eligible.
    pub min_discharge: f64,
}

impl Default for BackgroundSampler {
    fn default() -> Self {
        BackgroundSampler {
            sample_size: 9000,
            seed: 42,
            exclusion_radius_m: 30_000.0,
            min_discharge: 2.0,
        }
    }
}

impl BackgroundSampler {
    const PLANT_CELL_DEGREES: f64 = 0.5;

    /// Rivers eligible for sampling, in input order.
    pub fn candidates<'a>(
        &self,
        rivers: &'a [RiverSegment],
        plants: &[LocationRecord],
    ) -> Vec<&'a RiverSegment> {
        let mut grid = SpatialGrid::new(Self::PLANT_CELL_DEGREES);
        let points: Vec<Point<f64>> = plants
            .iter()
            .map(|p| Point::new(p.longitude, p.latitude))
            .collect();
        for (i, plant) in plants.iter().enumerate() {
            grid.insert(plant.latitude, plant.longitude, i);
        }

        let radius_deg = self.exclusion_radius_m / METERS_PER_DEGREE;

        rivers
            .iter()
            .filter(|river| river.discharge.is_some_and(|d| d >= self.min_discharge))
            .filter(|river| {
                // plants whose cell lies within the radius of any piece's box
                let mut nearby = HashSet::new();
                for (a, b) in river.pieces() {
                    let far_lat = (a.y.abs().max(b.y.abs()) + radius_deg).min(89.0);
                    let lon_pad = radius_deg / far_lat.to_radians().cos();
                    let min = Coord {
                        x: a.x.min(b.x) - lon_pad,
                        y: a.y.min(b.y) - radius_deg,
                    };
                    let max = Coord {
                        x: a.x.max(b.x) + lon_pad,
                        y: a.y.max(b.y) + radius_deg,
                    };
                    nearby.extend(grid.in_box(min, max));
                }
                !nearby
                    .into_iter()
                    .any(|i| river.distance_m(&points[i]) < self.exclusion_radius_m)
            })
            .collect()
    }

    /// Sample background locations. The same inputs and seed always give
    /// the same points in the same order.
    pub fn sample(&self, rivers: &[RiverSegment], plants: &[LocationRecord]) -> Vec<LocationRecord> {
        let candidates = self.candidates(rivers, plants);
        info!(
            "Found {} river segments outside exclusion zone",
            candidates.len()
        );
        let amount = self.sample_size.min(candidates.len());
        if amount < self.sample_size {
            warn!(
                "Only {} eligible river segments, sampling all of them instead of {}",
                candidates.len(),
                self.sample_size
            );
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        rand::seq::index::sample(&mut rng, candidates.len(), amount)
            .into_iter()
            .filter_map(|i| candidates[i].first_coordinate())
            .map(|c| LocationRecord::background(c.y, c.x))
            .collect()
    }
}

/// Nearest-river lookup over a grid of segment piece bounding boxes.
#[derive(Debug, Clone)]
pub struct RiverIndex {
    segments: Vec<RiverSegment>,
    grid: SpatialGrid,
    max_ring: i64,
}

impl RiverIndex {
    const CELL_DEGREES: f64 = 0.1;
    /// Search stops this many degrees away from the query point.
    const MAX_SEARCH_DEGREES: f64 = 5.0;

    pub fn new(segments: Vec<RiverSegment>) -> Self {
        let mut grid = SpatialGrid::new(Self::CELL_DEGREES);
        for (i, segment) in segments.iter().enumerate() {
            for (a, b) in segment.pieces() {
                grid.insert_box(a, b, i);
            }
        }
        RiverIndex {
            segments,
            grid,
            max_ring: (Self::MAX_SEARCH_DEGREES / Self::CELL_DEGREES).ceil() as i64,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    // The closest point of anything first met in ring r lies at least r - 1
    // whole cells away along one axis.
    fn ring_lower_bound_m(&self, latitude: f64, ring: i64) -> f64 {
        let reach = (ring - 1).max(0) as f64 * Self::CELL_DEGREES;
        let far_lat = (latitude.abs() + (ring + 1) as f64 * Self::CELL_DEGREES).min(89.9);
        reach * METERS_PER_DEGREE * far_lat.to_radians().cos()
    }

    /// Closest segment to a point and its distance in meters.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<(&RiverSegment, f64)> {
        let target = Point::new(longitude, latitude);
        let mut best: Option<(usize, f64)> = None;
        let mut visited = HashSet::new();
        for ring in 0..=self.max_ring {
            if let Some((_, distance)) = best {
                if self.ring_lower_bound_m(latitude, ring) > distance {
                    break;
                }
            }
            for i in self.grid.ring(latitude, longitude, ring) {
                if !visited.insert(i) {
                    continue;
                }
                let distance = self.segments[i].distance_m(&target);
                if best.map_or(true, |(_, b)| distance < b) {
                    best = Some((i, distance));
                }
            }
        }
        best.map(|(i, distance)| (&self.segments[i], distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIVERS: &str = "\
HYRIV_ID,geometry,DIS_AV_CMS
1,\"LINESTRING (10.0 47.05, 10.01 47.06)\",35.2
2,\"MULTILINESTRING ((12.0 50.0, 12.01 50.01), (12.02 50.02, 12.03 50.03))\",8.0
3,\"LINESTRING (20.0 60.0, 20.01 60.01)\",1.5
4,\"LINESTRING (25.0 62.0, 25.01 62.01)\",
5,\"LINESTRING (5.0 45.0, 5.01 45.01)\",120.0
";

    fn rivers() -> Vec<RiverSegment> {
        parse_river_csv(RIVERS.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_river_csv() {
        let rivers = rivers();
        assert_eq!(rivers.len(), 5);
        assert_eq!(rivers[1].geometry.0.len(), 2);
        assert_eq!(rivers[0].discharge, Some(35.2));
        assert_eq!(rivers[3].discharge, None);
        let first = rivers[1].first_coordinate().unwrap();
        assert_eq!((first.x, first.y), (12.0, 50.0));
    }

    #[test]
    fn test_parse_rejects_points() {
        let csv_data = "geometry,DIS_AV_CMS\n\"POINT (10.0 47.0)\",3.0\n";
        let err = parse_river_csv(csv_data.as_bytes()).unwrap_err();
        assert!(matches!(err, SiteError::Geometry(_)));
    }

    #[test]
    fn test_candidates_exclude_small_and_nearby_rivers() {
        let rivers = rivers();
        // ~5.6 km from river 1
        let plants = vec![LocationRecord::plant("Near", 47.0, 10.0)];
        let sampler = BackgroundSampler::default();
        let candidates = sampler.candidates(&rivers, &plants);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].discharge, Some(8.0));
        assert_eq!(candidates[1].discharge, Some(120.0));
    }

    #[test]
    fn test_exclusion_radius_is_respected() {
        let rivers = rivers();
        let plants = vec![LocationRecord::plant("Far", 46.0, 10.0)];
        let sampler = BackgroundSampler::default();
        // river 1 sits ~116 km north of the plant
        assert_eq!(sampler.candidates(&rivers, &plants).len(), 3);
    }

    #[test]
    fn test_sample_is_deterministic() {
        let rivers = rivers();
        let plants = vec![LocationRecord::plant("Nowhere", 0.0, 0.0)];
        let sampler = BackgroundSampler {
            sample_size: 2,
            ..BackgroundSampler::default()
        };
        let first = sampler.sample(&rivers, &plants);
        let second = sampler.sample(&rivers, &plants);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert!(first.iter().all(|l| l.name.is_none()));
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn test_sample_clamps_to_available_candidates() {
        let rivers = rivers();
        let sampler = BackgroundSampler::default();
        let sample = sampler.sample(&rivers, &[]);
        assert_eq!(sample.len(), 3);
    }

    #[test]
    fn test_nearest_river() {
        let index = RiverIndex::new(rivers());
        let (segment, distance) = index.nearest(47.04, 10.0).unwrap();
        assert_eq!(segment.discharge, Some(35.2));
        assert!(distance < 1_200.0, "distance was {}", distance);

        let (segment, _) = index.nearest(50.025, 12.025).unwrap();
        assert_eq!(segment.discharge, Some(8.0));
    }

    #[test]
    fn test_distance_is_measured_to_the_line() {
        let csv_data = "geometry,DIS_AV_CMS\n\"LINESTRING (10.0 47.0, 10.0 47.2)\",100.0\n";
        let river = &parse_river_csv(csv_data.as_bytes()).unwrap()[0];
        // midway between the two vertices, ~11 km from either
        assert!(river.distance_m(&Point::new(10.0, 47.1)) < 1.0);
        let beside = river.distance_m(&Point::new(10.01, 47.1));
        assert!((beside - 758.0).abs() < 10.0, "distance was {}", beside);
    }

    #[test]
    fn test_nearest_river_on_a_long_segment() {
        let csv_data = "\
geometry,DIS_AV_CMS
\"LINESTRING (10.0 47.0, 10.0 47.2)\",100.0
\"LINESTRING (10.05 47.1, 10.06 47.1)\",5.0
";
        let index = RiverIndex::new(parse_river_csv(csv_data.as_bytes()).unwrap());
        let (segment, distance) = index.nearest(47.1, 10.0).unwrap();
        assert_eq!(segment.discharge, Some(100.0));
        assert!(distance < 1.0, "distance was {}", distance);
    }

    #[test]
    fn test_river_crossing_exclusion_zone_without_nearby_vertices() {
        // vertices ~53 km either side of the plant, the line runs through it
        let csv_data = "geometry,DIS_AV_CMS\n\"LINESTRING (9.3 47.0, 10.7 47.0)\",50.0\n";
        let rivers = parse_river_csv(csv_data.as_bytes()).unwrap();
        let plants = vec![LocationRecord::plant("Crossed", 47.0, 10.0)];
        let sampler = BackgroundSampler::default();
        assert!(sampler.candidates(&rivers, &plants).is_empty());

        let elsewhere = vec![LocationRecord::plant("Away", 48.0, 10.0)];
        assert_eq!(sampler.candidates(&rivers, &elsewhere).len(), 1);
    }

    #[test]
    fn test_nearest_river_out_of_range() {
        let index = RiverIndex::new(rivers());
        assert!(index.nearest(-40.0, 170.0).is_none());
    }
}
