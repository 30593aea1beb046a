//! Single-band GeoTIFF decoding and the statistics reduced from it.
//!
//! The process API answers with a small float GeoTIFF. Pixels equal to the
//! GDAL nodata value, and non-finite pixels, never enter a statistic.

use crate::error::{Result, SiteError};
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

/// TIFF tag where GDAL stores the nodata value as ASCII.
const GDAL_NODATA_TAG: u16 = 42113;

/// One decoded raster band in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
    pub nodata: Option<f64>,
}

impl Band {
    pub fn new(width: usize, height: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != width * height {
            return Err(SiteError::Raster(format!(
                "expected {} pixels for {}x{}, got {}",
                width * height,
                width,
                height,
                data.len()
            )));
        }
        Ok(Band {
            width,
            height,
            data,
            nodata: None,
        })
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }

    /// Band values with nodata pixels replaced by NaN.
    pub fn masked(&self) -> Vec<f64> {
        match self.nodata {
            Some(nodata) => self
                .data
                .iter()
                .map(|&v| if v == nodata { f64::NAN } else { v })
                .collect(),
            None => self.data.clone(),
        }
    }
}

/// Decode the first band of an in-memory TIFF.
pub fn decode_band(bytes: &[u8]) -> Result<Band> {
    let mut decoder = Decoder::new(Cursor::new(bytes))
        .map_err(|e| SiteError::Raster(format!("TIFF decode error: {}", e)))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| SiteError::Raster(format!("Cannot read dimensions: {}", e)))?;
    let nodata = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA_TAG))
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok());

    let data: Vec<f64> = match decoder
        .read_image()
        .map_err(|e| SiteError::Raster(format!("Cannot read image data: {}", e)))?
    {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => return Err(SiteError::Raster("Unsupported TIFF pixel format".to_string())),
    };

    // multi-sample images decode interleaved; keep the first sample
    let pixels = width as usize * height as usize;
    let data = if data.len() > pixels && pixels > 0 && data.len() % pixels == 0 {
        let samples = data.len() / pixels;
        data.into_iter().step_by(samples).collect()
    } else {
        data
    };

    let mut band = Band::new(width as usize, height as usize, data)?;
    band.nodata = nodata;
    Ok(band)
}

/// Mean of the finite values, or `None` when there are none.
pub fn nan_mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Spatial mean of a band, ignoring nodata.
pub fn band_mean(band: &Band) -> Option<f64> {
    nan_mean(band.masked())
}

/// Derivative along one axis: central differences inside, one-sided at the
/// two ends.
fn axis_gradient(len: usize, spacing: f64, value: impl Fn(usize) -> f64, i: usize) -> f64 {
    if i == 0 {
        (value(1) - value(0)) / spacing
    } else if i == len - 1 {
        (value(len - 1) - value(len - 2)) / spacing
    } else {
        (value(i + 1) - value(i - 1)) / (2.0 * spacing)
    }
}

/// Per-pixel terrain slope in degrees from a DEM band with square pixels of
/// `pixel_size` meters. Needs at least 2x2 pixels.
pub fn slope_degrees(dem: &Band, pixel_size: f64) -> Option<Vec<f64>> {
    if dem.width < 2 || dem.height < 2 {
        return None;
    }
    let masked = Band {
        data: dem.masked(),
        nodata: None,
        ..dem.clone()
    };
    let mut slopes = Vec::with_capacity(dem.width * dem.height);
    for row in 0..dem.height {
        for col in 0..dem.width {
            let dy = axis_gradient(dem.height, pixel_size, |r| masked.at(r, col), row);
            let dx = axis_gradient(dem.width, pixel_size, |c| masked.at(row, c), col);
            slopes.push((dx * dx + dy * dy).sqrt().atan().to_degrees());
        }
    }
    Some(slopes)
}

/// Mean terrain slope in degrees over the finite cells of a DEM band.
pub fn mean_slope_degrees(dem: &Band, pixel_size: f64) -> Option<f64> {
    slope_degrees(dem, pixel_size).and_then(nan_mean)
}
