//! Multi-band georeferenced scenes

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::raster::{Band, PixelTransform};
use chrono::{DateTime, Utc};
use geo_types::{coord, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Satellite orbit direction for SAR scenes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitPass {
    Ascending,
    Descending,
}

/// Scene-level acquisition metadata.
///
/// Every field is optional because sources vary: optical scenes carry a
/// cloud percentage, SAR scenes carry polarisations and an orbit pass,
/// derived products often carry nothing but a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMeta {
    /// Acquisition timestamp
    pub acquired: Option<DateTime<Utc>>,
    /// Scene cloud cover percentage, 0-100
    pub cloud_cover: Option<f64>,
    /// Sensor / platform identifier (e.g. "L8", "S2")
    pub sensor: Option<String>,
    /// Transmitted/received polarisations for SAR scenes (e.g. "VV", "VH")
    pub polarisations: Vec<String>,
    /// Orbit direction for SAR scenes
    pub orbit: Option<OrbitPass>,
}

impl SceneMeta {
    pub fn acquired(timestamp: DateTime<Utc>) -> Self {
        Self {
            acquired: Some(timestamp),
            ..Default::default()
        }
    }
}

/// Grid geometry shared by all bands of a raster: dimensions, transform
/// and CRS. Collections use this to stay well-defined when empty.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub transform: PixelTransform,
    pub crs: Option<Crs>,
}

impl GridSpec {
    /// Bounding box (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.rows, self.cols)
    }
}

/// A multi-band raster scene.
///
/// An ordered set of named [`Band`]s sharing one grid geometry, plus the
/// georeferencing ([`PixelTransform`], optional [`Crs`]), an optional
/// no-data sentinel used on serialization, and [`SceneMeta`].
///
/// Invariant: all bands have identical dimensions and unique names; both
/// are enforced when bands are added. Rasters are treated as read-only by
/// the pipeline; every stage builds new values.
#[derive(Debug, Clone)]
pub struct Raster {
    bands: Vec<Band>,
    transform: PixelTransform,
    crs: Option<Crs>,
    nodata: Option<f64>,
    meta: SceneMeta,
}

impl Raster {
    /// Create an empty raster (no bands yet) with the given transform
    pub fn new(transform: PixelTransform) -> Self {
        Self {
            bands: Vec::new(),
            transform,
            crs: None,
            nodata: None,
            meta: SceneMeta::default(),
        }
    }

    /// Create a raster from bands, validating shapes and name uniqueness
    pub fn from_bands(bands: Vec<Band>, transform: PixelTransform) -> Result<Self> {
        let mut raster = Self::new(transform);
        for band in bands {
            raster.push_band(band)?;
        }
        Ok(raster)
    }

    /// Append a band; rejects shape mismatches and duplicate names
    pub fn push_band(&mut self, band: Band) -> Result<()> {
        if let Some(first) = self.bands.first() {
            let (er, ec) = first.shape();
            let (ar, ac) = band.shape();
            if (er, ec) != (ar, ac) {
                return Err(Error::SizeMismatch { er, ec, ar, ac });
            }
        }
        if self.bands.iter().any(|b| b.name() == band.name()) {
            return Err(Error::DuplicateBand(band.name().to_string()));
        }
        self.bands.push(band);
        Ok(())
    }

    /// Builder-style `push_band`
    pub fn with_band(mut self, band: Band) -> Result<Self> {
        self.push_band(band)?;
        Ok(self)
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn with_meta(mut self, meta: SceneMeta) -> Self {
        self.meta = meta;
        self
    }

    // Band access

    /// Look up a band by name; missing names fail fast with the list of
    /// available bands.
    pub fn band(&self, name: &str) -> Result<&Band> {
        self.bands
            .iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| Error::BandNotFound {
                band: name.to_string(),
                available: self.band_names().iter().map(|s| s.to_string()).collect(),
            })
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name() == name)
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name()).collect()
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Dimensions as (rows, cols); (0, 0) when the raster has no bands
    pub fn shape(&self) -> (usize, usize) {
        self.bands.first().map(|b| b.shape()).unwrap_or((0, 0))
    }

    pub fn rows(&self) -> usize {
        self.shape().0
    }

    pub fn cols(&self) -> usize {
        self.shape().1
    }

    // Derivation

    /// New raster holding only the named bands, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Raster> {
        let mut out = self.like_empty();
        for name in names {
            out.push_band(self.band(name)?.clone())?;
        }
        Ok(out)
    }

    /// Select and rename in one pass: `(source, target)` pairs.
    ///
    /// This is the band-schema reconciliation step used before merging
    /// scenes from different sensors into one collection.
    pub fn select_rename(&self, pairs: &[(&str, &str)]) -> Result<Raster> {
        let mut out = self.like_empty();
        for (source, target) in pairs {
            out.push_band(self.band(source)?.renamed(*target))?;
        }
        Ok(out)
    }

    /// Concatenate another raster's bands onto this one.
    ///
    /// Grids must match. Colliding band names get a numeric suffix
    /// (`ndvi`, `ndvi_1`, `ndvi_2`, ...) so seasonal stacks keep every
    /// layer addressable.
    pub fn stack(&self, other: &Raster) -> Result<Raster> {
        if !self.bands.is_empty() && !other.bands.is_empty() && self.shape() != other.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = other.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        let mut out = self.clone();
        for band in other.bands() {
            let mut candidate = band.name().to_string();
            let mut suffix = 1usize;
            while out.has_band(&candidate) {
                candidate = format!("{}_{}", band.name(), suffix);
                suffix += 1;
            }
            out.push_band(band.renamed(candidate))?;
        }
        Ok(out)
    }

    /// Empty raster carrying this raster's grid metadata (transform, CRS,
    /// no-data sentinel, scene metadata) but no bands.
    pub fn like_empty(&self) -> Raster {
        Raster {
            bands: Vec::new(),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
            meta: self.meta.clone(),
        }
    }

    /// Apply a fallible function to every band, keeping grid metadata
    pub fn map_bands(&self, f: impl Fn(&Band) -> Result<Band>) -> Result<Raster> {
        let mut out = self.like_empty();
        for band in &self.bands {
            out.push_band(f(band)?)?;
        }
        Ok(out)
    }

    // Metadata

    pub fn transform(&self) -> &PixelTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: PixelTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<Crs>) {
        self.crs = crs;
    }

    /// No-data sentinel used when the raster is serialized
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    pub fn meta(&self) -> &SceneMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut SceneMeta {
        &mut self.meta
    }

    pub fn set_meta(&mut self, meta: SceneMeta) {
        self.meta = meta;
    }

    pub fn grid(&self) -> GridSpec {
        let (rows, cols) = self.shape();
        GridSpec {
            rows,
            cols,
            transform: self.transform,
            crs: self.crs.clone(),
        }
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (rows, cols) = self.shape();
        self.transform.bounds(rows, cols)
    }

    /// Scene footprint as a polygon, for intersection tests
    pub fn extent_polygon(&self) -> Polygon<f64> {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }).to_polygon()
    }

    /// Bytes occupied by all band data, for cache accounting
    pub fn byte_size(&self) -> usize {
        self.bands.iter().map(|b| b.byte_size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn band(name: &str, rows: usize, cols: usize, value: f64) -> Band {
        Band::new(name, Array2::from_elem((rows, cols), value))
    }

    #[test]
    fn bands_must_share_shape() {
        let mut raster = Raster::new(PixelTransform::default());
        raster.push_band(band("green", 4, 4, 0.1)).unwrap();
        let err = raster.push_band(band("swir1", 4, 5, 0.2)).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut raster = Raster::new(PixelTransform::default());
        raster.push_band(band("nir", 2, 2, 0.5)).unwrap();
        let err = raster.push_band(band("nir", 2, 2, 0.6)).unwrap_err();
        assert!(matches!(err, Error::DuplicateBand(_)));
    }

    #[test]
    fn missing_band_lists_available() {
        let raster = Raster::from_bands(
            vec![band("red", 2, 2, 0.2), band("nir", 2, 2, 0.5)],
            PixelTransform::default(),
        )
        .unwrap();
        match raster.band("swir1") {
            Err(Error::BandNotFound { band, available }) => {
                assert_eq!(band, "swir1");
                assert_eq!(available, vec!["red", "nir"]);
            }
            other => panic!("expected BandNotFound, got {:?}", other),
        }
    }

    #[test]
    fn select_rename_reconciles_schema() {
        let landsat5 = Raster::from_bands(
            vec![band("SR_B2", 3, 3, 0.1), band("SR_B5", 3, 3, 0.4)],
            PixelTransform::default(),
        )
        .unwrap();
        let renamed = landsat5
            .select_rename(&[("SR_B2", "green"), ("SR_B5", "swir1")])
            .unwrap();
        assert_eq!(renamed.band_names(), vec!["green", "swir1"]);
    }

    #[test]
    fn stack_suffixes_collisions() {
        let spring = Raster::from_bands(vec![band("ndvi", 2, 2, 0.3)], PixelTransform::default())
            .unwrap();
        let summer = Raster::from_bands(vec![band("ndvi", 2, 2, 0.7)], PixelTransform::default())
            .unwrap();
        let stacked = spring.stack(&summer).unwrap();
        assert_eq!(stacked.band_names(), vec!["ndvi", "ndvi_1"]);
        assert_eq!(stacked.band("ndvi_1").unwrap().get(0, 0).unwrap(), 0.7);
    }

    #[test]
    fn grid_bounds() {
        let raster = Raster::from_bands(
            vec![band("elevation", 10, 20, 100.0)],
            PixelTransform::new(0.0, 10.0, 1.0, -1.0),
        )
        .unwrap();
        assert_eq!(raster.bounds(), (0.0, 0.0, 20.0, 10.0));
    }
}
