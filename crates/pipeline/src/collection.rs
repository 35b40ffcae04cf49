//! Scene collections and filtering

use crate::cancel::CancelToken;
use chrono::{DateTime, Utc};
use geo::Intersects;
use geo_types::Geometry;
use log::warn;
use marisma_core::{Error, GridSpec, OrbitPass, Raster, Result};

/// An ordered sequence of [`Raster`] scenes sharing one band schema and
/// grid geometry.
///
/// The schema and grid are recorded at construction and survive
/// filtering, so an empty filtered collection still knows what a reduced
/// output must look like. Scenes are stored with bands in schema order.
///
/// Filtering and merging never mutate the source collection.
#[derive(Debug, Clone)]
pub struct RasterCollection {
    scenes: Vec<Raster>,
    schema: Vec<String>,
    grid: GridSpec,
}

impl RasterCollection {
    /// Build a collection from scenes.
    ///
    /// Every scene must carry the same set of band names (order may
    /// differ; scenes are normalized to the first scene's order) and the
    /// same grid geometry. Differing band sets are an input error;
    /// reconcile with [`Raster::select_rename`] first.
    pub fn from_scenes(scenes: Vec<Raster>) -> Result<Self> {
        let first = scenes.first().ok_or_else(|| {
            Error::InvalidParameter {
                name: "scenes",
                value: "[]".to_string(),
                reason: "cannot derive a schema from zero scenes; use RasterCollection::empty"
                    .to_string(),
            }
        })?;

        let schema: Vec<String> = first.band_names().iter().map(|s| s.to_string()).collect();
        let grid = first.grid();

        let mut normalized = Vec::with_capacity(scenes.len());
        for scene in &scenes {
            check_schema(&schema, scene)?;
            check_grid(&grid, scene)?;
            let names: Vec<&str> = schema.iter().map(|s| s.as_str()).collect();
            normalized.push(scene.select(&names)?);
        }

        Ok(Self {
            scenes: normalized,
            schema,
            grid,
        })
    }

    /// An empty collection with a declared schema and grid
    pub fn empty(schema: Vec<String>, grid: GridSpec) -> Self {
        Self {
            scenes: Vec::new(),
            schema,
            grid,
        }
    }

    pub fn scenes(&self) -> &[Raster] {
        &self.scenes
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Raster> {
        self.scenes.iter()
    }

    /// Bytes occupied by all scene data, for cache accounting
    pub fn byte_size(&self) -> usize {
        self.scenes.iter().map(|s| s.byte_size()).sum()
    }

    /// Keep only scenes matching the filter.
    ///
    /// An empty result is valid: it keeps the schema and grid and is
    /// logged, not raised.
    pub fn filter(&self, filter: &SceneFilter) -> RasterCollection {
        let scenes: Vec<Raster> = self
            .scenes
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        if scenes.is_empty() && !self.scenes.is_empty() {
            warn!(
                "scene filter matched 0 of {} scenes; downstream reducers will produce no-data",
                self.scenes.len()
            );
        }
        RasterCollection {
            scenes,
            schema: self.schema.clone(),
            grid: self.grid.clone(),
        }
    }

    /// Scenes ordered by acquisition timestamp (undated scenes first)
    pub fn sorted_by_time(&self) -> RasterCollection {
        let mut out = self.clone();
        out.scenes.sort_by_key(|s| s.meta().acquired);
        out
    }

    /// Splice another collection into this one, sorted by timestamp.
    ///
    /// Band schemas must already be reconciled to a common naming; a
    /// differing schema is rejected, never silently ignored.
    pub fn merge(&self, other: &RasterCollection) -> Result<RasterCollection> {
        let mut left = self.schema.clone();
        let mut right = other.schema.clone();
        left.sort();
        right.sort();
        if left != right {
            return Err(Error::SchemaMismatch {
                left: self.schema.clone(),
                right: other.schema.clone(),
            });
        }
        if (self.grid.rows, self.grid.cols) != (other.grid.rows, other.grid.cols) {
            return Err(Error::SizeMismatch {
                er: self.grid.rows,
                ec: self.grid.cols,
                ar: other.grid.rows,
                ac: other.grid.cols,
            });
        }
        if let (Some(a), Some(b)) = (&self.grid.crs, &other.grid.crs) {
            if !a.is_equivalent(b) {
                return Err(Error::CrsMismatch(a.identifier(), b.identifier()));
            }
        }

        let names: Vec<&str> = self.schema.iter().map(|s| s.as_str()).collect();
        let mut scenes = self.scenes.clone();
        for scene in &other.scenes {
            scenes.push(scene.select(&names)?);
        }
        scenes.sort_by_key(|s| s.meta().acquired);

        Ok(RasterCollection {
            scenes,
            schema: self.schema.clone(),
            grid: self.grid.clone(),
        })
    }

    /// Apply a per-scene function (calibration, index computation, band
    /// selection), producing a new collection.
    ///
    /// The output schema is re-derived from the mapped scenes, so `f` may
    /// change band names. Mapping an empty collection returns it
    /// unchanged (there is nothing to re-derive a schema from).
    pub fn map(&self, f: impl Fn(&Raster) -> Result<Raster>) -> Result<RasterCollection> {
        self.map_with_cancel(f, &CancelToken::new())
    }

    /// [`map`](RasterCollection::map) with cancellation checked between scenes
    pub fn map_with_cancel(
        &self,
        f: impl Fn(&Raster) -> Result<Raster>,
        cancel: &CancelToken,
    ) -> Result<RasterCollection> {
        if self.scenes.is_empty() {
            return Ok(self.clone());
        }
        let mut mapped = Vec::with_capacity(self.scenes.len());
        for scene in &self.scenes {
            cancel.check()?;
            mapped.push(f(scene)?);
        }
        RasterCollection::from_scenes(mapped)
    }
}

fn check_schema(schema: &[String], scene: &Raster) -> Result<()> {
    let names = scene.band_names();
    let mut left: Vec<&str> = schema.iter().map(|s| s.as_str()).collect();
    let mut right = names.clone();
    left.sort_unstable();
    right.sort_unstable();
    if left != right {
        return Err(Error::SchemaMismatch {
            left: schema.to_vec(),
            right: names.iter().map(|s| s.to_string()).collect(),
        });
    }
    Ok(())
}

fn check_grid(grid: &GridSpec, scene: &Raster) -> Result<()> {
    let (rows, cols) = scene.shape();
    if (rows, cols) != (grid.rows, grid.cols) {
        return Err(Error::SizeMismatch {
            er: grid.rows,
            ec: grid.cols,
            ar: rows,
            ac: cols,
        });
    }
    if let (Some(a), Some(b)) = (&grid.crs, scene.crs()) {
        if !a.is_equivalent(b) {
            return Err(Error::CrsMismatch(a.identifier(), b.identifier()));
        }
    }
    Ok(())
}

/// Conjunctive scene predicate: every configured clause must hold.
///
/// Mirrors the catalog-side filters of the source platforms: date range
/// `[start, end)`, spatial intersection with a bounds geometry, cloud
/// percentage ceiling, sensor membership, SAR polarisation containment
/// and orbit pass. Scenes missing the metadata a clause needs do not
/// match that clause.
#[derive(Debug, Clone, Default)]
pub struct SceneFilter {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    bounds: Option<Geometry<f64>>,
    max_cloud: Option<f64>,
    sensors: Option<Vec<String>>,
    polarisation: Option<String>,
    orbit: Option<OrbitPass>,
}

impl SceneFilter {
    /// A filter with no clauses (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquisition timestamp within `[start, end)`
    pub fn date_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Scene footprint intersects the geometry
    pub fn bounds(mut self, geometry: Geometry<f64>) -> Self {
        self.bounds = Some(geometry);
        self
    }

    /// Cloud cover strictly below the given percentage
    pub fn cloud_cover_below(mut self, percentage: f64) -> Self {
        self.max_cloud = Some(percentage);
        self
    }

    /// Sensor id member of the given set
    pub fn sensor_in(mut self, sensors: &[&str]) -> Self {
        self.sensors = Some(sensors.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Scene polarisations contain the given one (e.g. "VH")
    pub fn polarisation(mut self, polarisation: &str) -> Self {
        self.polarisation = Some(polarisation.to_string());
        self
    }

    /// Orbit pass equals the given direction
    pub fn orbit(mut self, orbit: OrbitPass) -> Self {
        self.orbit = Some(orbit);
        self
    }

    /// Whether no clause is configured
    pub fn is_unrestricted(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.bounds.is_none()
            && self.max_cloud.is_none()
            && self.sensors.is_none()
            && self.polarisation.is_none()
            && self.orbit.is_none()
    }

    pub fn matches(&self, scene: &Raster) -> bool {
        if self.start.is_some() || self.end.is_some() {
            let Some(acquired) = scene.meta().acquired else {
                return false;
            };
            if let Some(start) = self.start {
                if acquired < start {
                    return false;
                }
            }
            if let Some(end) = self.end {
                if acquired >= end {
                    return false;
                }
            }
        }
        if let Some(bounds) = &self.bounds {
            let footprint = Geometry::Polygon(scene.extent_polygon());
            if !bounds.intersects(&footprint) {
                return false;
            }
        }
        if let Some(max_cloud) = self.max_cloud {
            match scene.meta().cloud_cover {
                Some(cloud) if cloud < max_cloud => {}
                _ => return false,
            }
        }
        if let Some(sensors) = &self.sensors {
            match &scene.meta().sensor {
                Some(sensor) if sensors.contains(sensor) => {}
                _ => return false,
            }
        }
        if let Some(polarisation) = &self.polarisation {
            if !scene.meta().polarisations.contains(polarisation) {
                return false;
            }
        }
        if let Some(orbit) = self.orbit {
            if scene.meta().orbit != Some(orbit) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo_types::polygon;
    use marisma_core::{Band, PixelTransform};

    fn scene(year: i32, cloud: f64, sensor: &str) -> Raster {
        let mut raster = Raster::from_bands(
            vec![
                Band::filled("green", 3, 3, 0.2),
                Band::filled("swir1", 3, 3, 0.4),
            ],
            PixelTransform::new(0.0, 3.0, 1.0, -1.0),
        )
        .unwrap();
        raster.meta_mut().acquired = Some(Utc.with_ymd_and_hms(year, 6, 1, 10, 30, 0).unwrap());
        raster.meta_mut().cloud_cover = Some(cloud);
        raster.meta_mut().sensor = Some(sensor.to_string());
        raster
    }

    fn collection() -> RasterCollection {
        RasterCollection::from_scenes(vec![
            scene(1988, 10.0, "L5"),
            scene(2001, 35.0, "L7"),
            scene(2016, 5.0, "L8"),
            scene(2022, 15.0, "L9"),
        ])
        .unwrap()
    }

    #[test]
    fn filters_compose_conjunctively() {
        let filter = SceneFilter::new()
            .date_range(
                Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            )
            .cloud_cover_below(20.0);
        let filtered = collection().filter(&filter);
        assert_eq!(filtered.len(), 2);
        assert_eq!(
            filtered.scenes()[0].meta().sensor.as_deref(),
            Some("L8")
        );
    }

    #[test]
    fn date_range_end_exclusive() {
        let start = Utc.with_ymd_and_hms(1988, 6, 1, 10, 30, 0).unwrap();
        let filter = SceneFilter::new().date_range(start, start);
        assert!(collection().filter(&filter).is_empty());

        let end = Utc.with_ymd_and_hms(1988, 6, 1, 10, 30, 1).unwrap();
        let filter = SceneFilter::new().date_range(start, end);
        assert_eq!(collection().filter(&filter).len(), 1);
    }

    #[test]
    fn empty_result_keeps_schema_and_grid() {
        let filter = SceneFilter::new().cloud_cover_below(0.0);
        let filtered = collection().filter(&filter);
        assert!(filtered.is_empty());
        assert_eq!(filtered.schema(), &["green", "swir1"]);
        assert_eq!(filtered.grid().rows, 3);
    }

    #[test]
    fn spatial_filter_uses_intersection() {
        let inside: Geometry<f64> = Geometry::Polygon(polygon![
            (x: 1.0, y: 1.0),
            (x: 2.0, y: 1.0),
            (x: 2.0, y: 2.0),
            (x: 1.0, y: 2.0),
            (x: 1.0, y: 1.0),
        ]);
        let outside: Geometry<f64> = Geometry::Polygon(polygon![
            (x: 10.0, y: 10.0),
            (x: 11.0, y: 10.0),
            (x: 11.0, y: 11.0),
            (x: 10.0, y: 11.0),
            (x: 10.0, y: 10.0),
        ]);
        assert_eq!(collection().filter(&SceneFilter::new().bounds(inside)).len(), 4);
        assert!(collection().filter(&SceneFilter::new().bounds(outside)).is_empty());
    }

    #[test]
    fn merge_requires_reconciled_schema() {
        let landsat = collection();
        let sentinel = RasterCollection::from_scenes(vec![Raster::from_bands(
            vec![Band::filled("B3", 3, 3, 0.2), Band::filled("B11", 3, 3, 0.4)],
            PixelTransform::new(0.0, 3.0, 1.0, -1.0),
        )
        .unwrap()])
        .unwrap();

        let err = landsat.merge(&sentinel).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));

        let reconciled = sentinel
            .map(|s| s.select_rename(&[("B3", "green"), ("B11", "swir1")]))
            .unwrap();
        let merged = landsat.merge(&reconciled).unwrap();
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn merge_sorts_by_timestamp() {
        let early = RasterCollection::from_scenes(vec![scene(1990, 1.0, "L5")]).unwrap();
        let late = RasterCollection::from_scenes(vec![scene(2010, 1.0, "L8")]).unwrap();
        let merged = late.merge(&early).unwrap();
        let years: Vec<i32> = merged
            .iter()
            .map(|s| {
                use chrono::Datelike;
                s.meta().acquired.unwrap().year()
            })
            .collect();
        assert_eq!(years, vec![1990, 2010]);
    }

    #[test]
    fn map_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let err = collection()
            .map_with_cancel(|s| Ok(s.clone()), &token)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
