//! Pipeline configuration surface
//!
//! All the knobs an analysis run needs (date range, spatial bounds,
//! reducer, thresholds, working resolution, CRS) as one plain value,
//! validated when it is built (no hidden globals). Loadable from JSON so
//! run definitions live next to the data they describe.

use crate::collection::SceneFilter;
use crate::reduce::ReducerKind;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use geo_types::{coord, Geometry, Rect};
use marisma_core::{Crs, Error, Result};
use serde::Deserialize;

/// Axis-aligned spatial bounds in CRS units
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundsConfig {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Configuration for one pipeline run.
///
/// Construct via [`PipelineConfig::from_json`] or build the struct and
/// call [`validate`](PipelineConfig::validate); both reject bad values
/// up front so stages can trust what they receive.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Analysis start date (inclusive), ISO 8601
    pub start: NaiveDate,
    /// Analysis end date (exclusive), ISO 8601
    pub end: NaiveDate,
    #[serde(default)]
    pub bounds: Option<BoundsConfig>,
    /// Temporal statistic for compositing
    pub reducer: ReducerKind,
    /// Index threshold for masking (e.g. 0.0 for MNDWI water)
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Scene cloud-cover ceiling in percent
    #[serde(default)]
    pub max_cloud: Option<f64>,
    /// Working resolution in CRS units
    pub scale: f64,
    /// Output CRS identifier, e.g. "EPSG:32629"
    #[serde(default)]
    pub crs: Option<String>,
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(text).map_err(|e| Error::InvalidParameter {
                name: "config",
                value: text.chars().take(80).collect(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(Error::InvalidParameter {
                name: "date_range",
                value: format!("{}..{}", self.start, self.end),
                reason: "start must be before end".to_string(),
            });
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: self.scale.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(bounds) = &self.bounds {
            if bounds.min_x >= bounds.max_x || bounds.min_y >= bounds.max_y {
                return Err(Error::InvalidParameter {
                    name: "bounds",
                    value: format!(
                        "({}, {}, {}, {})",
                        bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
                    ),
                    reason: "min must be below max on both axes".to_string(),
                });
            }
        }
        if let Some(cloud) = self.max_cloud {
            if !(0.0..=100.0).contains(&cloud) {
                return Err(Error::InvalidParameter {
                    name: "max_cloud",
                    value: cloud.to_string(),
                    reason: "must be in [0, 100]".to_string(),
                });
            }
        }
        if let Some(threshold) = self.threshold {
            if !threshold.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "threshold",
                    value: threshold.to_string(),
                    reason: "must be finite".to_string(),
                });
            }
        }
        self.reducer.validate()?;
        if let Some(crs) = &self.crs {
            Crs::parse(crs)?;
        }
        Ok(())
    }

    /// Start of the date range as a UTC instant
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// End of the date range as a UTC instant (exclusive)
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc()
    }

    /// Bounds as a geometry, if configured
    pub fn bounds_geometry(&self) -> Option<Geometry<f64>> {
        self.bounds.map(|b| {
            Geometry::Polygon(
                Rect::new(
                    coord! { x: b.min_x, y: b.min_y },
                    coord! { x: b.max_x, y: b.max_y },
                )
                .to_polygon(),
            )
        })
    }

    /// Parsed output CRS, if configured
    pub fn output_crs(&self) -> Result<Option<Crs>> {
        self.crs.as_deref().map(Crs::parse).transpose()
    }

    /// The scene filter this configuration describes
    pub fn scene_filter(&self) -> SceneFilter {
        let mut filter = SceneFilter::new().date_range(self.start_time(), self.end_time());
        if let Some(geometry) = self.bounds_geometry() {
            filter = filter.bounds(geometry);
        }
        if let Some(cloud) = self.max_cloud {
            filter = filter.cloud_cover_below(cloud);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATER_DECADES: &str = r#"{
        "start": "1984-09-01",
        "end": "1994-08-31",
        "bounds": { "min_x": 680000.0, "min_y": 4090000.0, "max_x": 740000.0, "max_y": 4130000.0 },
        "reducer": { "percentile": 98.0 },
        "threshold": 0.0,
        "max_cloud": 20.0,
        "scale": 30.0,
        "crs": "EPSG:32629"
    }"#;

    #[test]
    fn parses_full_config() {
        let config = PipelineConfig::from_json(WATER_DECADES).unwrap();
        assert_eq!(config.reducer, ReducerKind::Percentile(98.0));
        assert_eq!(config.scale, 30.0);
        assert_eq!(config.output_crs().unwrap().unwrap().epsg(), Some(32629));
        assert!(config.bounds_geometry().is_some());
    }

    #[test]
    fn simple_reducer_names() {
        let config = PipelineConfig::from_json(
            r#"{ "start": "2020-01-01", "end": "2020-12-31", "reducer": "median", "scale": 10.0 }"#,
        )
        .unwrap();
        assert_eq!(config.reducer, ReducerKind::Median);
        assert!(config.max_cloud.is_none());
    }

    #[test]
    fn inverted_dates_rejected() {
        let err = PipelineConfig::from_json(
            r#"{ "start": "2021-01-01", "end": "2020-01-01", "reducer": "median", "scale": 10.0 }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "date_range", .. }));
    }

    #[test]
    fn bad_values_rejected() {
        for json in [
            r#"{ "start": "2020-01-01", "end": "2021-01-01", "reducer": "median", "scale": 0.0 }"#,
            r#"{ "start": "2020-01-01", "end": "2021-01-01", "reducer": "median", "scale": 10.0, "max_cloud": 150.0 }"#,
            r#"{ "start": "2020-01-01", "end": "2021-01-01", "reducer": { "percentile": 101.0 }, "scale": 10.0 }"#,
            r#"{ "start": "2020-01-01", "end": "2021-01-01", "reducer": "median", "scale": 10.0, "crs": "utm29" }"#,
            r#"{ "start": "2020-01-01", "end": "2021-01-01", "reducer": "median", "scale": 10.0, "bounds": { "min_x": 5.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0 } }"#,
        ] {
            assert!(PipelineConfig::from_json(json).is_err(), "{}", json);
        }
    }

    #[test]
    fn scene_filter_reflects_config() {
        let config = PipelineConfig::from_json(WATER_DECADES).unwrap();
        let filter = config.scene_filter();
        assert!(!filter.is_unrestricted());
    }
}
