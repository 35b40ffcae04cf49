//! Zonal statistics: reducing raster values over vector zones

use super::ReducerKind;
use geo::{BoundingRect, Contains};
use geo_types::{Geometry, Point};
use log::warn;
use marisma_core::{AttributeValue, Error, Raster, Result, Table, Zone, ZoneCollection};

/// Reduce raster values over every zone into a table.
///
/// Each zone is sampled on a regular grid of step `scale` (CRS units)
/// anchored at the zone's bounding box; a sample belongs to the zone iff
/// its center lies inside the zone geometry (center-in-polygon rule, so
/// boundary pixels are assigned identically regardless of evaluation
/// order). Sample values come from the nearest raster pixel. Point zones
/// contribute their single nearest pixel.
///
/// The output has one row per zone, always, in input order: the
/// zone's attribute fields carried through unchanged, then one column
/// per (band × reducer) named `<band>_<reducer>`. A zone with zero
/// overlapping valid pixels keeps its row with Null in every computed
/// column.
pub fn reduce_to_zones(
    raster: &Raster,
    zones: &ZoneCollection,
    kinds: &[ReducerKind],
    scale: f64,
) -> Result<Table> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: scale.to_string(),
            reason: "sampling resolution must be positive".to_string(),
        });
    }
    if kinds.is_empty() {
        return Err(Error::InvalidParameter {
            name: "kinds",
            value: "[]".to_string(),
            reason: "at least one reducer is required".to_string(),
        });
    }
    for kind in kinds {
        kind.validate()?;
    }

    let mut columns: Vec<String> = zones.fields().to_vec();
    for band in raster.bands() {
        for kind in kinds {
            columns.push(format!("{}_{}", band.name(), kind.column_suffix()));
        }
    }
    let mut table = Table::new(columns)?;

    let mut starved = 0usize;
    for zone in zones.iter() {
        let samples = collect_zone_samples(raster, zone, scale);
        let has_valid = samples.iter().any(|band| !band.is_empty());
        if !has_valid {
            starved += 1;
        }

        let mut row: Vec<AttributeValue> = zones
            .fields()
            .iter()
            .map(|f| zone.attribute(f).cloned().unwrap_or(AttributeValue::Null))
            .collect();
        for band_samples in samples {
            for kind in kinds {
                let mut values = band_samples.clone();
                row.push(match kind.reduce(&mut values) {
                    Some(v) => AttributeValue::Float(v),
                    None => AttributeValue::Null,
                });
            }
        }
        table.push_row(row)?;
    }

    if starved > 0 {
        warn!(
            "{} of {} zones had zero valid pixels; their rows carry no-data",
            starved,
            zones.len()
        );
    }

    Ok(table)
}

/// Valid samples per band for one zone (outer index = band order)
fn collect_zone_samples(raster: &Raster, zone: &Zone, scale: f64) -> Vec<Vec<f64>> {
    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); raster.num_bands()];
    let (rows, cols) = raster.shape();
    let transform = raster.transform();

    let push_pixel = |row: usize, col: usize, samples: &mut Vec<Vec<f64>>| {
        for (band, sink) in raster.bands().iter().zip(samples.iter_mut()) {
            let v = unsafe { band.get_unchecked(row, col) };
            if !v.is_nan() {
                sink.push(v);
            }
        }
    };

    match zone.geometry() {
        Geometry::Point(p) => {
            if let Some((row, col)) = transform.nearest_pixel(p.x(), p.y(), rows, cols) {
                push_pixel(row, col, &mut samples);
            }
        }
        geometry => {
            let Some(bbox) = geometry.bounding_rect() else {
                return samples;
            };
            let (raster_min_x, raster_min_y, raster_max_x, raster_max_y) = raster.bounds();
            let min_x = bbox.min().x.max(raster_min_x);
            let min_y = bbox.min().y.max(raster_min_y);
            let max_x = bbox.max().x.min(raster_max_x);
            let max_y = bbox.max().y.min(raster_max_y);
            if min_x >= max_x || min_y >= max_y {
                return samples;
            }

            let nx = ((max_x - min_x) / scale).ceil() as usize;
            let ny = ((max_y - min_y) / scale).ceil() as usize;
            for j in 0..ny {
                let y = min_y + (j as f64 + 0.5) * scale;
                if y > max_y {
                    break;
                }
                for i in 0..nx {
                    let x = min_x + (i as f64 + 0.5) * scale;
                    if x > max_x {
                        break;
                    }
                    if !geometry.contains(&Point::new(x, y)) {
                        continue;
                    }
                    if let Some((row, col)) = transform.nearest_pixel(x, y, rows, cols) {
                        push_pixel(row, col, &mut samples);
                    }
                }
            }
        }
    }

    samples
}

/// Extract per-band pixel values at point locations for training tables.
///
/// One row per point, in input order: the point's label fields first
/// (class ids and friends carried through unchanged), then one column
/// per band with the nearest pixel's value. With `scale` set, the point
/// is snapped to the center of its `scale`-grid cell before lookup,
/// emulating sampling at a coarser working resolution. Points outside
/// the raster, or hitting no-data, get Null.
pub fn sample_at_points(
    raster: &Raster,
    points: &ZoneCollection,
    scale: Option<f64>,
) -> Result<Table> {
    if let Some(s) = scale {
        if !s.is_finite() || s <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: s.to_string(),
                reason: "sampling resolution must be positive".to_string(),
            });
        }
    }
    for zone in points.iter() {
        if !zone.is_point() {
            return Err(Error::InvalidGeometry(
                "sample_at_points requires point geometries".to_string(),
            ));
        }
    }

    let mut columns: Vec<String> = points.fields().to_vec();
    columns.extend(raster.band_names().iter().map(|s| s.to_string()));
    let mut table = Table::new(columns)?;

    let (rows, cols) = raster.shape();
    for zone in points.iter() {
        let Geometry::Point(p) = zone.geometry() else {
            unreachable!("validated above");
        };
        let (mut x, mut y) = (p.x(), p.y());
        if let Some(s) = scale {
            x = (x / s).floor() * s + s / 2.0;
            y = (y / s).floor() * s + s / 2.0;
        }

        let mut row: Vec<AttributeValue> = points
            .fields()
            .iter()
            .map(|f| zone.attribute(f).cloned().unwrap_or(AttributeValue::Null))
            .collect();

        match raster.transform().nearest_pixel(x, y, rows, cols) {
            Some((r, c)) => {
                for band in raster.bands() {
                    let v = unsafe { band.get_unchecked(r, c) };
                    row.push(if v.is_nan() {
                        AttributeValue::Null
                    } else {
                        AttributeValue::Float(v)
                    });
                }
            }
            None => {
                row.extend(std::iter::repeat(AttributeValue::Null).take(raster.num_bands()));
            }
        }
        table.push_row(row)?;
    }

    Ok(table)
}
