//! Terrain derivatives from elevation bands
//!
//! Slope and aspect via Horn's (1981) 3×3 method, for stacking with
//! elevation ahead of zonal reduction. Edge pixels and pixels with an
//! incomplete neighbourhood come out as no-data.

use marisma_core::{Band, Raster, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Units for slope output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeUnits {
    /// Degrees (0-90)
    #[default]
    Degrees,
    /// Percent rise
    Percent,
    /// Radians (0-π/2)
    Radians,
}

/// Parameters for slope calculation
#[derive(Debug, Clone)]
pub struct SlopeParams {
    pub units: SlopeUnits,
    /// Vertical unit conversion; ~111320 for degree grids with meter
    /// elevations
    pub z_factor: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            units: SlopeUnits::Degrees,
            z_factor: 1.0,
        }
    }
}

/// Horn partial derivatives at (row, col); `None` at edges or when the
/// 3×3 neighbourhood has no-data.
fn horn_gradient(band: &Band, row: usize, col: usize, cell_size: f64) -> Option<(f64, f64)> {
    let (rows, cols) = band.shape();
    if row == 0 || col == 0 || row + 1 >= rows || col + 1 >= cols {
        return None;
    }
    let mut window = [0.0f64; 9];
    for (k, slot) in window.iter_mut().enumerate() {
        let r = row + k / 3 - 1;
        let c = col + k % 3 - 1;
        let v = unsafe { band.get_unchecked(r, c) };
        if v.is_nan() {
            return None;
        }
        *slot = v;
    }
    let [a, b, c, d, _, f, g, h, i] = window;
    let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / (8.0 * cell_size);
    let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / (8.0 * cell_size);
    Some((dz_dx, dz_dy))
}

/// Slope of an elevation band, as a single-band raster named `"slope"`.
pub fn slope(raster: &Raster, band: &str, params: SlopeParams) -> Result<Raster> {
    let elevation = raster.band(band)?;
    let cell_size = raster.transform().cell_size() * params.z_factor;
    let (rows, cols) = elevation.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if let Some((dz_dx, dz_dy)) = horn_gradient(elevation, row, col, cell_size) {
                    let rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
                    *out = match params.units {
                        SlopeUnits::Degrees => rad.to_degrees(),
                        SlopeUnits::Percent => rad.tan() * 100.0,
                        SlopeUnits::Radians => rad,
                    };
                }
            }
            row_data
        })
        .collect();

    single_band_output(raster, "slope", rows, cols, data)
}

/// Aspect of an elevation band in compass degrees (0 = north, clockwise),
/// as a single-band raster named `"aspect"`. Flat cells are no-data.
pub fn aspect(raster: &Raster, band: &str) -> Result<Raster> {
    let elevation = raster.band(band)?;
    let cell_size = raster.transform().cell_size();
    let (rows, cols) = elevation.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if let Some((dz_dx, dz_dy)) = horn_gradient(elevation, row, col, cell_size) {
                    if dz_dx == 0.0 && dz_dy == 0.0 {
                        continue;
                    }
                    let mut degrees = dz_dy.atan2(-dz_dx).to_degrees();
                    // math angle -> compass bearing
                    degrees = 90.0 - degrees;
                    if degrees < 0.0 {
                        degrees += 360.0;
                    }
                    *out = degrees % 360.0;
                }
            }
            row_data
        })
        .collect();

    single_band_output(raster, "aspect", rows, cols, data)
}

fn single_band_output(
    source: &Raster,
    name: &str,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
) -> Result<Raster> {
    let mut output = source.like_empty();
    output.push_band(Band::new(
        name,
        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| marisma_core::Error::Other(e.to_string()))?,
    ))?;
    Ok(output)
}
