//! Affine georeferencing for north-up grids

use serde::{Deserialize, Serialize};

/// Affine transform between pixel coordinates (col, row) and geographic
/// coordinates (x, y) for a north-up grid:
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `origin_x`/`origin_y` are the coordinates of the upper-left corner of
/// the upper-left pixel; `pixel_height` is negative for north-up grids.
/// Rotated grids are not represented; every source handled here is
/// axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl PixelTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Geographic coordinates of a pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates (col, row) of a geographic point.
    ///
    /// Use `.floor()` for integer indices; see [`nearest_pixel`] for a
    /// bounds-checked lookup.
    ///
    /// [`nearest_pixel`]: PixelTransform::nearest_pixel
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.origin_x) / self.pixel_width;
        let row = (y - self.origin_y) / self.pixel_height;
        (col, row)
    }

    /// Index of the pixel whose footprint contains (x, y), or `None`
    /// when the point falls outside a `rows`×`cols` grid.
    pub fn nearest_pixel(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (col, row) = (col.floor(), row.floor());
        if col < 0.0 || row < 0.0 || col >= cols as f64 || row >= rows as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    /// Cell size, assuming square pixels
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a `rows`×`cols` grid
    pub fn bounds(&self, rows: usize, cols: usize) -> (f64, f64, f64, f64) {
        let x_far = self.origin_x + cols as f64 * self.pixel_width;
        let y_far = self.origin_y + rows as f64 * self.pixel_height;
        (
            self.origin_x.min(x_far),
            self.origin_y.min(y_far),
            self.origin_x.max(x_far),
            self.origin_y.max(y_far),
        )
    }
}

impl Default for PixelTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pixel_geo_roundtrip() {
        let tr = PixelTransform::new(500_000.0, 4_100_000.0, 30.0, -30.0);
        let (x, y) = tr.pixel_to_geo(7, 12);
        let (col, row) = tr.geo_to_pixel(x, y);
        assert_relative_eq!(col, 7.5, epsilon = 1e-10);
        assert_relative_eq!(row, 12.5, epsilon = 1e-10);
    }

    #[test]
    fn nearest_pixel_in_and_out_of_grid() {
        let tr = PixelTransform::new(0.0, 10.0, 1.0, -1.0);
        assert_eq!(tr.nearest_pixel(0.5, 9.5, 10, 10), Some((0, 0)));
        assert_eq!(tr.nearest_pixel(9.5, 0.5, 10, 10), Some((9, 9)));
        assert_eq!(tr.nearest_pixel(-0.1, 5.0, 10, 10), None);
        assert_eq!(tr.nearest_pixel(5.0, 10.1, 10, 10), None);
    }

    #[test]
    fn bounds_north_up() {
        let tr = PixelTransform::new(100.0, 200.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = tr.bounds(50, 80);
        assert_relative_eq!(min_x, 100.0);
        assert_relative_eq!(min_y, 150.0);
        assert_relative_eq!(max_x, 180.0);
        assert_relative_eq!(max_y, 200.0);
    }
}
