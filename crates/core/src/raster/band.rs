//! Named single-band grids

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2};

/// A named band: a 2-D grid of `f64` samples.
///
/// In memory, `NaN` is the one and only no-data state. Sources that use a
/// sentinel value convert to `NaN` on read ([`crate::io`] does this) so
/// every pipeline stage can test validity with `is_nan()` alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    name: String,
    data: Array2<f64>,
}

impl Band {
    /// Create a band from an existing array
    pub fn new(name: impl Into<String>, data: Array2<f64>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Create a band filled with a constant value
    pub fn filled(name: impl Into<String>, rows: usize, cols: usize, value: f64) -> Self {
        Self::new(name, Array2::from_elem((rows, cols), value))
    }

    /// Create a band from a row-major vector
    pub fn from_vec(name: impl Into<String>, values: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let data = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same data under a different name
    pub fn renamed(&self, name: impl Into<String>) -> Band {
        Band {
            name: name.into(),
            data: self.data.clone(),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> f64 {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    /// Number of valid (non-NaN) samples
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Apply a unary function to every valid sample; no-data is preserved.
    pub fn map(&self, name: impl Into<String>, f: impl Fn(f64) -> f64) -> Band {
        let data = self.data.mapv(|v| if v.is_nan() { f64::NAN } else { f(v) });
        Band {
            name: name.into(),
            data,
        }
    }

    /// Bytes occupied by the sample data
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }
}
