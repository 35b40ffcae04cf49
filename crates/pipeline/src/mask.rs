//! Boolean masks, thresholds and quality-bit decoding
//!
//! A [`Mask`] is tri-state per pixel: true, false, or no-data. Applying
//! a mask turns false *and* no-data pixels into no-data in every band of
//! the target raster, so an unknown predicate never launders into a
//! valid measurement.

use log::warn;
use marisma_core::{Band, Error, Raster, Result};
use ndarray::Array2;

/// Comparison operators for thresholding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
        }
    }
}

/// A boolean raster aligned to a reference grid.
///
/// Encoded as 1.0 / 0.0 / NaN, matching the workspace-wide NaN no-data
/// convention. Combinators use three-valued logic: a false operand
/// decides `and`, a true operand decides `or`, otherwise no-data wins.
#[derive(Debug, Clone)]
pub struct Mask {
    data: Array2<f64>,
}

impl Mask {
    fn new(data: Array2<f64>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Tri-state lookup: `Some(true)`, `Some(false)`, or `None` (no-data)
    pub fn state(&self, row: usize, col: usize) -> Option<bool> {
        let v = self.data[(row, col)];
        if v.is_nan() {
            None
        } else {
            Some(v != 0.0)
        }
    }

    /// Number of true pixels
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&v| v == 1.0).count()
    }

    pub fn and(&self, other: &Mask) -> Result<Mask> {
        self.combine(other, |a, b| match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        })
    }

    pub fn or(&self, other: &Mask) -> Result<Mask> {
        self.combine(other, |a, b| match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        })
    }

    pub fn not(&self) -> Mask {
        Mask::new(self.data.mapv(|v| {
            if v.is_nan() {
                f64::NAN
            } else if v == 0.0 {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn combine(
        &self,
        other: &Mask,
        f: impl Fn(Option<bool>, Option<bool>) -> Option<bool>,
    ) -> Result<Mask> {
        if self.shape() != other.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = other.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        let (rows, cols) = self.shape();
        let mut data = Array2::from_elem((rows, cols), f64::NAN);
        for row in 0..rows {
            for col in 0..cols {
                let a = self.state(row, col);
                let b = other.state(row, col);
                data[(row, col)] = match f(a, b) {
                    Some(true) => 1.0,
                    Some(false) => 0.0,
                    None => f64::NAN,
                };
            }
        }
        Ok(Mask::new(data))
    }
}

/// Build a mask by comparing a band against a constant.
///
/// No-data samples become no-data mask pixels.
pub fn threshold(band: &Band, op: CompareOp, value: f64) -> Mask {
    Mask::new(band.data().mapv(|v| {
        if v.is_nan() {
            f64::NAN
        } else if op.apply(v, value) {
            1.0
        } else {
            0.0
        }
    }))
}

/// Mask from a single quality bit of an integer-valued band.
///
/// Samples are interpreted as two's-complement `i64`; `bit` 0 is the
/// least significant. Bits 0-62 are addressable (bit 63 is the sign).
pub fn bit_is_set(band: &Band, bit: u32) -> Result<Mask> {
    if bit > 62 {
        return Err(Error::InvalidParameter {
            name: "bit",
            value: bit.to_string(),
            reason: "bit index must be in 0..=62".to_string(),
        });
    }
    Ok(Mask::new(band.data().mapv(|v| {
        if v.is_nan() {
            f64::NAN
        } else if (v.round() as i64 >> bit) & 1 == 1 {
            1.0
        } else {
            0.0
        }
    })))
}

/// Suppress every band of `raster` where the mask is false or no-data.
///
/// A mask with zero true pixels is valid (the output is all no-data) and
/// is logged so it stays distinguishable from a computation error.
pub fn apply_mask(raster: &Raster, mask: &Mask) -> Result<Raster> {
    if raster.shape() != mask.shape() {
        let (er, ec) = raster.shape();
        let (ar, ac) = mask.shape();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    if mask.count_true() == 0 {
        warn!("mask has zero true pixels; every band becomes no-data");
    }
    raster.map_bands(|band| {
        let mut data = band.data().clone();
        for ((row, col), v) in data.indexed_iter_mut() {
            if mask.state(row, col) != Some(true) {
                *v = f64::NAN;
            }
        }
        Ok(Band::new(band.name(), data))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use marisma_core::PixelTransform;

    #[test]
    fn threshold_tri_state() {
        let mut band = Band::filled("mndwi", 2, 2, 0.4);
        band.set(0, 1, -0.2).unwrap();
        band.set(1, 0, f64::NAN).unwrap();
        let water = threshold(&band, CompareOp::Gt, 0.0);
        assert_eq!(water.state(0, 0), Some(true));
        assert_eq!(water.state(0, 1), Some(false));
        assert_eq!(water.state(1, 0), None);
        assert_eq!(water.count_true(), 2);
    }

    #[test]
    fn bit_decoding_matches_two_complement() {
        // bit 10 set, bit 11 clear
        let qa = Band::filled("QA60", 2, 2, (1 << 10) as f64);
        assert_eq!(bit_is_set(&qa, 10).unwrap().count_true(), 4);
        assert_eq!(bit_is_set(&qa, 11).unwrap().count_true(), 0);

        let zeros = Band::filled("QA60", 3, 3, 0.0);
        assert_eq!(bit_is_set(&zeros, 10).unwrap().count_true(), 0);
        assert_eq!(bit_is_set(&zeros, 11).unwrap().count_true(), 0);

        assert!(bit_is_set(&qa, 63).is_err());
    }

    #[test]
    fn kleene_combinators() {
        let mut a = Band::filled("a", 1, 3, 1.0);
        a.set(0, 2, f64::NAN).unwrap();
        let mut b = Band::filled("b", 1, 3, 0.0);
        b.set(0, 2, 0.0).unwrap();
        let ma = threshold(&a, CompareOp::Gt, 0.5); // [T, T, N]
        let mb = threshold(&b, CompareOp::Gt, 0.5); // [F, F, F]

        let and = ma.and(&mb).unwrap();
        assert_eq!(and.state(0, 0), Some(false));
        assert_eq!(and.state(0, 2), Some(false)); // false decides over no-data

        let or = ma.or(&mb).unwrap();
        assert_eq!(or.state(0, 0), Some(true));
        assert_eq!(or.state(0, 2), None); // unknown || false = unknown

        let not = ma.not();
        assert_eq!(not.state(0, 0), Some(false));
        assert_eq!(not.state(0, 2), None);
    }

    #[test]
    fn apply_suppresses_false_and_nodata() {
        let raster = Raster::from_bands(
            vec![
                Band::filled("green", 2, 2, 0.3),
                Band::filled("swir1", 2, 2, 0.1),
            ],
            PixelTransform::default(),
        )
        .unwrap();
        let mut predicate = Band::filled("mndwi", 2, 2, 1.0);
        predicate.set(0, 1, -1.0).unwrap();
        predicate.set(1, 0, f64::NAN).unwrap();
        let mask = threshold(&predicate, CompareOp::Gt, 0.0);

        let masked = apply_mask(&raster, &mask).unwrap();
        for name in ["green", "swir1"] {
            let band = masked.band(name).unwrap();
            assert!(!band.get(0, 0).unwrap().is_nan());
            assert!(band.get(0, 1).unwrap().is_nan());
            assert!(band.get(1, 0).unwrap().is_nan());
        }
    }

    #[test]
    fn shape_mismatch_rejected() {
        let raster = Raster::from_bands(
            vec![Band::filled("b", 2, 2, 1.0)],
            PixelTransform::default(),
        )
        .unwrap();
        let mask = threshold(&Band::filled("m", 3, 3, 1.0), CompareOp::Gt, 0.0);
        assert!(apply_mask(&raster, &mask).is_err());
    }
}
