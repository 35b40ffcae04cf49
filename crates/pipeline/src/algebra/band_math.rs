//! Band math: element-wise operations over aligned bands

use marisma_core::{Band, Error, Raster, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Binary operations for band math
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Min,
    Max,
}

impl BandOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BandOp::Add => a + b,
            BandOp::Subtract => a - b,
            BandOp::Multiply => a * b,
            BandOp::Divide => {
                if b.abs() < 1e-10 {
                    f64::NAN
                } else {
                    a / b
                }
            }
            BandOp::Power => a.powf(b),
            BandOp::Min => a.min(b),
            BandOp::Max => a.max(b),
        }
    }
}

/// Apply a binary operation between two bands element-wise.
///
/// Output keeps the left band's name. No-data in either input produces
/// no-data in the output; division by zero produces no-data, not a panic
/// and not infinity.
pub fn band_binary(a: &Band, b: &Band, op: BandOp) -> Result<Band> {
    check_shapes(a, b)?;
    let (rows, cols) = a.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if va.is_nan() || vb.is_nan() {
                    continue;
                }
                *out = op.apply(va, vb);
            }
            row_data
        })
        .collect();

    build_band(a.name(), rows, cols, data)
}

/// Normalized difference of two aligned bands:
///
/// `(a - b) / (a + b)`
///
/// The workhorse behind NDVI, MNDWI, NBR and friends. Result is in
/// [-1, 1]; pixels where the sum is zero (including a = b = 0) or where
/// either input is no-data come out as no-data. Output band is named
/// `"nd"`; use [`Band::renamed`] for a descriptive name.
pub fn normalized_difference(a: &Band, b: &Band) -> Result<Band> {
    check_shapes(a, b)?;
    let (rows, cols) = a.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if va.is_nan() || vb.is_nan() {
                    continue;
                }
                let sum = va + vb;
                if sum.abs() < 1e-10 {
                    continue;
                }
                *out = (va - vb) / sum;
            }
            row_data
        })
        .collect();

    build_band("nd", rows, cols, data)
}

/// Exact affine calibration `v * scale + offset` over selected bands.
///
/// Converts digital numbers to surface reflectance; the coefficients are
/// the caller's (sensor calibration is catalog knowledge, not engine
/// knowledge). Bands not listed pass through untouched. Unknown band
/// names fail before anything is computed.
pub fn scale_offset(raster: &Raster, bands: &[&str], scale: f64, offset: f64) -> Result<Raster> {
    for name in bands {
        raster.band(name)?;
    }
    raster.map_bands(|band| {
        if bands.contains(&band.name()) {
            Ok(band.map(band.name().to_string(), |v| v * scale + offset))
        } else {
            Ok(band.clone())
        }
    })
}

/// Bitwise AND of an integer-valued band against a constant bit mask.
///
/// Samples are interpreted as two's-complement `i64` (rounded from their
/// `f64` storage); no-data stays no-data. Used for quality-bit decoding
/// of legacy cloud masks; see [`crate::mask::bit_is_set`] for the
/// boolean form.
pub fn bitwise_and(band: &Band, mask: i64) -> Band {
    band.map(band.name().to_string(), |v| {
        ((v.round() as i64) & mask) as f64
    })
}

fn check_shapes(a: &Band, b: &Band) -> Result<()> {
    if a.shape() != b.shape() {
        let (er, ec) = a.shape();
        let (ar, ac) = b.shape();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}

fn build_band(name: &str, rows: usize, cols: usize, data: Vec<f64>) -> Result<Band> {
    let array =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(Band::new(name, array))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(name: &str, value: f64) -> Band {
        Band::filled(name, 3, 3, value)
    }

    #[test]
    fn normalized_difference_matches_formula() {
        let nir = band("nir", 100.0);
        let red = band("red", 50.0);
        let nd = normalized_difference(&nir, &red).unwrap();
        for row in 0..3 {
            for col in 0..3 {
                let v = nd.get(row, col).unwrap();
                assert!((v - 1.0 / 3.0).abs() < 1e-12, "expected 1/3, got {}", v);
            }
        }
    }

    #[test]
    fn normalized_difference_equal_bands_is_zero() {
        let a = band("a", 0.42);
        let nd = normalized_difference(&a, &a).unwrap();
        assert_eq!(nd.get(1, 1).unwrap(), 0.0);
    }

    #[test]
    fn normalized_difference_both_zero_is_nodata() {
        let zero = band("z", 0.0);
        let nd = normalized_difference(&zero, &zero).unwrap();
        assert!(nd.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn nodata_propagates_through_binary_ops() {
        let mut a = band("a", 2.0);
        a.set(0, 0, f64::NAN).unwrap();
        let b = band("b", 3.0);
        let sum = band_binary(&a, &b, BandOp::Add).unwrap();
        assert!(sum.get(0, 0).unwrap().is_nan());
        assert_eq!(sum.get(1, 1).unwrap(), 5.0);
    }

    #[test]
    fn division_by_zero_is_nodata() {
        let a = band("a", 1.0);
        let zero = band("z", 0.0);
        let q = band_binary(&a, &zero, BandOp::Divide).unwrap();
        assert!(q.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn power_op() {
        let a = band("a", 3.0);
        let b = band("b", 2.0);
        let p = band_binary(&a, &b, BandOp::Power).unwrap();
        assert_eq!(p.get(0, 0).unwrap(), 9.0);
    }

    #[test]
    fn scale_offset_is_exact_affine() {
        let raster = marisma_core::Raster::from_bands(
            vec![band("SR_B3", 10_000.0), band("QA_PIXEL", 2.0)],
            marisma_core::PixelTransform::default(),
        )
        .unwrap();
        let calibrated = scale_offset(&raster, &["SR_B3"], 0.0000275, -0.2).unwrap();
        let v = calibrated.band("SR_B3").unwrap().get(0, 0).unwrap();
        assert!((v - (10_000.0 * 0.0000275 - 0.2)).abs() < 1e-15);
        // untouched band passes through
        assert_eq!(calibrated.band("QA_PIXEL").unwrap().get(0, 0).unwrap(), 2.0);
    }

    #[test]
    fn scale_offset_unknown_band_fails_fast() {
        let raster = marisma_core::Raster::from_bands(
            vec![band("SR_B3", 1.0)],
            marisma_core::PixelTransform::default(),
        )
        .unwrap();
        assert!(scale_offset(&raster, &["SR_B9"], 1.0, 0.0).is_err());
    }

    #[test]
    fn bitwise_and_decodes_bits() {
        let qa = band("qa", (1 << 10) as f64);
        let clouds = bitwise_and(&qa, 1 << 10);
        let cirrus = bitwise_and(&qa, 1 << 11);
        assert_eq!(clouds.get(0, 0).unwrap(), (1 << 10) as f64);
        assert_eq!(cirrus.get(0, 0).unwrap(), 0.0);
    }
}
