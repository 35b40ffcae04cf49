//! Temporal and spatial (zonal) reduction

mod temporal;
mod zonal;

pub use temporal::{reduce_collection, reduce_collection_with_cancel};
pub use zonal::{reduce_to_zones, sample_at_points};

use marisma_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Aggregation over a set of samples: the time axis of a collection at a
/// fixed pixel, or the pixel set inside a zone.
///
/// Every kind is order-independent (samples are collected first, then
/// reduced) and an empty sample set reduces to no-data, never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReducerKind {
    Mean,
    Median,
    Min,
    Max,
    /// Percentile for k in [0, 100], linear interpolation between order
    /// statistics
    Percentile(f64),
    /// Population standard deviation
    StdDev,
    Sum,
    Count,
}

impl ReducerKind {
    /// Reject out-of-range percentiles at configuration time
    pub fn validate(&self) -> Result<()> {
        if let ReducerKind::Percentile(k) = self {
            if !k.is_finite() || !(0.0..=100.0).contains(k) {
                return Err(Error::InvalidParameter {
                    name: "percentile",
                    value: k.to_string(),
                    reason: "must be in [0, 100]".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Column suffix for zonal tables: `elevation_median`, `mndwi_p98`, ...
    pub fn column_suffix(&self) -> String {
        match self {
            ReducerKind::Mean => "mean".to_string(),
            ReducerKind::Median => "median".to_string(),
            ReducerKind::Min => "min".to_string(),
            ReducerKind::Max => "max".to_string(),
            ReducerKind::Percentile(k) => {
                if k.fract() == 0.0 {
                    format!("p{}", *k as i64)
                } else {
                    format!("p{}", k)
                }
            }
            ReducerKind::StdDev => "stddev".to_string(),
            ReducerKind::Sum => "sum".to_string(),
            ReducerKind::Count => "count".to_string(),
        }
    }

    /// Reduce a set of valid (non-NaN) samples; `None` for an empty set.
    ///
    /// The slice is reordered in place (sorting for order statistics).
    pub fn reduce(&self, samples: &mut [f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        match self {
            ReducerKind::Mean => Some(samples.iter().sum::<f64>() / n),
            ReducerKind::Median => Some(percentile_sorted(sort(samples), 50.0)),
            ReducerKind::Min => samples.iter().copied().reduce(f64::min),
            ReducerKind::Max => samples.iter().copied().reduce(f64::max),
            ReducerKind::Percentile(k) => Some(percentile_sorted(sort(samples), *k)),
            ReducerKind::StdDev => {
                let mean = samples.iter().sum::<f64>() / n;
                let var = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
                Some(var.sqrt())
            }
            ReducerKind::Sum => Some(samples.iter().sum()),
            ReducerKind::Count => Some(samples.len() as f64),
        }
    }
}

fn sort(samples: &mut [f64]) -> &[f64] {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    samples
}

/// Interpolated percentile of an ascending-sorted, non-empty slice.
///
/// Rank = k/100 * (n-1); fractional ranks interpolate linearly between
/// the neighbouring order statistics.
fn percentile_sorted(sorted: &[f64], k: f64) -> f64 {
    let rank = k / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_and_percentile_agree_at_50() {
        let mut a = vec![10.0, 20.0, 30.0];
        let mut b = a.clone();
        assert_eq!(ReducerKind::Median.reduce(&mut a), Some(20.0));
        assert_eq!(ReducerKind::Percentile(50.0).reduce(&mut b), Some(20.0));
    }

    #[test]
    fn even_count_median_interpolates() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(ReducerKind::Median.reduce(&mut values), Some(2.5));
    }

    #[test]
    fn percentile_endpoints_and_interpolation() {
        let mut values = vec![3.0, 1.0, 2.0];
        assert_eq!(ReducerKind::Percentile(0.0).reduce(&mut values), Some(1.0));
        assert_eq!(ReducerKind::Percentile(100.0).reduce(&mut values), Some(3.0));
        assert_eq!(ReducerKind::Percentile(25.0).reduce(&mut values), Some(1.5));
    }

    #[test]
    fn empty_input_is_nodata_for_every_kind() {
        for kind in [
            ReducerKind::Mean,
            ReducerKind::Median,
            ReducerKind::Min,
            ReducerKind::Max,
            ReducerKind::Percentile(98.0),
            ReducerKind::StdDev,
            ReducerKind::Sum,
            ReducerKind::Count,
        ] {
            assert_eq!(kind.reduce(&mut []), None, "{:?}", kind);
        }
    }

    #[test]
    fn stddev_sum_count() {
        let mut values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(ReducerKind::StdDev.reduce(&mut values.clone()), Some(2.0));
        assert_eq!(ReducerKind::Sum.reduce(&mut values.clone()), Some(40.0));
        assert_eq!(ReducerKind::Count.reduce(&mut values), Some(8.0));
    }

    #[test]
    fn percentile_validation() {
        assert!(ReducerKind::Percentile(98.0).validate().is_ok());
        assert!(ReducerKind::Percentile(-1.0).validate().is_err());
        assert!(ReducerKind::Percentile(100.5).validate().is_err());
        assert!(ReducerKind::Percentile(f64::NAN).validate().is_err());
    }

    #[test]
    fn column_suffixes() {
        assert_eq!(ReducerKind::Median.column_suffix(), "median");
        assert_eq!(ReducerKind::Percentile(98.0).column_suffix(), "p98");
        assert_eq!(ReducerKind::Percentile(97.5).column_suffix(), "p97.5");
    }
}
