//! Supervised classification seam
//!
//! The pipeline produces training tables ([`sample_at_points`]) and
//! consumes per-pixel label rasters; the classifier in between is a
//! pluggable component behind the [`Trainer`]/[`Model`] traits. A
//! nearest-centroid implementation is included so the whole train →
//! classify → evaluate loop works out of the box; anything smarter
//! (trees, forests) plugs in without touching the pipeline.
//!
//! External classifier failures should be surfaced as
//! [`Error::External`] naming the operation and input, never retried
//! here.
//!
//! [`sample_at_points`]: crate::reduce::sample_at_points

use marisma_core::{Band, Error, Raster, Result, Table};
use ndarray::Array2;
use rayon::prelude::*;

/// A trained per-pixel classifier
pub trait Model: Send + Sync {
    /// Feature column/band names, in the order `predict` expects
    fn feature_names(&self) -> &[String];

    /// Label for one feature vector; inputs are guaranteed finite
    fn predict(&self, features: &[f64]) -> f64;
}

/// Builds a [`Model`] from a training table
pub trait Trainer {
    fn train(
        &self,
        table: &Table,
        feature_columns: &[&str],
        label_column: &str,
    ) -> Result<Box<dyn Model>>;
}

/// Minimum-distance classifier: each pixel gets the label of the nearest
/// class centroid in feature space.
#[derive(Debug, Clone, Default)]
pub struct NearestCentroid;

struct CentroidModel {
    features: Vec<String>,
    /// (label, centroid) per class
    classes: Vec<(f64, Vec<f64>)>,
}

impl Model for CentroidModel {
    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let mut best = f64::INFINITY;
        let mut label = f64::NAN;
        for (class, centroid) in &self.classes {
            let dist: f64 = centroid
                .iter()
                .zip(features)
                .map(|(c, f)| (c - f) * (c - f))
                .sum();
            if dist < best {
                best = dist;
                label = *class;
            }
        }
        label
    }
}

impl Trainer for NearestCentroid {
    fn train(
        &self,
        table: &Table,
        feature_columns: &[&str],
        label_column: &str,
    ) -> Result<Box<dyn Model>> {
        let feature_values: Vec<Vec<Option<f64>>> = feature_columns
            .iter()
            .map(|c| table.numeric_column(c))
            .collect::<Result<_>>()?;
        let labels = table.numeric_column(label_column)?;

        // label (keyed by rounded value) -> (sum per feature, count)
        let mut accumulators: std::collections::BTreeMap<i64, (f64, Vec<f64>, usize)> =
            std::collections::BTreeMap::new();

        for row in 0..table.num_rows() {
            let Some(label) = labels[row] else { continue };
            let features: Option<Vec<f64>> = feature_values
                .iter()
                .map(|col| col[row].filter(|v| v.is_finite()))
                .collect();
            let Some(features) = features else { continue };

            let entry = accumulators
                .entry(label.round() as i64)
                .or_insert_with(|| (label, vec![0.0; feature_columns.len()], 0));
            for (sum, v) in entry.1.iter_mut().zip(&features) {
                *sum += v;
            }
            entry.2 += 1;
        }

        if accumulators.len() < 2 {
            return Err(Error::InvalidParameter {
                name: "training",
                value: accumulators.len().to_string(),
                reason: "at least 2 classes with valid samples are required".to_string(),
            });
        }

        let classes = accumulators
            .into_values()
            .map(|(label, sums, count)| {
                (label, sums.into_iter().map(|s| s / count as f64).collect())
            })
            .collect();

        Ok(Box::new(CentroidModel {
            features: feature_columns.iter().map(|c| c.to_string()).collect(),
            classes,
        }))
    }
}

/// Per-pixel label assignment: one pass over the model's feature bands.
///
/// Missing feature bands fail before evaluation. A pixel with no-data in
/// any feature band gets a no-data label. Output is a single-band raster
/// named `"classification"` on the source grid.
pub fn classify(raster: &Raster, model: &dyn Model) -> Result<Raster> {
    let bands: Vec<&Band> = model
        .feature_names()
        .iter()
        .map(|name| raster.band(name))
        .collect::<Result<_>>()?;
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut features = vec![0.0f64; bands.len()];
            'pixels: for (col, out) in row_data.iter_mut().enumerate() {
                for (slot, band) in features.iter_mut().zip(&bands) {
                    let v = unsafe { band.get_unchecked(row, col) };
                    if !v.is_finite() {
                        continue 'pixels;
                    }
                    *slot = v;
                }
                *out = model.predict(&features);
            }
            row_data
        })
        .collect();

    let mut output = raster.like_empty();
    output.push_band(Band::new(
        "classification",
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?,
    ))?;
    Ok(output)
}

/// Confusion matrix over (actual, predicted) label pairs.
///
/// Rows index actual classes, columns predicted classes, both in
/// ascending label order.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    labels: Vec<i64>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from label pairs; pairs with a no-data side are skipped
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        let mut labels: Vec<i64> = pairs
            .iter()
            .filter(|(a, p)| a.is_finite() && p.is_finite())
            .flat_map(|(a, p)| [a.round() as i64, p.round() as i64])
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let n = labels.len();
        let mut counts = vec![vec![0usize; n]; n];
        for (actual, predicted) in pairs {
            if !actual.is_finite() || !predicted.is_finite() {
                continue;
            }
            let i = labels.binary_search(&(actual.round() as i64)).expect("label indexed");
            let j = labels
                .binary_search(&(predicted.round() as i64))
                .expect("label indexed");
            counts[i][j] += 1;
        }
        Self { labels, counts }
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn count(&self, actual: i64, predicted: i64) -> usize {
        match (
            self.labels.binary_search(&actual),
            self.labels.binary_search(&predicted),
        ) {
            (Ok(i), Ok(j)) => self.counts[i][j],
            _ => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Fraction of correctly classified samples
    pub fn overall_accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return f64::NAN;
        }
        let diagonal: usize = (0..self.labels.len()).map(|i| self.counts[i][i]).sum();
        diagonal as f64 / total as f64
    }

    /// Per-class producer's accuracy (1 - omission error), label-ordered
    pub fn producers_accuracy(&self) -> Vec<f64> {
        (0..self.labels.len())
            .map(|i| {
                let row_total: usize = self.counts[i].iter().sum();
                if row_total == 0 {
                    f64::NAN
                } else {
                    self.counts[i][i] as f64 / row_total as f64
                }
            })
            .collect()
    }

    /// Per-class consumer's (user's) accuracy (1 - commission error)
    pub fn consumers_accuracy(&self) -> Vec<f64> {
        (0..self.labels.len())
            .map(|j| {
                let col_total: usize = (0..self.labels.len()).map(|i| self.counts[i][j]).sum();
                if col_total == 0 {
                    f64::NAN
                } else {
                    self.counts[j][j] as f64 / col_total as f64
                }
            })
            .collect()
    }

    /// Cohen's kappa: agreement beyond chance
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return f64::NAN;
        }
        let observed = self.overall_accuracy();
        let expected: f64 = (0..self.labels.len())
            .map(|i| {
                let row: usize = self.counts[i].iter().sum();
                let col: usize = (0..self.labels.len()).map(|r| self.counts[r][i]).sum();
                (row as f64 / total) * (col as f64 / total)
            })
            .sum();
        if (1.0 - expected).abs() < 1e-12 {
            return f64::NAN;
        }
        (observed - expected) / (1.0 - expected)
    }
}

/// Classify a validation table and compare against its label column.
///
/// Rows with no-data in any feature or in the label are skipped; row
/// identity ordering is preserved while pairing.
pub fn evaluate(
    model: &dyn Model,
    table: &Table,
    feature_columns: &[&str],
    label_column: &str,
) -> Result<ConfusionMatrix> {
    let feature_values: Vec<Vec<Option<f64>>> = feature_columns
        .iter()
        .map(|c| table.numeric_column(c))
        .collect::<Result<_>>()?;
    let labels = table.numeric_column(label_column)?;

    let mut pairs = Vec::with_capacity(table.num_rows());
    for row in 0..table.num_rows() {
        let Some(actual) = labels[row] else { continue };
        let features: Option<Vec<f64>> = feature_values
            .iter()
            .map(|col| col[row].filter(|v| v.is_finite()))
            .collect();
        let Some(features) = features else { continue };
        pairs.push((actual, model.predict(&features)));
    }

    Ok(ConfusionMatrix::from_pairs(&pairs))
}
