//! Reduction along the time axis of a collection

use super::ReducerKind;
use crate::cancel::CancelToken;
use crate::collection::RasterCollection;
use log::warn;
use marisma_core::{Band, Raster, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Reduce a collection to one raster, one output band per schema band.
///
/// Each output pixel aggregates that pixel's valid observations across
/// all scenes; no-data samples are skipped, and a pixel with no valid
/// observation at all comes out as no-data. The result is independent of
/// scene order for every [`ReducerKind`].
///
/// An empty collection is not an error: the output is an all-no-data
/// raster with the collection's declared band schema and grid.
pub fn reduce_collection(collection: &RasterCollection, kind: ReducerKind) -> Result<Raster> {
    reduce_collection_with_cancel(collection, kind, &CancelToken::new())
}

/// [`reduce_collection`] with cancellation checked between scenes
pub fn reduce_collection_with_cancel(
    collection: &RasterCollection,
    kind: ReducerKind,
    cancel: &CancelToken,
) -> Result<Raster> {
    kind.validate()?;

    let grid = collection.grid();
    let (rows, cols) = (grid.rows, grid.cols);
    let mut output = Raster::new(grid.transform);
    output.set_crs(grid.crs.clone());

    if collection.is_empty() {
        warn!(
            "reducing an empty collection ({} bands); output is all no-data",
            collection.schema().len()
        );
        for name in collection.schema() {
            output.push_band(Band::new(
                name.clone(),
                Array2::from_elem((rows, cols), f64::NAN),
            ))?;
        }
        return Ok(output);
    }

    for name in collection.schema() {
        let mut stack: Vec<&Band> = Vec::with_capacity(collection.len());
        for scene in collection.iter() {
            cancel.check()?;
            stack.push(scene.band(name)?);
        }

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                let mut samples = Vec::with_capacity(stack.len());
                for (col, out) in row_data.iter_mut().enumerate() {
                    samples.clear();
                    for band in &stack {
                        let v = unsafe { band.get_unchecked(row, col) };
                        if !v.is_nan() {
                            samples.push(v);
                        }
                    }
                    if let Some(reduced) = kind.reduce(&mut samples) {
                        *out = reduced;
                    }
                }
                row_data
            })
            .collect();

        output.push_band(Band::from_vec(name.clone(), data, rows, cols)?)?;
    }

    Ok(output)
}
