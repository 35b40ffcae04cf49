//! # Marisma Pipeline
//!
//! Multi-temporal raster processing: filter scene collections by
//! space/time/quality, run per-pixel band algebra, reduce over the time
//! axis, mask by threshold and reduce over vector zones into tables.
//!
//! ## Stages
//!
//! - **collection**: [`RasterCollection`] + [`SceneFilter`] (filter/merge/map)
//! - **algebra**: band math, normalized difference, calibration,
//!   expression evaluation, reclassification
//! - **reduce**: temporal reduction and zonal statistics
//! - **mask**: thresholds, boolean combinators, quality-bit decoding
//! - **classify**: pluggable supervised-classification seam
//! - **catalog**: abstract scene sources with LRU caching
//! - **terrain**: slope/aspect derivatives for DEM stacks
//!
//! All stages are functional: inputs are never mutated, every stage
//! produces new rasters or tables.
//!
//! [`RasterCollection`]: collection::RasterCollection
//! [`SceneFilter`]: collection::SceneFilter

pub mod algebra;
pub mod cancel;
pub mod catalog;
pub mod classify;
pub mod collection;
pub mod config;
pub mod mask;
pub mod reduce;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::algebra::{
        band_binary, bitwise_and, mndwi, ndvi, normalized_difference, reclassify, savi,
        scale_offset, BandOp, Expression, ReclassRule, SaviParams,
    };
    pub use crate::cancel::CancelToken;
    pub use crate::catalog::{CachingCatalog, MemoryCatalog, RasterCatalog};
    pub use crate::classify::{classify, evaluate, ConfusionMatrix, Model, NearestCentroid, Trainer};
    pub use crate::collection::{RasterCollection, SceneFilter};
    pub use crate::config::PipelineConfig;
    pub use crate::mask::{apply_mask, bit_is_set, threshold, CompareOp, Mask};
    pub use crate::reduce::{
        reduce_collection, reduce_to_zones, sample_at_points, ReducerKind,
    };
    pub use crate::terrain::{aspect, slope, SlopeParams, SlopeUnits};
    pub use marisma_core::prelude::*;
}
