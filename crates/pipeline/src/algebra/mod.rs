//! Per-pixel band algebra
//!
//! Everything here is pixel-local and pure: no-data (`NaN`) in any input
//! operand produces no-data in the output, and numeric edge cases
//! (division by zero, log of non-positive values) resolve to no-data at
//! the pixel instead of raising.

mod band_math;
mod expr;
mod indices;
mod reclassify;

pub use band_math::{band_binary, bitwise_and, normalized_difference, scale_offset, BandOp};
pub use expr::Expression;
pub use indices::{mndwi, ndvi, savi, SaviParams};
pub use reclassify::{reclassify, ReclassRule};
