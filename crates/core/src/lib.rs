//! # Marisma Core
//!
//! Core types and I/O for the marisma raster-processing workspace.
//!
//! This crate provides:
//! - `Raster`: a multi-band, georeferenced scene with typed metadata
//! - `Band`: a named 2-D grid of samples (`NaN` = no-data in memory)
//! - `PixelTransform`: affine georeferencing for north-up grids
//! - `Crs`: coordinate reference system handling
//! - `Zone` / `ZoneCollection`: vector zones with schema-checked attributes
//! - `Table`: tabular results with CSV export
//! - Native multi-band GeoTIFF-style I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod table;
pub mod vector;

pub use crs::Crs;
pub use error::{Error, Result};
pub use raster::{Band, GridSpec, OrbitPass, PixelTransform, Raster, SceneMeta};
pub use table::Table;
pub use vector::{AttributeValue, Zone, ZoneCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::Crs;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{Band, GridSpec, OrbitPass, PixelTransform, Raster, SceneMeta};
    pub use crate::table::Table;
    pub use crate::vector::{AttributeValue, Zone, ZoneCollection};
}
