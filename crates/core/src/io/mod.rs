//! I/O for rasters and tables

mod native;

pub use native::{
    read_raster, read_raster_from_buffer, write_raster, write_raster_to_buffer,
};
