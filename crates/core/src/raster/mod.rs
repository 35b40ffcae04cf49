//! Raster data structures

mod band;
mod scene;
mod transform;

pub use band::Band;
pub use scene::{GridSpec, OrbitPass, Raster, SceneMeta};
pub use transform::PixelTransform;
