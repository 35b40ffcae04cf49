//! Spectral index shorthands
//!
//! Thin wrappers over [`normalized_difference`] and [`Expression`] for
//! the indices the analysis scripts reach for constantly. Band names are
//! the caller's (schemas differ per sensor); outputs carry the index
//! name.

use super::band_math::normalized_difference;
use super::expr::Expression;
use marisma_core::{Band, Raster, Result};

/// Normalized Difference Vegetation Index: `(nir - red) / (nir + red)`.
///
/// Dense vegetation ≳ 0.5, bare soil around 0.1-0.2, water below 0.
pub fn ndvi(raster: &Raster, nir: &str, red: &str) -> Result<Band> {
    Ok(normalized_difference(raster.band(nir)?, raster.band(red)?)?.renamed("ndvi"))
}

/// Modified Normalized Difference Water Index (Xu, 2006):
/// `(green - swir) / (green + swir)`. Positive values indicate water.
pub fn mndwi(raster: &Raster, green: &str, swir: &str) -> Result<Band> {
    Ok(normalized_difference(raster.band(green)?, raster.band(swir)?)?.renamed("mndwi"))
}

/// Parameters for SAVI
#[derive(Debug, Clone)]
pub struct SaviParams {
    /// Soil brightness correction factor; 0.5 suits mixed cover
    pub l_factor: f64,
}

impl Default for SaviParams {
    fn default() -> Self {
        Self { l_factor: 0.5 }
    }
}

/// Soil Adjusted Vegetation Index (Huete, 1988):
///
/// `((nir - red) / (nir + red + L)) * (1 + L)`
pub fn savi(raster: &Raster, nir: &str, red: &str, params: SaviParams) -> Result<Band> {
    let l = params.l_factor;
    let expr = Expression::parse(&format!(
        "((nir - red) / (nir + red + {})) * (1 + {})",
        l, l
    ))?;
    Ok(expr
        .evaluate_on(raster, &[("nir", nir), ("red", red)])?
        .renamed("savi"))
}
