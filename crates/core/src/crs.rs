//! Coordinate Reference System handling

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation.
///
/// Stores whichever of EPSG code, WKT or PROJ string the source provided;
/// equivalence is checked on the strongest shared representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    epsg: Option<u32>,
    wkt: Option<String>,
    proj: Option<String>,
}

impl Crs {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: None,
            proj: Some(proj.into()),
        }
    }

    /// Parse an identifier such as `"EPSG:32629"`.
    ///
    /// Strings starting with `+` are treated as PROJ, strings containing
    /// `[` as WKT; anything else must be an `EPSG:<code>` identifier.
    pub fn parse(ident: &str) -> Result<Self> {
        let trimmed = ident.trim();
        if let Some(code) = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
        {
            let code = code.parse::<u32>().map_err(|_| Error::InvalidParameter {
                name: "crs",
                value: ident.to_string(),
                reason: "EPSG code is not a number".to_string(),
            })?;
            return Ok(Self::from_epsg(code));
        }
        if trimmed.starts_with('+') {
            return Ok(Self::from_proj(trimmed));
        }
        if trimmed.contains('[') {
            return Ok(Self::from_wkt(trimmed));
        }
        Err(Error::InvalidParameter {
            name: "crs",
            value: ident.to_string(),
            reason: "expected EPSG:<code>, WKT or PROJ string".to_string(),
        })
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether this CRS uses geographic (degree) coordinates.
    ///
    /// Only decidable from an EPSG code; unknown representations are
    /// assumed projected.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326) | Some(4258) | Some(4269))
    }

    /// Check whether two CRS refer to the same system
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return a == b;
        }
        false
    }

    /// A short string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", &wkt[..wkt.len().min(50)]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_epsg() {
        let crs = Crs::parse("EPSG:32629").unwrap();
        assert_eq!(crs.epsg(), Some(32629));
        assert_eq!(crs.identifier(), "EPSG:32629");
        assert!(!crs.is_geographic());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Crs::parse("not-a-crs").is_err());
        assert!(Crs::parse("EPSG:abc").is_err());
    }

    #[test]
    fn equivalence_on_epsg() {
        assert!(Crs::from_epsg(4326).is_equivalent(&Crs::wgs84()));
        assert!(!Crs::from_epsg(4326).is_equivalent(&Crs::from_epsg(3857)));
    }
}
