//! Vector zones with schema-checked attributes

use crate::error::{Error, Result};
use geo::Area;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute value for zone records and table cells.
///
/// `Null` is the tabular no-data state; it serializes to an empty CSV
/// field, keeping "no valid measurement" distinct from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Numeric view; `None` for Null/Bool/Text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

/// A vector zone: point or polygon geometry plus an attribute record.
///
/// Geometry is validated once, at construction; reducers downstream can
/// assume finite, non-degenerate shapes.
#[derive(Debug, Clone)]
pub struct Zone {
    geometry: Geometry<f64>,
    attributes: BTreeMap<String, AttributeValue>,
}

impl Zone {
    pub fn new(
        geometry: Geometry<f64>,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<Self> {
        validate_geometry(&geometry)?;
        Ok(Self {
            geometry,
            attributes,
        })
    }

    /// Point zone shorthand
    pub fn point(x: f64, y: f64, attributes: BTreeMap<String, AttributeValue>) -> Result<Self> {
        Self::new(Geometry::Point(geo_types::Point::new(x, y)), attributes)
    }

    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, field: &str) -> Option<&AttributeValue> {
        self.attributes.get(field)
    }

    pub fn is_point(&self) -> bool {
        matches!(self.geometry, Geometry::Point(_))
    }
}

fn validate_geometry(geometry: &Geometry<f64>) -> Result<()> {
    match geometry {
        Geometry::Point(p) => {
            if !p.x().is_finite() || !p.y().is_finite() {
                return Err(Error::InvalidGeometry(
                    "point has non-finite coordinates".to_string(),
                ));
            }
            Ok(())
        }
        Geometry::Polygon(poly) => validate_polygon(poly),
        Geometry::MultiPolygon(mp) => {
            if mp.0.is_empty() {
                return Err(Error::InvalidGeometry("empty multi-polygon".to_string()));
            }
            for poly in &mp.0 {
                validate_polygon(poly)?;
            }
            Ok(())
        }
        other => Err(Error::InvalidGeometry(format!(
            "unsupported zone geometry: {:?}",
            std::mem::discriminant(other)
        ))),
    }
}

fn validate_polygon(poly: &geo_types::Polygon<f64>) -> Result<()> {
    let exterior = poly.exterior();
    if exterior.0.len() < 4 {
        return Err(Error::InvalidGeometry(
            "polygon exterior ring needs at least 4 coordinates".to_string(),
        ));
    }
    if exterior.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(Error::InvalidGeometry(
            "polygon has non-finite coordinates".to_string(),
        ));
    }
    if !exterior.is_closed() {
        return Err(Error::InvalidGeometry(
            "polygon exterior ring is not closed".to_string(),
        ));
    }
    if poly.unsigned_area() <= 0.0 {
        return Err(Error::InvalidGeometry("polygon has zero area".to_string()));
    }
    Ok(())
}

/// An ordered set of zones sharing one field schema.
///
/// The schema is fixed when the collection is built; pushing a zone whose
/// attribute keys differ is an input error, so every downstream table row
/// has the same columns.
#[derive(Debug, Clone)]
pub struct ZoneCollection {
    fields: Vec<String>,
    zones: Vec<Zone>,
}

impl ZoneCollection {
    /// Create an empty collection with a declared field schema
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            zones: Vec::new(),
        }
    }

    /// Build a collection from zones, taking the schema from the first
    pub fn from_zones(zones: Vec<Zone>) -> Result<Self> {
        let fields: Vec<String> = zones
            .first()
            .map(|z| z.attributes.keys().cloned().collect())
            .unwrap_or_default();
        let mut collection = Self::new(fields);
        for zone in zones {
            collection.push(zone)?;
        }
        Ok(collection)
    }

    pub fn push(&mut self, zone: Zone) -> Result<()> {
        let keys: Vec<&String> = zone.attributes.keys().collect();
        if keys.len() != self.fields.len()
            || !self.fields.iter().all(|f| zone.attributes.contains_key(f))
        {
            return Err(Error::SchemaMismatch {
                left: self.fields.clone(),
                right: keys.into_iter().cloned().collect(),
            });
        }
        self.zones.push(zone);
        Ok(())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    /// Keep only zones matching a predicate (schema unchanged)
    pub fn filter(&self, predicate: impl Fn(&Zone) -> bool) -> ZoneCollection {
        ZoneCollection {
            fields: self.fields.clone(),
            zones: self.zones.iter().filter(|z| predicate(z)).cloned().collect(),
        }
    }

    /// Keep only the named attribute fields on every zone
    pub fn select_fields(&self, fields: &[&str]) -> Result<ZoneCollection> {
        for field in fields {
            if !self.fields.iter().any(|f| f == field) {
                return Err(Error::Table(format!("unknown zone field '{}'", field)));
            }
        }
        let kept: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let zones = self
            .zones
            .iter()
            .map(|z| Zone {
                geometry: z.geometry.clone(),
                attributes: z
                    .attributes
                    .iter()
                    .filter(|(k, _)| kept.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect();
        Ok(ZoneCollection {
            fields: kept,
            zones,
        })
    }
}
