//! Value-range reclassification
//!
//! Maps continuous index values to categorical classes via an ordered
//! rule list, first match wins. This replaces chained conditional
//! expressions for NDVI-style class maps.

use marisma_core::Band;

/// One reclassification rule: `[min, max)` → `class`
#[derive(Debug, Clone, Copy)]
pub struct ReclassRule {
    pub min: f64,
    pub max: f64,
    pub class: f64,
}

impl ReclassRule {
    pub fn new(min: f64, max: f64, class: f64) -> Self {
        Self { min, max, class }
    }

    fn matches(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }
}

/// Reclassify a band with an ordered first-match rule list.
///
/// Values matching no rule get `default`; no-data stays no-data. Rules
/// use half-open `[min, max)` ranges, so give the final class a max just
/// above the data ceiling (e.g. `1.01` for an index bounded by 1).
pub fn reclassify(band: &Band, rules: &[ReclassRule], default: f64) -> Band {
    band.map(band.name().to_string(), |v| {
        rules
            .iter()
            .find(|r| r.matches(v))
            .map(|r| r.class)
            .unwrap_or(default)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ndvi_rules() -> Vec<ReclassRule> {
        vec![
            ReclassRule::new(-1.0, 0.2, 1.0), // sparse
            ReclassRule::new(0.2, 0.5, 2.0),  // moderate
            ReclassRule::new(0.5, 1.01, 3.0), // dense
        ]
    }

    #[test]
    fn first_match_wins_in_order() {
        let overlapping = vec![
            ReclassRule::new(0.0, 1.0, 10.0),
            ReclassRule::new(0.0, 0.5, 20.0),
        ];
        let band = Band::filled("ndvi", 2, 2, 0.25);
        let out = reclassify(&band, &overlapping, 0.0);
        assert_eq!(out.get(0, 0).unwrap(), 10.0);
    }

    #[test]
    fn ndvi_class_map() {
        let mut band = Band::filled("ndvi", 1, 3, 0.0);
        band.set(0, 0, 0.1).unwrap();
        band.set(0, 1, 0.35).unwrap();
        band.set(0, 2, 0.8).unwrap();
        let out = reclassify(&band, &ndvi_rules(), f64::NAN);
        assert_eq!(out.get(0, 0).unwrap(), 1.0);
        assert_eq!(out.get(0, 1).unwrap(), 2.0);
        assert_eq!(out.get(0, 2).unwrap(), 3.0);
    }

    #[test]
    fn unmatched_gets_default_and_nodata_survives() {
        let mut band = Band::filled("ndvi", 1, 2, 5.0);
        band.set(0, 1, f64::NAN).unwrap();
        let out = reclassify(&band, &ndvi_rules(), -1.0);
        assert_eq!(out.get(0, 0).unwrap(), -1.0);
        assert!(out.get(0, 1).unwrap().is_nan());
    }
}
