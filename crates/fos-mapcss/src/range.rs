//! Scale Ranges
//!
//! Half-open scale intervals `(lower, upper]` in meters per pixel, and the
//! conversion from zoom levels.

use std::f64::consts::PI;

use crate::MapCssError;

/// Equatorial radius used by the zoom level conversion
const EARTH_RADIUS: f64 = 6_378_135.0;

/// Half-open interval `(lower, upper]` with `0 <= lower < upper`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRange {
    lower: f64,
    upper: f64,
}

impl ScaleRange {
    /// `(0, ∞]`
    pub const ALL: ScaleRange = ScaleRange { lower: 0.0, upper: f64::INFINITY };

    /// Validated constructor
    pub fn new(lower: f64, upper: f64) -> Result<Self, MapCssError> {
        if lower.is_nan() || upper.is_nan() || lower < 0.0 || lower >= upper {
            return Err(MapCssError::InvalidRange { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn contains(&self, scale: f64) -> bool {
        self.lower < scale && scale <= self.upper
    }

    /// Intersection; `None` if empty
    pub fn intersect(&self, other: &ScaleRange) -> Option<ScaleRange> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        (lower < upper).then_some(ScaleRange { lower, upper })
    }

    /// Shrink this range to the part around `scale` that does not overlap
    /// `other`, when `other` does not contain `scale`
    pub fn reduce_around(&self, scale: f64, other: &ScaleRange) -> ScaleRange {
        if scale <= other.lower && other.lower < self.upper {
            return ScaleRange { lower: self.lower, upper: other.lower.max(self.lower) };
        }
        if self.lower < other.upper && other.upper < scale {
            return ScaleRange { lower: other.upper.min(self.upper), upper: self.upper };
        }
        *self
    }

    /// Convert a zoom interval to a scale range; either bound may be open
    ///
    /// Zoom `N..=M` covers `(scale(M + 1), scale(N)]`.
    pub fn from_zoom(min_zoom: Option<u32>, max_zoom: Option<u32>) -> Result<Self, MapCssError> {
        let upper = min_zoom.map_or(f64::INFINITY, level_to_scale);
        let lower = max_zoom.map_or(0.0, |z| level_to_scale(z.saturating_add(1)));
        Self::new(lower, upper)
    }
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// Deepest zoom level accepted in style sheets
pub const MAX_ZOOM: u32 = 30;

/// Scale in meters per pixel at a zoom level
pub fn level_to_scale(level: u32) -> f64 {
    let exponent = i32::try_from(level).unwrap_or(i32::MAX);
    2.0 * PI * EARTH_RADIUS / (2f64.powi(exponent) * 256.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_open_containment() {
        let r = ScaleRange::new(1000.0, 5000.0).unwrap();
        assert!(r.contains(2500.0));
        assert!(r.contains(5000.0));
        assert!(!r.contains(1000.0));
        assert!(!r.contains(500.0));
        assert!(!r.contains(6000.0));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(ScaleRange::new(5.0, 5.0).is_err());
        assert!(ScaleRange::new(-1.0, 5.0).is_err());
        assert!(ScaleRange::new(6.0, 5.0).is_err());
    }

    #[test]
    fn test_intersect() {
        let a = ScaleRange::new(0.0, 10.0).unwrap();
        let b = ScaleRange::new(5.0, 20.0).unwrap();
        assert_eq!(a.intersect(&b), Some(ScaleRange::new(5.0, 10.0).unwrap()));
        let c = ScaleRange::new(10.0, 20.0).unwrap();
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_reduce_around() {
        let all = ScaleRange::ALL;
        let rule = ScaleRange::new(1000.0, 5000.0).unwrap();

        // Query below the rule range: valid up to the rule's lower edge
        assert_eq!(all.reduce_around(500.0, &rule), ScaleRange::new(0.0, 1000.0).unwrap());

        // Query above: valid from the rule's upper edge
        let reduced = all.reduce_around(6000.0, &rule);
        assert_eq!(reduced.lower(), 5000.0);
        assert_eq!(reduced.upper(), f64::INFINITY);
    }

    #[test]
    fn test_from_zoom() {
        let z = ScaleRange::from_zoom(Some(10), Some(12)).unwrap();
        assert!(z.contains(level_to_scale(10)));
        assert!(z.contains(level_to_scale(12)));
        assert!(!z.contains(level_to_scale(13)));
        assert!(!z.contains(level_to_scale(9)));

        let open = ScaleRange::from_zoom(Some(15), None).unwrap();
        assert!(open.contains(0.01));
    }

    #[test]
    fn test_huge_zoom_does_not_overflow() {
        let z = ScaleRange::from_zoom(Some(0), Some(u32::MAX)).unwrap();
        assert_eq!(z.lower(), 0.0);
        assert_eq!(level_to_scale(u32::MAX), 0.0);
    }
}
