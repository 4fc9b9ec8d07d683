//! Geometry Primitives
//!
//! Coordinates, bounding boxes, segment classification, point-in-polygon
//! and winding order. Longitude is the x axis, latitude the y axis.

/// Tolerance for orientation tests
const EPSILON: f64 = 1e-12;

/// Geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned bounding box (inclusive edges)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BBox {
    /// Degenerate box around a single point
    pub fn from_point(p: LatLon) -> Self {
        Self {
            min_lat: p.lat,
            min_lon: p.lon,
            max_lat: p.lat,
            max_lon: p.lon,
        }
    }

    /// Smallest box enclosing all points, `None` for an empty slice
    pub fn from_points(points: &[LatLon]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::from_point(*first);
        for p in rest {
            bbox.extend(*p);
        }
        Some(bbox)
    }

    /// Grow to include a point
    pub fn extend(&mut self, p: LatLon) {
        self.min_lat = self.min_lat.min(p.lat);
        self.min_lon = self.min_lon.min(p.lon);
        self.max_lat = self.max_lat.max(p.lat);
        self.max_lon = self.max_lon.max(p.lon);
    }

    /// Box enclosing both boxes
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min_lat: self.min_lat.min(other.min_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lat: self.max_lat.max(other.max_lat),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    /// Check if boxes intersect (touching edges count)
    pub fn intersects(&self, other: &BBox) -> bool {
        !(self.max_lon < other.min_lon
            || self.min_lon > other.max_lon
            || self.max_lat < other.min_lat
            || self.min_lat > other.max_lat)
    }

    /// Check if point is inside
    pub fn contains_point(&self, p: LatLon) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }

    /// Check if another box lies completely inside this one
    pub fn contains(&self, other: &BBox) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }
}

/// How two segments relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRelation {
    /// No common point
    Disjoint,
    /// Proper intersection in the interior of both segments
    Crossing,
    /// Exactly one common point that is an endpoint of at least one segment
    Touching,
    /// Collinear with a shared stretch of positive length
    Overlapping,
}

/// Signed area of the triangle (a, b, c) times two
fn orientation(a: LatLon, b: LatLon, c: LatLon) -> f64 {
    (b.lon - a.lon) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lon - a.lon)
}

fn sign(v: f64) -> i8 {
    if v > EPSILON {
        1
    } else if v < -EPSILON {
        -1
    } else {
        0
    }
}

/// Check if `p`, known to be collinear with (a, b), lies on the segment
fn on_segment(a: LatLon, b: LatLon, p: LatLon) -> bool {
    p.lon >= a.lon.min(b.lon) - EPSILON
        && p.lon <= a.lon.max(b.lon) + EPSILON
        && p.lat >= a.lat.min(b.lat) - EPSILON
        && p.lat <= a.lat.max(b.lat) + EPSILON
}

/// Classify the segments (a1, a2) and (b1, b2)
pub fn classify_segments(a1: LatLon, a2: LatLon, b1: LatLon, b2: LatLon) -> SegmentRelation {
    let o1 = sign(orientation(a1, a2, b1));
    let o2 = sign(orientation(a1, a2, b2));
    let o3 = sign(orientation(b1, b2, a1));
    let o4 = sign(orientation(b1, b2, a2));

    if o1 == 0 && o2 == 0 && o3 == 0 && o4 == 0 {
        return classify_collinear(a1, a2, b1, b2);
    }

    if o1 * o2 < 0 && o3 * o4 < 0 {
        return SegmentRelation::Crossing;
    }

    let touches = (o1 == 0 && on_segment(a1, a2, b1))
        || (o2 == 0 && on_segment(a1, a2, b2))
        || (o3 == 0 && on_segment(b1, b2, a1))
        || (o4 == 0 && on_segment(b1, b2, a2));

    if touches {
        SegmentRelation::Touching
    } else {
        SegmentRelation::Disjoint
    }
}

fn classify_collinear(a1: LatLon, a2: LatLon, b1: LatLon, b2: LatLon) -> SegmentRelation {
    // Project on the dominant axis
    let use_lon = (a2.lon - a1.lon).abs() + (b2.lon - b1.lon).abs()
        >= (a2.lat - a1.lat).abs() + (b2.lat - b1.lat).abs();
    let project = |p: LatLon| if use_lon { p.lon } else { p.lat };

    let (a_lo, a_hi) = min_max(project(a1), project(a2));
    let (b_lo, b_hi) = min_max(project(b1), project(b2));
    let lo = a_lo.max(b_lo);
    let hi = a_hi.min(b_hi);

    if hi - lo > EPSILON {
        SegmentRelation::Overlapping
    } else if (hi - lo).abs() <= EPSILON {
        SegmentRelation::Touching
    } else {
        SegmentRelation::Disjoint
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Ray casting test; points on the boundary count as inside
pub fn point_in_polygon(p: LatLon, ring: &[LatLon]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];

        if sign(orientation(a, b, p)) == 0 && on_segment(a, b, p) {
            return true;
        }

        if (a.lat > p.lat) != (b.lat > p.lat) {
            let x = (b.lon - a.lon) * (p.lat - a.lat) / (b.lat - a.lat) + a.lon;
            if p.lon < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Shoelace area; positive for counter-clockwise rings
pub fn signed_area(ring: &[LatLon]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        sum += a.lon * b.lat - b.lon * a.lat;
    }
    sum / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> LatLon {
        LatLon::new(lat, lon)
    }

    #[test]
    fn test_crossing_segments() {
        let rel = classify_segments(p(0.0, 0.0), p(1.0, 1.0), p(0.0, 1.0), p(1.0, 0.0));
        assert_eq!(rel, SegmentRelation::Crossing);
    }

    #[test]
    fn test_touching_segments() {
        // T-junction at the endpoint of the second segment
        let rel = classify_segments(p(0.0, 0.0), p(0.0, 2.0), p(0.0, 1.0), p(1.0, 1.0));
        assert_eq!(rel, SegmentRelation::Touching);

        // Shared endpoint
        let rel = classify_segments(p(0.0, 0.0), p(1.0, 1.0), p(1.0, 1.0), p(2.0, 0.0));
        assert_eq!(rel, SegmentRelation::Touching);
    }

    #[test]
    fn test_overlapping_and_disjoint() {
        let rel = classify_segments(p(0.0, 0.0), p(0.0, 2.0), p(0.0, 1.0), p(0.0, 3.0));
        assert_eq!(rel, SegmentRelation::Overlapping);

        let rel = classify_segments(p(0.0, 0.0), p(0.0, 1.0), p(0.0, 2.0), p(0.0, 3.0));
        assert_eq!(rel, SegmentRelation::Disjoint);

        let rel = classify_segments(p(0.0, 0.0), p(1.0, 0.0), p(0.0, 1.0), p(1.0, 1.0));
        assert_eq!(rel, SegmentRelation::Disjoint);
    }

    #[test]
    fn test_point_in_polygon() {
        let square = [p(0.0, 0.0), p(0.0, 2.0), p(2.0, 2.0), p(2.0, 0.0)];
        assert!(point_in_polygon(p(1.0, 1.0), &square));
        assert!(point_in_polygon(p(0.0, 1.0), &square));
        assert!(!point_in_polygon(p(3.0, 1.0), &square));
        assert!(!point_in_polygon(p(1.0, 1.0), &square[..2]));
    }

    #[test]
    fn test_signed_area_winding() {
        let ccw = [p(0.0, 0.0), p(0.0, 1.0), p(1.0, 1.0), p(1.0, 0.0)];
        assert!(signed_area(&ccw) > 0.0);
        let cw: Vec<_> = ccw.iter().rev().copied().collect();
        assert!(signed_area(&cw) < 0.0);
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BBox::from_points(&[p(0.0, 0.0), p(1.0, 1.0)]).unwrap();
        let b = BBox::from_points(&[p(1.0, 1.0), p(2.0, 2.0)]).unwrap();
        let c = BBox::from_points(&[p(3.0, 3.0), p(4.0, 4.0)]).unwrap();
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.union(&c).contains(&b));
    }
}
