//! Spatial math for zone geometry, conflict tests and distance calculations.
//!
//! Geometry is evaluated in a local East-North plane (meters) anchored at a
//! reference point, which is accurate enough at mission scale (tens of km).

use crate::models::LatLng;

/// Planar point in meters: (east, north).
pub type Xy = (f64, f64);

/// Epsilon in meters for orientation and on-segment tests on projected coordinates.
const EPS_M: f64 = 1e-6;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using Haversine formula.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Total great-circle length of a polyline.
pub fn path_length_m(points: &[LatLng]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_m(&pair[1]))
        .sum()
}

// ==== ENU (East-North-Up) Coordinate Conversion ====

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

pub fn meters_to_lat(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lat(ref_lat_deg).max(1e-9)
}

pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lon(ref_lat_deg).max(1e-9)
}

pub fn lat_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lat(ref_lat_deg)
}

pub fn lon_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lon(ref_lat_deg)
}

/// Local tangent plane anchored at `origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: LatLng,
}

impl LocalFrame {
    pub fn new(origin: LatLng) -> Self {
        Self { origin }
    }

    /// Frame anchored at the vertex centroid of `points`.
    pub fn centered_on(points: &[LatLng]) -> Self {
        if points.is_empty() {
            return Self::new(LatLng::new(0.0, 0.0));
        }
        let n = points.len() as f64;
        let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
        let lng = points.iter().map(|p| p.lng).sum::<f64>() / n;
        Self::new(LatLng::new(lat, lng))
    }

    pub fn origin(&self) -> LatLng {
        self.origin
    }

    pub fn to_xy(&self, point: &LatLng) -> Xy {
        (
            lon_to_meters(point.lng - self.origin.lng, self.origin.lat),
            lat_to_meters(point.lat - self.origin.lat, self.origin.lat),
        )
    }

    pub fn to_latlng(&self, xy: Xy) -> LatLng {
        LatLng::new(
            self.origin.lat + meters_to_lat(xy.1, self.origin.lat),
            self.origin.lng + meters_to_lon(xy.0, self.origin.lat),
        )
    }

    pub fn project_all(&self, points: &[LatLng]) -> Vec<Xy> {
        points.iter().map(|p| self.to_xy(p)).collect()
    }

    pub fn unproject_all(&self, points: &[Xy]) -> Vec<LatLng> {
        points.iter().map(|p| self.to_latlng(*p)).collect()
    }
}

fn orient(p: Xy, q: Xy, r: Xy) -> f64 {
    (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
}

/// Segment intersection test including touches and collinear overlaps.
pub fn segments_intersect_2d(a1: Xy, a2: Xy, b1: Xy, b2: Xy) -> bool {
    fn within(a: f64, b: f64, value: f64) -> bool {
        let min = a.min(b) - EPS_M;
        let max = a.max(b) + EPS_M;
        value >= min && value <= max
    }

    fn on_segment(p: Xy, q: Xy, r: Xy) -> bool {
        within(p.0, q.0, r.0) && within(p.1, q.1, r.1)
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if o1.abs() <= EPS_M && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS_M && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS_M && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS_M && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS_M && o2 < -EPS_M) || (o1 < -EPS_M && o2 > EPS_M);
    let b_crosses = (o3 > EPS_M && o4 < -EPS_M) || (o3 < -EPS_M && o4 > EPS_M);
    a_crosses && b_crosses
}

/// Ray-casting point-in-polygon test on an implicitly closed ring.
pub fn point_in_polygon(point: Xy, ring: &[Xy]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let (x, y) = point;
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Iterate the edges of an implicitly closed ring.
pub fn ring_edges(ring: &[Xy]) -> impl Iterator<Item = (Xy, Xy)> + '_ {
    let n = ring.len();
    (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
}

/// Whether segment `a`-`b` touches or crosses any edge of the ring.
pub fn segment_hits_ring(a: Xy, b: Xy, ring: &[Xy]) -> bool {
    ring_edges(ring).any(|(p, q)| segments_intersect_2d(a, b, p, q))
}

/// Whether segment `a`-`b` passes through the polygon interior.
///
/// Touching only a single vertex from outside is not counted.
pub fn segment_enters_polygon(a: Xy, b: Xy, ring: &[Xy]) -> bool {
    if point_in_polygon(a, ring) || point_in_polygon(b, ring) {
        return true;
    }
    let mut hits: Vec<f64> = vec![0.0, 1.0];
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= EPS_M {
        return false;
    }
    for (p, q) in ring_edges(ring) {
        if segments_intersect_2d(a, b, p, q) {
            for r in [p, q] {
                let t = ((r.0 - a.0) * dx + (r.1 - a.1) * dy) / len_sq;
                hits.push(t.clamp(0.0, 1.0));
            }
            if let Some(t) = line_intersection_param(a, b, p, q) {
                hits.push(t);
            }
        }
    }
    hits.sort_by(|x, y| x.total_cmp(y));
    hits.dedup_by(|x, y| (*x - *y).abs() < 1e-9);
    hits.windows(2).any(|pair| {
        let t = (pair[0] + pair[1]) / 2.0;
        point_in_polygon((a.0 + dx * t, a.1 + dy * t), ring)
    })
}

/// Parameter along `a`-`b` where it meets line `p`-`q`, if the lines are not parallel.
fn line_intersection_param(a: Xy, b: Xy, p: Xy, q: Xy) -> Option<f64> {
    let r = (b.0 - a.0, b.1 - a.1);
    let s = (q.0 - p.0, q.1 - p.1);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom.abs() <= EPS_M {
        return None;
    }
    let t = ((p.0 - a.0) * s.1 - (p.1 - a.1) * s.0) / denom;
    (0.0..=1.0).contains(&t).then_some(t)
}

/// Shoelace area; positive for counter-clockwise rings.
pub fn signed_area(ring: &[Xy]) -> f64 {
    ring_edges(ring)
        .map(|(p, q)| p.0 * q.1 - q.0 * p.1)
        .sum::<f64>()
        / 2.0
}

/// True when no two non-adjacent edges of the ring touch.
pub fn is_simple_polygon(ring: &[Xy]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        let (a1, a2) = (ring[i], ring[(i + 1) % n]);
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (b1, b2) = (ring[j], ring[(j + 1) % n]);
            if segments_intersect_2d(a1, a2, b1, b2) {
                return false;
            }
        }
    }
    true
}

/// Convex hull (Andrew's monotone chain), counter-clockwise.
pub fn convex_hull(points: &[Xy]) -> Vec<Xy> {
    let mut pts: Vec<Xy> = points.to_vec();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Xy> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && orient(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Xy> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && orient(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// True when `inner` lies entirely inside `outer` without touching its boundary.
pub fn polygon_contains_polygon(outer: &[Xy], inner: &[Xy]) -> bool {
    if !inner.iter().all(|p| point_in_polygon(*p, outer)) {
        return false;
    }
    !ring_edges(inner).any(|(a, b)| segment_hits_ring(a, b, outer))
}

/// Minimum distance from a point to a segment in the plane.
pub fn distance_point_to_segment(p: Xy, a: Xy, b: Xy) -> f64 {
    let (sx, sy) = (b.0 - a.0, b.1 - a.1);
    let (px, py) = (p.0 - a.0, p.1 - a.1);
    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 0.0001 {
        return (px * px + py * py).sqrt();
    }
    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = px - t * sx;
    let dy = py - t * sy;
    (dx * dx + dy * dy).sqrt()
}

/// Minimum distance from a point to a polygon boundary; zero if inside.
pub fn distance_to_polygon(p: Xy, ring: &[Xy]) -> f64 {
    if point_in_polygon(p, ring) {
        return 0.0;
    }
    ring_edges(ring)
        .map(|(a, b)| distance_point_to_segment(p, a, b))
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square(side: f64) -> Vec<Xy> {
        vec![(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)]
    }

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn local_frame_round_trips_within_a_millimeter() {
        let frame = LocalFrame::new(LatLng::new(13.0, 80.2));
        let point = LatLng::new(13.1, 80.35);
        let back = frame.to_latlng(frame.to_xy(&point));
        assert!(point.distance_m(&back) < 0.001);
    }

    #[test]
    fn local_frame_distance_matches_haversine() {
        let a = LatLng::new(12.9, 80.1);
        let b = LatLng::new(13.2, 80.3);
        let frame = LocalFrame::centered_on(&[a, b]);
        let (ax, ay) = frame.to_xy(&a);
        let (bx, by) = frame.to_xy(&b);
        let planar = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
        let great_circle = a.distance_m(&b);
        assert!((planar - great_circle).abs() / great_circle < 0.005);
    }

    #[test]
    fn crossing_segments_intersect() {
        assert!(segments_intersect_2d((0.0, 0.0), (10.0, 10.0), (0.0, 10.0), (10.0, 0.0)));
        assert!(!segments_intersect_2d((0.0, 0.0), (10.0, 0.0), (0.0, 1.0), (10.0, 1.0)));
    }

    #[test]
    fn point_in_polygon_ray_casting() {
        let square = unit_square(10.0);
        assert!(point_in_polygon((5.0, 5.0), &square));
        assert!(!point_in_polygon((15.0, 5.0), &square));
    }

    #[test]
    fn signed_area_orientation() {
        let square = unit_square(10.0);
        assert!((signed_area(&square) - 100.0).abs() < 1e-9);
        let mut clockwise = square.clone();
        clockwise.reverse();
        assert!(signed_area(&clockwise) < 0.0);
    }

    #[test]
    fn bowtie_is_not_simple() {
        let bowtie = vec![(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)];
        assert!(!is_simple_polygon(&bowtie));
        assert!(is_simple_polygon(&unit_square(10.0)));
    }

    #[test]
    fn hull_drops_interior_points() {
        let mut points = unit_square(10.0);
        points.push((5.0, 5.0));
        points.push((2.0, 7.0));
        let hull = convex_hull(&points);
        assert_eq!(hull.len(), 4);
        assert!(signed_area(&hull) > 0.0);
    }

    #[test]
    fn segment_through_square_enters() {
        let square = unit_square(10.0);
        assert!(segment_enters_polygon((-5.0, 5.0), (15.0, 5.0), &square));
        assert!(!segment_enters_polygon((-5.0, 15.0), (15.0, 15.0), &square));
        // Grazing a corner from outside does not enter.
        assert!(!segment_enters_polygon((-5.0, 5.0), (5.0, 15.0), &square));
    }

    #[test]
    fn contains_polygon_requires_clearance() {
        let outer = vec![(-1.0, -1.0), (11.0, -1.0), (11.0, 11.0), (-1.0, 11.0)];
        assert!(polygon_contains_polygon(&outer, &unit_square(10.0)));
        assert!(!polygon_contains_polygon(&unit_square(10.0), &outer));
    }

    #[test]
    fn distance_to_polygon_is_zero_inside() {
        let square = unit_square(10.0);
        assert_eq!(distance_to_polygon((5.0, 5.0), &square), 0.0);
        assert!((distance_to_polygon((13.0, 5.0), &square) - 3.0).abs() < 1e-9);
    }
}
