//! Outward polygon offset for zone warning buffers.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::models::{LatLng, Zone};
use crate::spatial::{self, LocalFrame, Xy};

/// Minimum circumscribed-polygon sides used by the hull fallback.
const MIN_SEGMENTS: usize = 8;

/// Convex vertices sharper than 60 degrees get a square join instead of a miter.
const MITER_LIMIT_COS: f64 = 0.5;

/// Buffer geometry settings shared by compliance checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    pub buffer_distance_m: f64,
    /// Sides of the polygon approximating a circle in the hull fallback.
    pub buffer_segments: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            buffer_distance_m: 100.0,
            buffer_segments: 16,
        }
    }
}

/// Expand a zone's polygon outward by `distance_m`.
pub fn compute_buffer(zone: &Zone, distance_m: f64) -> Vec<LatLng> {
    buffer_polygon(
        &zone.polygon,
        distance_m,
        ComplianceConfig::default().buffer_segments,
    )
}

/// Expand an arbitrary ring outward by `distance_m`.
///
/// Uses per-vertex miter offsets with square joins at sharp convex corners. If the
/// result self-intersects or fails to enclose the input, falls back to the
/// convex hull of N-gons circumscribed around every vertex, which always
/// encloses the exact Minkowski buffer.
pub fn buffer_polygon(polygon: &[LatLng], distance_m: f64, segments: usize) -> Vec<LatLng> {
    if polygon.len() < 3 || !distance_m.is_finite() || distance_m <= 0.0 {
        return polygon.to_vec();
    }

    let frame = LocalFrame::centered_on(polygon);
    let mut ring = frame.project_all(polygon);
    if spatial::signed_area(&ring) < 0.0 {
        ring.reverse();
    }

    let offset = miter_offset(&ring, distance_m);
    let result = if spatial::is_simple_polygon(&offset)
        && spatial::polygon_contains_polygon(&offset, &ring)
    {
        offset
    } else {
        tracing::debug!(
            vertices = ring.len(),
            distance_m,
            "Miter offset self-intersects, using hull fallback"
        );
        hull_offset(&ring, distance_m, segments.max(MIN_SEGMENTS))
    };

    frame.unproject_all(&result)
}

/// Offset a counter-clockwise ring along outward edge normals.
fn miter_offset(ring: &[Xy], distance_m: f64) -> Vec<Xy> {
    let n = ring.len();
    let mut out = Vec::with_capacity(n * 2);

    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let curr = ring[i];
        let next = ring[(i + 1) % n];

        let Some(n1) = outward_normal(prev, curr) else {
            continue;
        };
        let Some(n2) = outward_normal(curr, next) else {
            continue;
        };

        let cross = (curr.0 - prev.0) * (next.1 - curr.1) - (curr.1 - prev.1) * (next.0 - curr.0);
        let cos_full = (n1.0 * n2.0 + n1.1 * n2.1).clamp(-1.0, 1.0);
        let half_cos = ((1.0 + cos_full) / 2.0).sqrt();

        if cross > 0.0 && half_cos < MITER_LIMIT_COS {
            // Square join: extend each offset edge by `distance_m` past the
            // vertex, which keeps every join point at least `distance_m` away.
            let e1 = normalize((curr.0 - prev.0, curr.1 - prev.1)).unwrap_or((-n1.1, n1.0));
            let e2 = normalize((next.0 - curr.0, next.1 - curr.1)).unwrap_or((-n2.1, n2.0));
            let a = (curr.0 + n1.0 * distance_m, curr.1 + n1.1 * distance_m);
            let b = (curr.0 + n2.0 * distance_m, curr.1 + n2.1 * distance_m);
            out.push(a);
            out.push((a.0 + e1.0 * distance_m, a.1 + e1.1 * distance_m));
            out.push((b.0 - e2.0 * distance_m, b.1 - e2.1 * distance_m));
            out.push(b);
        } else {
            let sum = (n1.0 + n2.0, n1.1 + n2.1);
            let denom = 1.0 + cos_full;
            if denom <= 1e-9 {
                out.push((curr.0 + n1.0 * distance_m, curr.1 + n1.1 * distance_m));
                continue;
            }
            // Miter vector: (n1 + n2) * d / (1 + n1.n2)
            let scale = distance_m / denom;
            out.push((curr.0 + sum.0 * scale, curr.1 + sum.1 * scale));
        }
    }
    out
}

fn outward_normal(a: Xy, b: Xy) -> Option<Xy> {
    normalize((b.1 - a.1, -(b.0 - a.0)))
}

fn normalize(v: Xy) -> Option<Xy> {
    let len = (v.0 * v.0 + v.1 * v.1).sqrt();
    (len > 1e-12).then(|| (v.0 / len, v.1 / len))
}

/// Convex hull of regular N-gons circumscribing a disk of `distance_m` at each vertex.
fn hull_offset(ring: &[Xy], distance_m: f64, segments: usize) -> Vec<Xy> {
    let radius = distance_m / (PI / segments as f64).cos();
    let mut points = Vec::with_capacity(ring.len() * segments);
    for &(x, y) in ring {
        for k in 0..segments {
            let angle = 2.0 * PI * k as f64 / segments as f64;
            points.push((x + radius * angle.cos(), y + radius * angle.sin()));
        }
    }
    spatial::convex_hull(&points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZoneKind;

    fn encloses(buffer: &[LatLng], zone: &[LatLng]) -> bool {
        let frame = LocalFrame::centered_on(zone);
        let outer = frame.project_all(buffer);
        let inner = frame.project_all(zone);
        spatial::polygon_contains_polygon(&outer, &inner)
    }

    fn square_zone() -> Zone {
        Zone::new(
            "sq",
            "Square",
            ZoneKind::NoFly,
            vec![
                LatLng::new(13.0, 80.0),
                LatLng::new(13.0, 80.01),
                LatLng::new(13.01, 80.01),
                LatLng::new(13.01, 80.0),
            ],
        )
    }

    #[test]
    fn zero_distance_returns_input() {
        let zone = square_zone();
        assert_eq!(compute_buffer(&zone, 0.0), zone.polygon);
    }

    #[test]
    fn square_buffer_encloses_zone() {
        let zone = square_zone();
        let buffer = compute_buffer(&zone, 100.0);
        assert!(encloses(&buffer, &zone.polygon));
    }

    #[test]
    fn square_buffer_stays_at_distance() {
        let zone = square_zone();
        let buffer = compute_buffer(&zone, 100.0);
        let frame = LocalFrame::centered_on(&zone.polygon);
        let ring = frame.project_all(&zone.polygon);
        for vertex in frame.project_all(&buffer) {
            let d = spatial::distance_to_polygon(vertex, &ring);
            assert!(d >= 99.0, "buffer vertex too close: {d}");
        }
    }

    #[test]
    fn clockwise_input_is_handled() {
        let mut zone = square_zone();
        zone.polygon.reverse();
        let buffer = compute_buffer(&zone, 250.0);
        assert!(encloses(&buffer, &zone.polygon));
    }

    #[test]
    fn concave_polygon_buffer_encloses_zone() {
        // L-shape with one reflex vertex.
        let zone = Zone::new(
            "l",
            "L",
            ZoneKind::Restricted,
            vec![
                LatLng::new(13.0, 80.0),
                LatLng::new(13.0, 80.02),
                LatLng::new(13.002, 80.02),
                LatLng::new(13.002, 80.002),
                LatLng::new(13.02, 80.002),
                LatLng::new(13.02, 80.0),
            ],
        );
        for distance in [50.0, 150.0, 400.0] {
            let buffer = compute_buffer(&zone, distance);
            assert!(encloses(&buffer, &zone.polygon), "distance {distance}");
        }
    }

    #[test]
    fn sharp_triangle_gets_square_join() {
        let zone = Zone::new(
            "spike",
            "Spike",
            ZoneKind::NoFly,
            vec![
                LatLng::new(13.0, 80.0),
                LatLng::new(13.0005, 80.05),
                LatLng::new(13.001, 80.0),
            ],
        );
        let buffer = compute_buffer(&zone, 100.0);
        assert!(encloses(&buffer, &zone.polygon));
        let frame = LocalFrame::centered_on(&zone.polygon);
        let tip = frame.to_xy(&zone.polygon[1]);
        let farthest = frame
            .project_all(&buffer)
            .into_iter()
            .map(|p| ((p.0 - tip.0).powi(2) + (p.1 - tip.1).powi(2)).sqrt())
            .fold(0.0, f64::max);
        // An unbounded miter at this tip would reach several kilometers.
        assert!(farthest < 2_000.0, "miter spike reached {farthest} m");
    }

    #[test]
    fn hull_offset_encloses_every_vertex_disk() {
        let ring = vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
        let hull = hull_offset(&ring, 10.0, 16);
        for &p in &ring {
            assert!(spatial::distance_to_polygon(p, &hull) == 0.0);
        }
        assert!(spatial::point_in_polygon((-9.9, 50.0), &hull));
    }
}
