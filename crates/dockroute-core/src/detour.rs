//! Visibility-graph detours around blocking polygons.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::buffer;
use crate::models::LatLng;
use crate::spatial::{self, LocalFrame, Xy};

/// Corner waypoints sit this much further out than the blocking ring.
const NODE_OFFSET_FACTOR: f64 = 1.5;

/// A zone inflated for path avoidance.
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub zone_id: String,
    /// Paths must not enter this ring.
    pub blocking: Vec<LatLng>,
    /// Candidate turning points around the obstacle.
    pub corners: Vec<LatLng>,
}

impl Obstacle {
    pub fn new(
        zone_id: impl Into<String>,
        polygon: &[LatLng],
        clearance_m: f64,
        segments: usize,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            blocking: buffer::buffer_polygon(polygon, clearance_m, segments),
            corners: buffer::buffer_polygon(polygon, clearance_m * NODE_OFFSET_FACTOR, segments),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Shortest polyline from `from` to `to` that does not enter any obstacle.
///
/// Returns `None` when an endpoint sits inside an obstacle or the corners do
/// not connect.
pub fn find_detour(from: LatLng, to: LatLng, obstacles: &[Obstacle]) -> Option<Vec<LatLng>> {
    let frame = LocalFrame::centered_on(&[from, to]);
    let rings: Vec<Vec<Xy>> = obstacles
        .iter()
        .map(|obstacle| frame.project_all(&obstacle.blocking))
        .collect();

    let start = frame.to_xy(&from);
    let goal = frame.to_xy(&to);
    if rings
        .iter()
        .any(|ring| spatial::point_in_polygon(start, ring) || spatial::point_in_polygon(goal, ring))
    {
        return None;
    }

    let visible = |a: Xy, b: Xy| -> bool {
        !rings
            .iter()
            .any(|ring| spatial::segment_enters_polygon(a, b, ring))
    };

    if visible(start, goal) {
        return Some(vec![from, to]);
    }

    // Node 0 is the start, node 1 the goal, the rest are free corners.
    let mut nodes: Vec<Xy> = vec![start, goal];
    for obstacle in obstacles {
        for corner in frame.project_all(&obstacle.corners) {
            if !rings.iter().any(|ring| spatial::point_in_polygon(corner, ring)) {
                nodes.push(corner);
            }
        }
    }

    let n = nodes.len();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<usize>> = vec![None; n];
    let mut settled = vec![false; n];
    let mut open: BinaryHeap<Reverse<(FloatOrd, usize)>> = BinaryHeap::new();
    dist[0] = 0.0;
    open.push(Reverse((FloatOrd(0.0), 0)));

    while let Some(Reverse((FloatOrd(d), u))) = open.pop() {
        if settled[u] {
            continue;
        }
        settled[u] = true;
        if u == 1 {
            break;
        }
        for v in 1..n {
            if settled[v] {
                continue;
            }
            let (a, b) = (nodes[u], nodes[v]);
            let step = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
            if d + step >= dist[v] || !visible(a, b) {
                continue;
            }
            dist[v] = d + step;
            prev[v] = Some(u);
            open.push(Reverse((FloatOrd(dist[v]), v)));
        }
    }

    if !dist[1].is_finite() {
        return None;
    }

    let mut path = vec![to];
    let mut cursor = 1;
    while let Some(p) = prev[cursor] {
        if p == 0 {
            break;
        }
        path.push(frame.to_latlng(nodes[p]));
        cursor = p;
    }
    path.push(from);
    path.reverse();
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Vec<LatLng> {
        vec![
            LatLng::new(12.99, 80.15),
            LatLng::new(12.99, 80.19),
            LatLng::new(13.01, 80.19),
            LatLng::new(13.01, 80.15),
        ]
    }

    #[test]
    fn clear_line_is_returned_as_is() {
        let obstacle = Obstacle::new("z", &block(), 50.0, 16);
        let from = LatLng::new(13.1, 80.1);
        let to = LatLng::new(13.1, 80.3);
        assert_eq!(find_detour(from, to, &[obstacle]), Some(vec![from, to]));
    }

    #[test]
    fn blocked_line_bends_around_obstacle() {
        let obstacle = Obstacle::new("z", &block(), 50.0, 16);
        let from = LatLng::new(13.0, 80.10);
        let to = LatLng::new(13.0, 80.24);
        let path = find_detour(from, to, std::slice::from_ref(&obstacle)).unwrap();
        assert!(path.len() >= 3);
        assert_eq!(path.first(), Some(&from));
        assert_eq!(path.last(), Some(&to));

        let frame = LocalFrame::centered_on(&block());
        let ring = frame.project_all(&obstacle.blocking);
        for pair in frame.project_all(&path).windows(2) {
            assert!(!spatial::segment_enters_polygon(pair[0], pair[1], &ring));
        }
        let straight = from.distance_m(&to);
        assert!(spatial::path_length_m(&path) < straight * 1.5);
    }

    #[test]
    fn endpoint_inside_obstacle_has_no_detour() {
        let obstacle = Obstacle::new("z", &block(), 50.0, 16);
        let detour = find_detour(LatLng::new(13.0, 80.17), LatLng::new(13.0, 80.3), &[obstacle]);
        assert!(detour.is_none());
    }
}
