//! Flight path vs. zone conflict detection.
//!
//! Detection is pure: a path, a zone and its precomputed buffer go in, an
//! optional classified conflict comes out.

use crate::buffer;
use crate::models::{
    Conflict, ConflictSeverity, FlightPath, IntersectionType, LatLng, Zone, ZoneKind,
};
use crate::spatial::{self, LocalFrame, Xy};

/// A zone paired with its warning buffer, projected once for repeated tests.
#[derive(Debug, Clone)]
pub struct BufferedZone {
    pub zone: Zone,
    pub buffer: Vec<LatLng>,
    frame: LocalFrame,
    ring: Vec<Xy>,
    buffer_ring: Vec<Xy>,
}

impl BufferedZone {
    pub fn new(zone: Zone, buffer_distance_m: f64, segments: usize) -> Self {
        let buffer = buffer::buffer_polygon(&zone.polygon, buffer_distance_m, segments);
        Self::with_buffer(zone, buffer)
    }

    pub fn with_buffer(zone: Zone, buffer: Vec<LatLng>) -> Self {
        let frame = LocalFrame::centered_on(&zone.polygon);
        let ring = frame.project_all(&zone.polygon);
        let buffer_ring = frame.project_all(&buffer);
        Self {
            zone,
            buffer,
            frame,
            ring,
            buffer_ring,
        }
    }

    fn classify(&self, points: &[LatLng]) -> Option<IntersectionType> {
        let path: Vec<Xy> = self.frame.project_all(points);
        let (first, last) = (path.first()?, path.last()?);

        if spatial::point_in_polygon(*first, &self.ring)
            || spatial::point_in_polygon(*last, &self.ring)
        {
            return Some(IntersectionType::Within);
        }
        if touches(&path, &self.ring) {
            return Some(IntersectionType::Crosses);
        }
        if self.buffer_ring.len() >= 3 && touches(&path, &self.buffer_ring) {
            return Some(IntersectionType::Proximity);
        }
        None
    }
}

fn touches(path: &[Xy], ring: &[Xy]) -> bool {
    if path.iter().any(|p| spatial::point_in_polygon(*p, ring)) {
        return true;
    }
    path.windows(2)
        .any(|segment| spatial::segment_hits_ring(segment[0], segment[1], ring))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify `path` against `zone` and its `buffer`.
    ///
    /// Returns `None` when the path stays clear of both.
    pub fn detect(
        &self,
        task_id: &str,
        path: &FlightPath,
        zone: &Zone,
        buffer: &[LatLng],
    ) -> Option<Conflict> {
        let buffered = BufferedZone::with_buffer(zone.clone(), buffer.to_vec());
        self.detect_buffered(task_id, &path.positions(), &buffered)
    }

    pub fn detect_buffered(
        &self,
        task_id: &str,
        points: &[LatLng],
        zone: &BufferedZone,
    ) -> Option<Conflict> {
        let intersection = zone.classify(points)?;
        Some(Conflict {
            zone_id: zone.zone.id.clone(),
            zone_name: zone.zone.name.clone(),
            zone_kind: zone.zone.kind,
            task_id: task_id.to_string(),
            severity: severity(zone.zone.kind, intersection),
            intersection_type: intersection,
            recommended_action: recommended_action(zone.zone.kind, intersection).to_string(),
        })
    }

    /// Every conflict of one path against a set of buffered zones, in zone order.
    pub fn detect_all(
        &self,
        task_id: &str,
        points: &[LatLng],
        zones: &[BufferedZone],
    ) -> Vec<Conflict> {
        zones
            .iter()
            .filter_map(|zone| self.detect_buffered(task_id, points, zone))
            .collect()
    }
}

pub fn severity(kind: ZoneKind, intersection: IntersectionType) -> ConflictSeverity {
    use IntersectionType::*;
    match (kind, intersection) {
        (ZoneKind::NoFly | ZoneKind::Restricted, Crosses | Within) => ConflictSeverity::Critical,
        (ZoneKind::TemporaryRestriction, Crosses | Within) => ConflictSeverity::High,
        (ZoneKind::Custom, Crosses | Within) => ConflictSeverity::High,
        (_, Proximity) => ConflictSeverity::Medium,
    }
}

pub fn recommended_action(kind: ZoneKind, intersection: IntersectionType) -> &'static str {
    use IntersectionType::*;
    match (kind, intersection) {
        (ZoneKind::NoFly, Crosses) => "reroute path to avoid zone entirely",
        (ZoneKind::NoFly, Within) => "move mission start or end point outside the no-fly zone",
        (ZoneKind::Restricted, Crosses) => {
            "reroute path around restricted area or obtain authorization before planning"
        }
        (ZoneKind::Restricted, Within) => {
            "relocate start or end point outside restricted area or obtain authorization"
        }
        (ZoneKind::TemporaryRestriction, Crosses | Within) => {
            "acknowledge TFR and confirm authorization, or reschedule after the restriction expires"
        }
        (ZoneKind::Custom, Crosses | Within) => {
            "confirm operator clearance for the custom zone or adjust path"
        }
        (ZoneKind::TemporaryRestriction, Proximity) => {
            "acknowledge TFR and proceed, or adjust path to maintain buffer clearance"
        }
        (ZoneKind::NoFly | ZoneKind::Restricted | ZoneKind::Custom, Proximity) => {
            "adjust path to maintain buffer clearance"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airport() -> Zone {
        Zone::new(
            "maa",
            "Chennai Airport NoFly",
            ZoneKind::NoFly,
            vec![
                LatLng::new(12.98, 80.15),
                LatLng::new(12.98, 80.19),
                LatLng::new(13.00, 80.19),
                LatLng::new(13.00, 80.15),
            ],
        )
    }

    fn path(points: &[(f64, f64)]) -> FlightPath {
        let points: Vec<LatLng> = points.iter().map(|&(lat, lng)| LatLng::new(lat, lng)).collect();
        FlightPath::from_points(&points)
    }

    #[test]
    fn crossing_no_fly_is_critical() {
        let zone = airport();
        let buffer = buffer::compute_buffer(&zone, 100.0);
        let conflict = ConflictDetector::new()
            .detect("t1", &path(&[(12.99, 80.10), (12.99, 80.25)]), &zone, &buffer)
            .unwrap();
        assert_eq!(conflict.intersection_type, IntersectionType::Crosses);
        assert_eq!(conflict.severity, ConflictSeverity::Critical);
        assert_eq!(conflict.recommended_action, "reroute path to avoid zone entirely");
    }

    #[test]
    fn starting_inside_is_within() {
        let zone = airport();
        let conflict = ConflictDetector::new()
            .detect("t1", &path(&[(12.99, 80.17), (12.99, 80.30)]), &zone, &zone.polygon)
            .unwrap();
        assert_eq!(conflict.intersection_type, IntersectionType::Within);
    }

    #[test]
    fn buffer_only_hit_is_proximity() {
        let zone = airport();
        let buffer = buffer::compute_buffer(&zone, 500.0);
        // ~330 m north of the northern edge.
        let conflict = ConflictDetector::new()
            .detect("t1", &path(&[(13.003, 80.10), (13.003, 80.25)]), &zone, &buffer)
            .unwrap();
        assert_eq!(conflict.intersection_type, IntersectionType::Proximity);
        assert_eq!(conflict.severity, ConflictSeverity::Medium);
    }

    #[test]
    fn far_path_has_no_conflict() {
        let zone = airport();
        let buffer = buffer::compute_buffer(&zone, 500.0);
        assert!(ConflictDetector::new()
            .detect("t1", &path(&[(13.10, 80.10), (13.10, 80.25)]), &zone, &buffer)
            .is_none());
    }

    #[test]
    fn severity_table_matches_zone_kind() {
        use IntersectionType::*;
        assert_eq!(severity(ZoneKind::Restricted, Within), ConflictSeverity::Critical);
        assert_eq!(severity(ZoneKind::TemporaryRestriction, Crosses), ConflictSeverity::High);
        assert_eq!(severity(ZoneKind::Custom, Crosses), ConflictSeverity::High);
        assert_eq!(severity(ZoneKind::NoFly, Proximity), ConflictSeverity::Medium);
    }

    #[test]
    fn detect_all_reports_each_zone() {
        let mut tfr = airport();
        tfr.id = "tfr".into();
        tfr.kind = ZoneKind::TemporaryRestriction;
        tfr.polygon = tfr
            .polygon
            .iter()
            .map(|p| LatLng::new(p.lat + 0.1, p.lng))
            .collect();
        let zones = vec![
            BufferedZone::new(airport(), 100.0, 16),
            BufferedZone::new(tfr, 100.0, 16),
        ];
        let points = vec![LatLng::new(12.95, 80.17), LatLng::new(13.15, 80.17)];
        let conflicts = ConflictDetector::new().detect_all("t1", &points, &zones);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[1].severity, ConflictSeverity::High);
    }
}
