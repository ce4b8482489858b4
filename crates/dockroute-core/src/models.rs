//! Core data models for airspace compliance and docking route planning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{PlannerError, Result};
use crate::spatial::{self, LocalFrame};

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &LatLng) -> f64 {
        spatial::haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

// ========== ZONE MODELS ==========

/// Type of restricted airspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    /// No flights allowed
    NoFly,
    /// Flights allowed only with authorization
    Restricted,
    /// Temporary flight restriction (TFR), always time-bounded
    TemporaryRestriction,
    /// Operator-defined area
    Custom,
}

impl ZoneKind {
    /// Whether an operator may acknowledge a conflict against this kind and proceed.
    pub fn is_acknowledgeable(self) -> bool {
        match self {
            ZoneKind::TemporaryRestriction => true,
            ZoneKind::NoFly | ZoneKind::Restricted | ZoneKind::Custom => false,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "no_fly" | "nofly" | "no_fly_zone" => Some(ZoneKind::NoFly),
            "restricted" | "restricted_area" => Some(ZoneKind::Restricted),
            "temporary_restriction" | "tfr" | "temporary" => Some(ZoneKind::TemporaryRestriction),
            "custom" => Some(ZoneKind::Custom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ZoneKind::NoFly => "no_fly",
            ZoneKind::Restricted => "restricted",
            ZoneKind::TemporaryRestriction => "temporary_restriction",
            ZoneKind::Custom => "custom",
        }
    }
}

/// A restricted-airspace polygon.
///
/// The polygon is an implicitly closed ring; a trailing vertex equal to the
/// first one is stripped on validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    pub polygon: Vec<LatLng>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authority: Option<String>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Zone {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ZoneKind,
        polygon: Vec<LatLng>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            polygon,
            active: true,
            description: String::new(),
            authority: None,
            valid_until: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// A temporary restriction whose validity window has closed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.kind == ZoneKind::TemporaryRestriction
            && self.valid_until.map(|until| until < now).unwrap_or(false)
    }

    /// Active and, for temporary restrictions, not yet expired.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now)
    }

    /// Check if a point is inside this zone's polygon (ray casting).
    pub fn contains_point(&self, point: &LatLng) -> bool {
        if self.polygon.len() < 3 {
            return false;
        }
        let frame = LocalFrame::centered_on(&self.polygon);
        let ring = frame.project_all(&self.polygon);
        spatial::point_in_polygon(frame.to_xy(point), &ring)
    }

    /// Validate and normalize the zone in place.
    ///
    /// Strips a closing duplicate vertex, then requires at least three
    /// distinct in-range vertices forming a simple ring with non-zero area.
    /// Temporary restrictions must carry `valid_until`.
    pub fn normalize(&mut self) -> Result<()> {
        let geometry_error = |reason: &str| PlannerError::InvalidGeometry {
            zone_id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(PlannerError::InvalidZone {
                zone_id: self.id.clone(),
                reason: "zone id must not be empty".to_string(),
            });
        }
        if self.polygon.iter().any(|vertex| !vertex.is_valid()) {
            return Err(geometry_error("vertex coordinates out of range"));
        }

        let mut ring = self.polygon.clone();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        ring.dedup();
        if ring.len() < 3 {
            return Err(geometry_error("polygon must have at least 3 distinct vertices"));
        }

        let frame = LocalFrame::centered_on(&ring);
        let projected = frame.project_all(&ring);
        if spatial::signed_area(&projected).abs() < 1.0 {
            return Err(geometry_error("polygon is degenerate (zero area)"));
        }
        if !spatial::is_simple_polygon(&projected) {
            return Err(geometry_error("polygon edges self-intersect"));
        }

        if self.kind == ZoneKind::TemporaryRestriction && self.valid_until.is_none() {
            return Err(PlannerError::InvalidZone {
                zone_id: self.id.clone(),
                reason: "temporary restriction requires valid_until".to_string(),
            });
        }

        self.polygon = ring;
        Ok(())
    }
}

// ========== FLIGHT PATHS & TASKS ==========

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
    #[serde(default)]
    pub altitude_m: Option<f64>,
}

impl Waypoint {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

impl From<LatLng> for Waypoint {
    fn from(point: LatLng) -> Self {
        Self {
            lat: point.lat,
            lng: point.lng,
            altitude_m: None,
        }
    }
}

/// Ordered waypoints flown by one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPath {
    pub waypoints: Vec<Waypoint>,
}

impl FlightPath {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    pub fn from_points(points: &[LatLng]) -> Self {
        Self {
            waypoints: points.iter().copied().map(Waypoint::from).collect(),
        }
    }

    pub fn positions(&self) -> Vec<LatLng> {
        self.waypoints.iter().map(Waypoint::position).collect()
    }

    pub fn length_m(&self) -> f64 {
        spatial::path_length_m(&self.positions())
    }

    pub fn origin(&self) -> Option<LatLng> {
        self.waypoints.first().map(Waypoint::position)
    }

    pub fn destination(&self) -> Option<LatLng> {
        self.waypoints.last().map(Waypoint::position)
    }
}

/// How a task's conflicts are interpreted at deployment time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionRule {
    /// Any conflict blocks deployment until acknowledged.
    #[default]
    HardGeofence,
    /// Warnings are recorded and deployment proceeds.
    WarnRecord,
    /// Conflicting zones trigger a re-plan around them.
    AutoReroute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Clear,
    Warning,
    Prohibited,
    Acknowledged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntersectionType {
    /// Path enters and exits the zone
    Crosses,
    /// Path originates or terminates inside the zone
    Within,
    /// Path stays outside the zone but enters its buffer
    Proximity,
}

/// A flight path's conflict with one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub zone_id: String,
    pub zone_name: String,
    pub zone_kind: ZoneKind,
    pub task_id: String,
    pub severity: ConflictSeverity,
    pub intersection_type: IntersectionType,
    pub recommended_action: String,
}

impl Conflict {
    pub fn is_critical(&self) -> bool {
        self.severity == ConflictSeverity::Critical
    }

    pub fn is_acknowledgeable(&self) -> bool {
        !self.is_critical() && self.zone_kind.is_acknowledgeable()
    }
}

/// A named unit of mission work.
///
/// Status is derived from the current conflict set and acknowledgments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub rule: RestrictionRule,
    pub path: FlightPath,
    #[serde(default)]
    pub drone: DroneProfile,
    #[serde(default)]
    pub drone_id: String,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub acknowledged: BTreeSet<String>,
    #[serde(default)]
    pub route: Option<Route>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: FlightPath) -> Self {
        let id = id.into();
        Self {
            drone_id: format!("drone-{id}"),
            id,
            name: name.into(),
            rule: RestrictionRule::default(),
            path,
            drone: DroneProfile::default(),
            conflicts: Vec::new(),
            acknowledged: BTreeSet::new(),
            route: None,
        }
    }

    pub fn with_rule(mut self, rule: RestrictionRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn status(&self) -> TaskStatus {
        if self.conflicts.iter().any(Conflict::is_critical) {
            return TaskStatus::Prohibited;
        }
        if self.conflicts.is_empty() {
            return TaskStatus::Clear;
        }
        let all_acknowledged = self
            .conflicts
            .iter()
            .all(|conflict| self.acknowledged.contains(&conflict.zone_id));
        if all_acknowledged {
            TaskStatus::Acknowledged
        } else {
            TaskStatus::Warning
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub name: String,
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
}

impl Mission {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == task_id)
    }
}

// ========== DOCKING ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargingType {
    Fast,
    Slow,
    BatterySwap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Available,
    Charging,
    Occupied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingStation {
    pub id: String,
    pub name: String,
    pub location: LatLng,
    pub capacity: u32,
    #[serde(default)]
    pub occupancy: u32,
    pub charging_type: ChargingType,
}

impl DockingStation {
    pub fn status(&self) -> StationStatus {
        if self.occupancy >= self.capacity {
            StationStatus::Occupied
        } else if self.occupancy > 0 {
            StationStatus::Charging
        } else {
            StationStatus::Available
        }
    }
}

// ========== ROUTES ==========

/// Battery and performance model of one drone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneProfile {
    pub battery_capacity_wh: f64,
    pub consumption_wh_per_km: f64,
    /// Minimum state of charge that must remain at the end of every leg.
    pub safety_margin_pct: f64,
    pub cruise_speed_mps: f64,
    /// State of charge at mission start.
    pub initial_soc_pct: f64,
}

impl Default for DroneProfile {
    fn default() -> Self {
        Self {
            battery_capacity_wh: 500.0,
            consumption_wh_per_km: 20.0,
            safety_margin_pct: 15.0,
            cruise_speed_mps: 15.0,
            initial_soc_pct: 100.0,
        }
    }
}

impl DroneProfile {
    /// Battery percentage consumed flying `distance_m`.
    pub fn consumption_pct(&self, distance_m: f64) -> f64 {
        if self.battery_capacity_wh <= 0.0 {
            return f64::INFINITY;
        }
        (distance_m / 1000.0) * self.consumption_wh_per_km / self.battery_capacity_wh * 100.0
    }

    pub fn energy_wh(&self, distance_m: f64) -> f64 {
        (distance_m / 1000.0) * self.consumption_wh_per_km
    }

    pub fn flight_time_s(&self, distance_m: f64) -> f64 {
        distance_m / self.cruise_speed_mps.max(0.1)
    }

    /// Distance that can be flown from `start_soc_pct` without dipping below the margin.
    pub fn safe_range_m(&self, start_soc_pct: f64) -> f64 {
        if self.consumption_wh_per_km <= 0.0 {
            return f64::INFINITY;
        }
        let usable_pct = (start_soc_pct - self.safety_margin_pct).max(0.0);
        usable_pct / 100.0 * self.battery_capacity_wh / self.consumption_wh_per_km * 1000.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationGoal {
    #[default]
    MinimizeTime,
    MinimizeBattery,
    MaximizeSafety,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub source: LatLng,
    pub destination: LatLng,
    #[serde(default)]
    pub drone: DroneProfile,
    #[serde(default)]
    pub drone_id: String,
    #[serde(default)]
    pub goal: OptimizationGoal,
}

/// End point of a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stop {
    Source { location: LatLng },
    Destination { location: LatLng },
    Station {
        station_id: String,
        name: String,
        location: LatLng,
        charging_type: ChargingType,
    },
}

impl Stop {
    pub fn location(&self) -> LatLng {
        match self {
            Stop::Source { location } | Stop::Destination { location } => *location,
            Stop::Station { location, .. } => *location,
        }
    }

    pub fn station_id(&self) -> Option<&str> {
        match self {
            Stop::Station { station_id, .. } => Some(station_id),
            _ => None,
        }
    }
}

/// One battery-bounded segment between two stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub index: usize,
    pub from: Stop,
    pub to: Stop,
    pub path: Vec<LatLng>,
    pub distance_m: f64,
    pub flight_time_s: f64,
    pub start_soc_pct: f64,
    pub end_soc_pct: f64,
    pub battery_consumed_pct: f64,
    /// State of charge left above the safety margin at leg end.
    pub margin_pct: f64,
    /// Charge or swap time at `to`, zero unless it is a docking station.
    pub charge_time_s: f64,
}

/// A docking stop chosen for a route, with its reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingStop {
    pub station_id: String,
    pub name: String,
    pub location: LatLng,
    pub charging_type: ChargingType,
    pub reservation_id: String,
    pub arrival_soc_pct: f64,
    pub charge_time_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Compliant straight line within single-leg range.
    Direct,
    /// Single leg bent around prohibited zones.
    Detour,
    MultiLeg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub kind: RouteKind,
    pub goal: OptimizationGoal,
    pub legs: Vec<Leg>,
    pub stops: Vec<DockingStop>,
    pub total_distance_m: f64,
    pub total_flight_time_s: f64,
    pub total_charge_time_s: f64,
    pub total_time_s: f64,
    pub energy_wh: f64,
    pub planned_at: DateTime<Utc>,
}

impl Route {
    pub fn reservation_ids(&self) -> Vec<String> {
        self.stops
            .iter()
            .map(|stop| stop.reservation_id.clone())
            .collect()
    }

    /// Concatenated path across all legs, without repeating shared stops.
    pub fn flight_path(&self) -> FlightPath {
        let mut points: Vec<LatLng> = Vec::new();
        for leg in &self.legs {
            for point in &leg.path {
                if points.last() != Some(point) {
                    points.push(*point);
                }
            }
        }
        FlightPath::from_points(&points)
    }

    pub fn average_margin_pct(&self) -> f64 {
        if self.legs.is_empty() {
            return 0.0;
        }
        self.legs.iter().map(|leg| leg.margin_pct).sum::<f64>() / self.legs.len() as f64
    }
}
