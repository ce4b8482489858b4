pub mod buffer;
pub mod compliance;
pub mod conflict;
pub mod detour;
pub mod docking;
pub mod error;
pub mod models;
pub mod optimizer;
pub mod planner;
pub mod spatial;
pub mod zones;

pub use buffer::{buffer_polygon, compute_buffer, ComplianceConfig};
pub use compliance::{ComplianceRuleEngine, DeployabilityReport, TaskValidation};
pub use conflict::{BufferedZone, ConflictDetector};
pub use docking::{
    ChargingModel, DockingStationAllocator, Reservation, ReservationGuard, ReservationId,
};
pub use error::{InfeasibleReason, PlannerError, Result};
pub use models::{
    ChargingType, Conflict, ConflictSeverity, DockingStation, DockingStop, DroneProfile,
    FlightPath, IntersectionType, LatLng, Leg, Mission, OptimizationGoal, RestrictionRule, Route,
    RouteKind, RouteRequest, StationStatus, Stop, Task, TaskStatus, Waypoint, Zone, ZoneKind,
};
pub use optimizer::{MultiLegRouteOptimizer, OptimizerConfig, SearchScope, SearchStats};
pub use planner::{DeployedMission, MissionPlanner, TaskDraft};
pub use spatial::haversine_distance;
pub use zones::{FeedReport, RejectedZone, ZoneRegistry, ZoneSnapshot};
