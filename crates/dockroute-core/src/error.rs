//! Error taxonomy for planning, compliance and docking operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a route search could not produce a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibleReason {
    /// No chain of stops bridges the distance within safe battery range.
    BatteryRangeExhausted,
    /// Stops are within range but every bridging path is prohibited.
    NoCompliantPath,
    /// A route exists only through stations that are full or kept failing reservation.
    NoDockingCapacity,
}

impl std::fmt::Display for InfeasibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            InfeasibleReason::BatteryRangeExhausted => "battery range exhausted",
            InfeasibleReason::NoCompliantPath => "all bridging paths are non-compliant",
            InfeasibleReason::NoDockingCapacity => "no docking capacity",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    #[error("invalid geometry for zone {zone_id}: {reason}")]
    InvalidGeometry { zone_id: String, reason: String },

    #[error("invalid zone {zone_id}: {reason}")]
    InvalidZone { zone_id: String, reason: String },

    #[error("zone not found: {0}")]
    ZoneNotFound(String),

    #[error("invalid acknowledgment of zone {zone_id} on task {task_id}: {reason}")]
    InvalidAcknowledgment {
        task_id: String,
        zone_id: String,
        reason: String,
    },

    #[error("docking station not found: {0}")]
    StationNotFound(String),

    #[error("invalid docking station {station_id}: {reason}")]
    InvalidStation { station_id: String, reason: String },

    #[error("docking station {station_id} is full ({capacity} of {capacity} bays occupied)")]
    StationFull { station_id: String, capacity: u32 },

    #[error("route infeasible: {reason}")]
    RouteInfeasible {
        reason: InfeasibleReason,
        detail: String,
    },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("mission not found: {0}")]
    MissionNotFound(String),

    #[error("mission {mission_id} is not deployable; blocking tasks: {blocking_tasks:?}")]
    NotDeployable {
        mission_id: String,
        blocking_tasks: Vec<String>,
    },

    #[error("route search cancelled for mission {0}")]
    Cancelled(String),
}

impl PlannerError {
    /// Transient reservation races are the only errors worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlannerError::StationFull { .. })
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::InvalidGeometry { .. } => "invalid_geometry",
            PlannerError::InvalidZone { .. } => "invalid_zone",
            PlannerError::ZoneNotFound(_) => "zone_not_found",
            PlannerError::InvalidAcknowledgment { .. } => "invalid_acknowledgment",
            PlannerError::StationNotFound(_) => "station_not_found",
            PlannerError::InvalidStation { .. } => "invalid_station",
            PlannerError::StationFull { .. } => "station_full",
            PlannerError::RouteInfeasible { .. } => "route_infeasible",
            PlannerError::TaskNotFound(_) => "task_not_found",
            PlannerError::MissionNotFound(_) => "mission_not_found",
            PlannerError::NotDeployable { .. } => "not_deployable",
            PlannerError::Cancelled(_) => "cancelled",
        }
    }

    pub(crate) fn infeasible(reason: InfeasibleReason, detail: impl Into<String>) -> Self {
        PlannerError::RouteInfeasible {
            reason,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_station_full_is_retryable() {
        let full = PlannerError::StationFull {
            station_id: "dock-1".into(),
            capacity: 2,
        };
        assert!(full.is_retryable());
        assert!(!PlannerError::ZoneNotFound("z".into()).is_retryable());
        assert!(!PlannerError::infeasible(InfeasibleReason::NoCompliantPath, "x").is_retryable());
    }

    #[test]
    fn infeasible_message_names_reason_class() {
        let err = PlannerError::infeasible(InfeasibleReason::BatteryRangeExhausted, "42 km");
        assert_eq!(err.to_string(), "route infeasible: battery range exhausted");
        assert_eq!(err.code(), "route_infeasible");
    }
}
