//! Dockroute CLI - offline route planning from scenario files.
//!
//! A scenario bundles a zone set, a docking station inventory and one route
//! request. Planning runs entirely in-process against the core planner.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use dockroute_core::{
    ChargingModel, ComplianceConfig, ComplianceRuleEngine, DockingStation, DockingStationAllocator,
    InfeasibleReason, MissionPlanner, OptimizerConfig, PlannerError, Route, RouteRequest, Stop,
    Zone, ZoneRegistry,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub stations: Vec<DockingStation>,
    pub request: RouteRequest,
    #[serde(default)]
    pub compliance: Option<ComplianceConfig>,
    #[serde(default)]
    pub charging: Option<ChargingModel>,
    #[serde(default)]
    pub optimizer: Option<OptimizerConfig>,
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse scenario {}", path.display()))
}

/// Outcome of planning one scenario, as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Planned {
        route: Route,
    },
    Failed {
        error: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<InfeasibleReason>,
    },
}

impl Scenario {
    /// Build a planner holding the scenario's zones and stations.
    ///
    /// Invalid zones or stations abort the load with the offending id.
    pub fn build_planner(&self) -> Result<MissionPlanner> {
        let registry = Arc::new(ZoneRegistry::new());
        for zone in &self.zones {
            registry
                .upsert_zone(zone.clone())
                .with_context(|| format!("Invalid zone '{}'", zone.id))?;
        }
        let expired = registry.expire_stale_zones(Utc::now());
        if !expired.is_empty() {
            eprintln!("Ignoring expired restrictions: {}", expired.join(", "));
        }

        let allocator = DockingStationAllocator::new(self.charging.unwrap_or_default());
        for station in &self.stations {
            allocator
                .register_station(station.clone())
                .with_context(|| format!("Invalid docking station '{}'", station.id))?;
        }

        Ok(MissionPlanner::new(
            registry,
            allocator,
            ComplianceRuleEngine::new(self.compliance.unwrap_or_default()),
            self.optimizer.clone().unwrap_or_default(),
        ))
    }

    pub fn plan(&self) -> Result<PlanOutcome> {
        let planner = self.build_planner()?;
        Ok(match planner.plan_route(&self.request) {
            Ok(route) => PlanOutcome::Planned { route },
            Err(err) => {
                let reason = match &err {
                    PlannerError::RouteInfeasible { reason, .. } => Some(*reason),
                    _ => None,
                };
                PlanOutcome::Failed {
                    error: err.code().to_string(),
                    message: err.to_string(),
                    reason,
                }
            }
        })
    }
}

fn stop_label(stop: &Stop) -> String {
    match stop {
        Stop::Source { .. } => "source".to_string(),
        Stop::Destination { .. } => "destination".to_string(),
        Stop::Station { station_id, .. } => station_id.clone(),
    }
}

/// Human-readable route summary.
pub fn format_route(route: &Route) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Route {} ({:?}): {:.2} km, {:.0} min total ({:.0} min charging), {:.0} Wh",
        route.id,
        route.kind,
        route.total_distance_m / 1000.0,
        route.total_time_s / 60.0,
        route.total_charge_time_s / 60.0,
        route.energy_wh,
    );
    for leg in &route.legs {
        let _ = writeln!(
            out,
            "  leg {}: {} -> {}  {:.2} km  battery {:.1}% -> {:.1}% (margin {:.1}%)",
            leg.index + 1,
            stop_label(&leg.from),
            stop_label(&leg.to),
            leg.distance_m / 1000.0,
            leg.start_soc_pct,
            leg.end_soc_pct,
            leg.margin_pct,
        );
    }
    for stop in &route.stops {
        let _ = writeln!(
            out,
            "  dock {} ({:?}): arrive {:.1}%, charge {:.0} s, reservation {}",
            stop.station_id,
            stop.charging_type,
            stop.arrival_soc_pct,
            stop.charge_time_s,
            stop.reservation_id,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario(stations: serde_json::Value) -> Scenario {
        serde_json::from_value(json!({
            "zones": [{
                "id": "maa-nofly",
                "name": "Chennai Airport NoFly",
                "kind": "no_fly",
                "polygon": [
                    {"lat": 12.975, "lng": 80.150},
                    {"lat": 12.975, "lng": 80.180},
                    {"lat": 13.000, "lng": 80.180},
                    {"lat": 13.000, "lng": 80.150}
                ]
            }],
            "stations": stations,
            "request": {
                "source": {"lat": 13.1, "lng": 79.9},
                "destination": {"lat": 13.1, "lng": 80.25},
                "drone_id": "drone-7"
            }
        }))
        .unwrap()
    }

    #[test]
    fn plans_multi_leg_scenario() {
        let scenario = scenario(json!([{
            "id": "dock-mid",
            "name": "Poonamallee",
            "location": {"lat": 13.1, "lng": 80.08},
            "capacity": 1,
            "occupancy": 0,
            "charging_type": "fast"
        }]));

        match scenario.plan().unwrap() {
            PlanOutcome::Planned { route } => {
                assert_eq!(route.stops.len(), 1);
                let summary = format_route(&route);
                assert!(summary.contains("leg 2: dock-mid -> destination"));
            }
            other => panic!("expected a route, got {other:?}"),
        }
    }

    #[test]
    fn reports_typed_failure() {
        match scenario(json!([])).plan().unwrap() {
            PlanOutcome::Failed { error, reason, .. } => {
                assert_eq!(error, "route_infeasible");
                assert_eq!(reason, Some(InfeasibleReason::BatteryRangeExhausted));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn invalid_zone_aborts_load() {
        let mut scenario = scenario(json!([]));
        scenario.zones[0].polygon.truncate(2);
        let err = scenario.build_planner().unwrap_err();
        assert!(format!("{err:#}").contains("maa-nofly"));
    }
}
