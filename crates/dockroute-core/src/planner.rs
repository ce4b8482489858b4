//! Mission planning facade over the registry, compliance engine and optimizer.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::compliance::{ComplianceRuleEngine, DeployabilityReport, TaskValidation};
use crate::docking::{DockingStationAllocator, ReservationId};
use crate::error::{PlannerError, Result};
use crate::models::{
    DroneProfile, FlightPath, Mission, RestrictionRule, Route, RouteRequest, Task, TaskStatus,
    Waypoint,
};
use crate::optimizer::{MultiLegRouteOptimizer, OptimizerConfig, SearchScope};
use crate::zones::ZoneRegistry;

/// Task as submitted by mission authoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub rule: RestrictionRule,
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub drone: Option<DroneProfile>,
    #[serde(default)]
    pub drone_id: Option<String>,
}

/// Final state of a deployed mission, kept read-only for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedMission {
    pub mission: Mission,
    pub routes: Vec<Route>,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug)]
struct MissionEntry {
    mission: Mission,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct MissionPlanner {
    zones: Arc<ZoneRegistry>,
    allocator: DockingStationAllocator,
    compliance: ComplianceRuleEngine,
    optimizer: OptimizerConfig,
    missions: DashMap<String, MissionEntry>,
}

impl MissionPlanner {
    pub fn new(
        zones: Arc<ZoneRegistry>,
        allocator: DockingStationAllocator,
        compliance: ComplianceRuleEngine,
        optimizer: OptimizerConfig,
    ) -> Self {
        Self {
            zones,
            allocator,
            compliance,
            optimizer,
            missions: DashMap::new(),
        }
    }

    pub fn zones(&self) -> &Arc<ZoneRegistry> {
        &self.zones
    }

    pub fn allocator(&self) -> &DockingStationAllocator {
        &self.allocator
    }

    pub fn compliance(&self) -> &ComplianceRuleEngine {
        &self.compliance
    }

    fn optimizer(&self) -> MultiLegRouteOptimizer<'_> {
        MultiLegRouteOptimizer::new(&self.optimizer, &self.compliance, &self.allocator)
    }

    /// Plan an ad-hoc route. The caller owns the returned reservations.
    pub fn plan_route(&self, request: &RouteRequest) -> Result<Route> {
        let snapshot = self.zones.snapshot(Utc::now());
        self.optimizer()
            .plan(request, &snapshot, &SearchScope::default())
    }

    /// Release every docking reservation held by a route.
    pub fn release_route(&self, route: &Route) {
        for id in route.reservation_ids() {
            if let Some(id) = ReservationId::parse(&id) {
                self.allocator.release(&id);
            }
        }
    }

    pub fn create_mission(&self, name: &str, drafts: Vec<TaskDraft>) -> Result<Mission> {
        let mission_id = Uuid::new_v4().to_string();
        let tasks = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                let id = draft.id.unwrap_or_else(|| format!("task-{}", i + 1));
                let mut task = Task::new(id, draft.name, FlightPath::new(draft.waypoints))
                    .with_rule(draft.rule);
                if let Some(drone) = draft.drone {
                    task.drone = drone;
                }
                if let Some(drone_id) = draft.drone_id {
                    task.drone_id = drone_id;
                }
                task
            })
            .collect();

        let mut mission = Mission {
            id: mission_id.clone(),
            name: name.to_string(),
            tasks,
            created_at: Utc::now(),
        };
        let prepared = self.compliance.prepare(self.zones.snapshot(Utc::now()).zones());
        for task in &mut mission.tasks {
            self.compliance.revalidate(task, &prepared);
        }

        let reroute: Vec<String> = mission
            .tasks
            .iter()
            .filter(|task| needs_reroute(task))
            .map(|task| task.id.clone())
            .collect();

        self.missions.insert(
            mission_id.clone(),
            MissionEntry {
                mission,
                cancel: CancellationToken::new(),
            },
        );
        tracing::info!(mission_id = %mission_id, name, "Mission created");

        for task_id in reroute {
            self.try_auto_reroute(&mission_id, &task_id);
        }
        self.mission(&mission_id)
    }

    pub fn mission(&self, mission_id: &str) -> Result<Mission> {
        self.missions
            .get(mission_id)
            .map(|entry| entry.mission.clone())
            .ok_or_else(|| PlannerError::MissionNotFound(mission_id.to_string()))
    }

    pub fn list_missions(&self) -> Vec<Mission> {
        let mut missions: Vec<Mission> = self
            .missions
            .iter()
            .map(|entry| entry.mission.clone())
            .collect();
        missions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        missions
    }

    /// Run `f` against one task while holding the mission entry.
    fn with_task<T>(
        &self,
        mission_id: &str,
        task_id: &str,
        f: impl FnOnce(&mut Task) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self
            .missions
            .get_mut(mission_id)
            .ok_or_else(|| PlannerError::MissionNotFound(mission_id.to_string()))?;
        let task = entry
            .mission
            .task_mut(task_id)
            .ok_or_else(|| PlannerError::TaskNotFound(task_id.to_string()))?;
        f(task)
    }

    /// Recompute a task's conflicts, rerouting first if its rule asks for it.
    pub fn revalidate_task(&self, mission_id: &str, task_id: &str) -> Result<TaskValidation> {
        let prepared = self.compliance.prepare(self.zones.snapshot(Utc::now()).zones());
        let reroute = self.with_task(mission_id, task_id, |task| {
            self.compliance.revalidate(task, &prepared);
            Ok(needs_reroute(task))
        })?;
        if reroute {
            self.try_auto_reroute(mission_id, task_id);
        }
        self.task_validation(mission_id, task_id)
    }

    /// Revalidate every task of a mission, e.g. after zone changes.
    pub fn revalidate_mission(&self, mission_id: &str) -> Result<Vec<TaskValidation>> {
        let task_ids: Vec<String> = self
            .mission(mission_id)?
            .tasks
            .into_iter()
            .map(|task| task.id)
            .collect();
        for task_id in &task_ids {
            self.revalidate_task(mission_id, task_id)?;
        }
        self.validation_results(mission_id)
    }

    pub fn acknowledge(
        &self,
        mission_id: &str,
        task_id: &str,
        zone_id: &str,
    ) -> Result<TaskStatus> {
        self.with_task(mission_id, task_id, |task| {
            self.compliance.acknowledge(task, zone_id)
        })
    }

    pub fn set_restriction_rule(
        &self,
        mission_id: &str,
        task_id: &str,
        rule: RestrictionRule,
    ) -> Result<TaskValidation> {
        let reroute = self.with_task(mission_id, task_id, |task| {
            self.compliance.set_restriction_rule(task, rule);
            Ok(needs_reroute(task))
        })?;
        if reroute {
            self.try_auto_reroute(mission_id, task_id);
        }
        self.task_validation(mission_id, task_id)
    }

    fn try_auto_reroute(&self, mission_id: &str, task_id: &str) {
        if let Err(err) = self.apply_auto_reroute(mission_id, task_id) {
            tracing::warn!(
                mission_id,
                task_id,
                error = %err,
                "Auto-reroute failed, keeping original path"
            );
        }
    }

    /// Re-plan a task's path around the zones it currently conflicts with.
    ///
    /// The task's previous route reservations are released first. The search
    /// runs without holding the mission entry so it stays cancellable.
    pub fn apply_auto_reroute(&self, mission_id: &str, task_id: &str) -> Result<TaskValidation> {
        let (task, cancel) = {
            let entry = self
                .missions
                .get(mission_id)
                .ok_or_else(|| PlannerError::MissionNotFound(mission_id.to_string()))?;
            let task = entry
                .mission
                .task(task_id)
                .cloned()
                .ok_or_else(|| PlannerError::TaskNotFound(task_id.to_string()))?;
            (task, entry.cancel.clone())
        };

        let (Some(source), Some(destination)) = (task.path.origin(), task.path.destination())
        else {
            return Err(PlannerError::infeasible(
                crate::error::InfeasibleReason::NoCompliantPath,
                format!("task {task_id} has no waypoints to reroute"),
            ));
        };

        let snapshot = self.zones.snapshot(Utc::now());
        let prepared = self.compliance.prepare(snapshot.zones());
        let mut fresh = task.clone();
        self.compliance.revalidate(&mut fresh, &prepared);
        let avoid_zones: BTreeSet<String> = fresh
            .conflicts
            .iter()
            .map(|conflict| conflict.zone_id.clone())
            .collect();

        if let Some(previous) = &task.route {
            self.release_route(previous);
        }

        let request = RouteRequest {
            source,
            destination,
            drone: task.drone,
            drone_id: task.drone_id.clone(),
            goal: self.optimizer.goal,
        };
        let scope = SearchScope {
            mission_id: Some(mission_id.to_string()),
            avoid_zones,
            cancel,
        };
        let planned = self.optimizer().plan(&request, &snapshot, &scope);

        let mut updated = task;
        match &planned {
            Ok(route) => {
                updated.path = route.flight_path();
                updated.route = Some(route.clone());
            }
            Err(_) => updated.route = None,
        }
        self.compliance.revalidate(&mut updated, &prepared);

        let written = self.with_task(mission_id, task_id, |task| {
            *task = updated.clone();
            Ok(())
        });
        if let Err(err) = written {
            if let Ok(route) = &planned {
                self.release_route(route);
            }
            return Err(match err {
                PlannerError::MissionNotFound(id) => PlannerError::Cancelled(id),
                other => other,
            });
        }

        let route = planned?;
        tracing::info!(
            mission_id,
            task_id,
            route_id = %route.id,
            status = ?updated.status(),
            "Task rerouted"
        );
        self.task_validation(mission_id, task_id)
    }

    /// Plan and attach a route for a task along its current endpoints.
    pub fn plan_task_route(&self, mission_id: &str, task_id: &str) -> Result<Route> {
        let (task, cancel) = {
            let entry = self
                .missions
                .get(mission_id)
                .ok_or_else(|| PlannerError::MissionNotFound(mission_id.to_string()))?;
            let task = entry
                .mission
                .task(task_id)
                .cloned()
                .ok_or_else(|| PlannerError::TaskNotFound(task_id.to_string()))?;
            (task, entry.cancel.clone())
        };
        let (Some(source), Some(destination)) = (task.path.origin(), task.path.destination())
        else {
            return Err(PlannerError::TaskNotFound(task_id.to_string()));
        };

        if let Some(previous) = &task.route {
            self.release_route(previous);
        }
        let request = RouteRequest {
            source,
            destination,
            drone: task.drone,
            drone_id: task.drone_id.clone(),
            goal: self.optimizer.goal,
        };
        let scope = SearchScope {
            mission_id: Some(mission_id.to_string()),
            avoid_zones: BTreeSet::new(),
            cancel,
        };
        let planned = self
            .optimizer()
            .plan(&request, &self.zones.snapshot(Utc::now()), &scope);
        let route = match planned {
            Ok(route) => route,
            Err(err) => {
                // The previous route's bays are gone; never leave it attached.
                if let Some(previous) = &task.route {
                    let _ = self.with_task(mission_id, task_id, |task| {
                        if task.route.as_ref().map(|route| &route.id) == Some(&previous.id) {
                            task.route = None;
                        }
                        Ok(())
                    });
                }
                return Err(err);
            }
        };

        let written = self.with_task(mission_id, task_id, |task| {
            task.route = Some(route.clone());
            Ok(())
        });
        if let Err(err) = written {
            self.release_route(&route);
            return Err(err);
        }
        Ok(route)
    }

    fn task_validation(&self, mission_id: &str, task_id: &str) -> Result<TaskValidation> {
        self.validation_results(mission_id)?
            .into_iter()
            .find(|validation| validation.task_id == task_id)
            .ok_or_else(|| PlannerError::TaskNotFound(task_id.to_string()))
    }

    pub fn validation_results(&self, mission_id: &str) -> Result<Vec<TaskValidation>> {
        let entry = self
            .missions
            .get(mission_id)
            .ok_or_else(|| PlannerError::MissionNotFound(mission_id.to_string()))?;
        Ok(self.compliance.validation_results(&entry.mission))
    }

    pub fn deployability(&self, mission_id: &str) -> Result<DeployabilityReport> {
        let entry = self
            .missions
            .get(mission_id)
            .ok_or_else(|| PlannerError::MissionNotFound(mission_id.to_string()))?;
        Ok(self.compliance.deployability_check(&entry.mission))
    }

    /// Abort in-flight searches and release every reservation of the mission.
    pub fn cancel_mission(&self, mission_id: &str) -> Result<Mission> {
        let (_, entry) = self
            .missions
            .remove(mission_id)
            .ok_or_else(|| PlannerError::MissionNotFound(mission_id.to_string()))?;
        entry.cancel.cancel();
        for task in &entry.mission.tasks {
            if let Some(route) = &task.route {
                self.release_route(route);
            }
        }
        tracing::info!(mission_id, "Mission cancelled");
        Ok(entry.mission)
    }

    /// Hand a deployable mission off for execution.
    ///
    /// Reservations stay held; they are the deployed docking stops.
    pub fn deploy_mission(&self, mission_id: &str) -> Result<DeployedMission> {
        let removed = self.missions.remove_if(mission_id, |_, entry| {
            self.compliance.deployability_check(&entry.mission).deployable
        });
        let Some((_, entry)) = removed else {
            let report = self.deployability(mission_id)?;
            return Err(PlannerError::NotDeployable {
                mission_id: mission_id.to_string(),
                blocking_tasks: report.blocking_tasks,
            });
        };

        let routes: Vec<Route> = entry
            .mission
            .tasks
            .iter()
            .filter_map(|task| task.route.clone())
            .collect();
        tracing::info!(mission_id, routes = routes.len(), "Mission deployed");
        Ok(DeployedMission {
            mission: entry.mission,
            routes,
            deployed_at: Utc::now(),
        })
    }
}

fn needs_reroute(task: &Task) -> bool {
    task.rule == RestrictionRule::AutoReroute && !task.conflicts.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ComplianceConfig;
    use crate::docking::ChargingModel;
    use crate::models::{LatLng, Zone, ZoneKind};
    use chrono::Duration;

    fn planner() -> MissionPlanner {
        MissionPlanner::new(
            Arc::new(ZoneRegistry::new()),
            DockingStationAllocator::new(ChargingModel::default()),
            ComplianceRuleEngine::new(ComplianceConfig::default()),
            OptimizerConfig::default(),
        )
    }

    fn block(id: &str, kind: ZoneKind) -> Zone {
        let mut zone = Zone::new(
            id,
            id,
            kind,
            vec![
                LatLng::new(12.995, 80.19),
                LatLng::new(12.995, 80.21),
                LatLng::new(13.005, 80.21),
                LatLng::new(13.005, 80.19),
            ],
        );
        if kind == ZoneKind::TemporaryRestriction {
            zone.valid_until = Some(Utc::now() + Duration::hours(3));
        }
        zone
    }

    fn draft(name: &str, rule: RestrictionRule) -> TaskDraft {
        TaskDraft {
            id: Some(name.to_string()),
            name: name.to_string(),
            rule,
            waypoints: vec![
                Waypoint::from(LatLng::new(13.0, 80.15)),
                Waypoint::from(LatLng::new(13.0, 80.25)),
            ],
            drone: None,
            drone_id: None,
        }
    }

    #[test]
    fn auto_reroute_clears_conflict() {
        let planner = planner();
        planner.zones().upsert_zone(block("tfr", ZoneKind::TemporaryRestriction)).unwrap();

        let mission = planner
            .create_mission("survey", vec![draft("t1", RestrictionRule::AutoReroute)])
            .unwrap();
        let task = &mission.tasks[0];
        assert_eq!(task.status(), TaskStatus::Clear);
        assert!(task.route.is_some());
        assert!(planner.deployability(&mission.id).unwrap().deployable);
    }

    #[test]
    fn hard_geofence_keeps_path_and_blocks() {
        let planner = planner();
        planner.zones().upsert_zone(block("tfr", ZoneKind::TemporaryRestriction)).unwrap();

        let mission = planner
            .create_mission("survey", vec![draft("t1", RestrictionRule::HardGeofence)])
            .unwrap();
        assert_eq!(mission.tasks[0].status(), TaskStatus::Warning);
        let report = planner.deployability(&mission.id).unwrap();
        assert_eq!(report.blocking_tasks, vec!["t1".to_string()]);

        let err = planner.deploy_mission(&mission.id).unwrap_err();
        assert!(matches!(err, PlannerError::NotDeployable { .. }));

        planner.acknowledge(&mission.id, "t1", "tfr").unwrap();
        let deployed = planner.deploy_mission(&mission.id).unwrap();
        assert_eq!(deployed.mission.id, mission.id);
        assert!(planner.mission(&mission.id).is_err());
    }

    #[test]
    fn zone_toggle_shows_on_revalidate() {
        let planner = planner();
        planner.zones().upsert_zone(block("nf", ZoneKind::NoFly)).unwrap();
        let mission = planner
            .create_mission("survey", vec![draft("t1", RestrictionRule::HardGeofence)])
            .unwrap();
        assert_eq!(mission.tasks[0].status(), TaskStatus::Prohibited);

        planner.zones().set_active("nf", false).unwrap();
        let validation = planner.revalidate_task(&mission.id, "t1").unwrap();
        assert_eq!(validation.status, TaskStatus::Clear);
    }

    #[test]
    fn cancel_releases_reservations() {
        let planner = planner();
        planner
            .allocator()
            .register_station(crate::models::DockingStation {
                id: "d1".into(),
                name: "Dock".into(),
                location: LatLng::new(13.0, 80.2),
                capacity: 1,
                occupancy: 0,
                charging_type: crate::models::ChargingType::BatterySwap,
            })
            .unwrap();
        let mut long = draft("t1", RestrictionRule::HardGeofence);
        long.drone = Some(DroneProfile {
            battery_capacity_wh: 150.0,
            consumption_wh_per_km: 15.0,
            ..DroneProfile::default()
        });
        let mission = planner.create_mission("survey", vec![long]).unwrap();
        let route = planner.plan_task_route(&mission.id, "t1").unwrap();
        assert_eq!(route.stops.len(), 1);
        assert_eq!(planner.allocator().station("d1").unwrap().occupancy, 1);

        planner.cancel_mission(&mission.id).unwrap();
        assert_eq!(planner.allocator().station("d1").unwrap().occupancy, 0);
        assert!(matches!(
            planner.acknowledge(&mission.id, "t1", "x"),
            Err(PlannerError::MissionNotFound(_))
        ));
    }

    #[test]
    fn failed_replan_detaches_released_route() {
        let planner = planner();
        planner
            .allocator()
            .register_station(crate::models::DockingStation {
                id: "d1".into(),
                name: "Dock".into(),
                location: LatLng::new(13.0, 80.2),
                capacity: 1,
                occupancy: 0,
                charging_type: crate::models::ChargingType::BatterySwap,
            })
            .unwrap();
        let mut long = draft("t1", RestrictionRule::HardGeofence);
        long.drone = Some(DroneProfile {
            battery_capacity_wh: 150.0,
            consumption_wh_per_km: 15.0,
            ..DroneProfile::default()
        });
        let mission = planner.create_mission("survey", vec![long]).unwrap();
        planner.plan_task_route(&mission.id, "t1").unwrap();
        assert_eq!(planner.allocator().station("d1").unwrap().occupancy, 1);

        // A NoFly wall across the whole corridor makes every leg non-compliant.
        planner
            .zones()
            .upsert_zone(Zone::new(
                "wall",
                "Wall",
                ZoneKind::NoFly,
                vec![
                    LatLng::new(12.5, 80.17),
                    LatLng::new(12.5, 80.18),
                    LatLng::new(13.5, 80.18),
                    LatLng::new(13.5, 80.17),
                ],
            ))
            .unwrap();
        assert!(planner.plan_task_route(&mission.id, "t1").is_err());

        let task = planner.mission(&mission.id).unwrap().tasks.remove(0);
        assert!(task.route.is_none());
        assert_eq!(planner.allocator().station("d1").unwrap().occupancy, 0);
    }

    #[test]
    fn unknown_task_is_reported() {
        let planner = planner();
        let mission = planner
            .create_mission("survey", vec![draft("t1", RestrictionRule::WarnRecord)])
            .unwrap();
        assert_eq!(
            planner.revalidate_task(&mission.id, "nope").unwrap_err(),
            PlannerError::TaskNotFound("nope".into())
        );
    }
}
