//! Multi-leg route optimization under battery and docking constraints.
//!
//! The search runs over a stop graph whose nodes are the source, the
//! destination and every available docking station. An edge exists when the
//! leg between two stops is flyable within the drone's safe range along a
//! path that is not prohibited. Dijkstra picks the cheapest stop sequence;
//! chosen stations are then reserved, and a full station triggers a bounded
//! re-search without it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::compliance::ComplianceRuleEngine;
use crate::conflict::BufferedZone;
use crate::detour::{self, Obstacle};
use crate::docking::{DockingStationAllocator, ReservationGuard};
use crate::error::{InfeasibleReason, PlannerError, Result};
use crate::models::{
    DockingStation, DockingStop, LatLng, Leg, OptimizationGoal, Route, RouteKind, RouteRequest,
    StationStatus, Stop, ZoneKind,
};
use crate::spatial;
use crate::zones::ZoneSnapshot;

const SOURCE: usize = 0;
const DESTINATION: usize = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Searches attempted before giving up on reservation races.
    pub max_reservation_attempts: u32,
    /// Seconds added to a leg that spends its entire usable battery.
    pub safety_penalty_s: f64,
    /// Extra distance kept between detours and prohibited zones.
    pub detour_clearance_m: f64,
    /// State of charge a drone leaves a docking station with.
    pub target_charge_pct: f64,
    /// Goal for routes the mission planner derives from task paths.
    pub goal: OptimizationGoal,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_reservation_attempts: 3,
            safety_penalty_s: 600.0,
            detour_clearance_m: 50.0,
            target_charge_pct: 100.0,
            goal: OptimizationGoal::MinimizeTime,
        }
    }
}

/// Per-request search options.
#[derive(Debug, Clone, Default)]
pub struct SearchScope {
    /// Mission the search runs for, used in cancellation errors.
    pub mission_id: Option<String>,
    /// Zones whose buffers must be avoided entirely.
    pub avoid_zones: BTreeSet<String>,
    pub cancel: CancellationToken,
}

impl SearchScope {
    fn label(&self) -> String {
        self.mission_id.clone().unwrap_or_else(|| "ad-hoc".to_string())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PlannerError::Cancelled(self.label()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub attempts: u32,
    pub legs_evaluated: usize,
    pub detours_computed: usize,
}

pub struct MultiLegRouteOptimizer<'a> {
    config: &'a OptimizerConfig,
    compliance: &'a ComplianceRuleEngine,
    allocator: &'a DockingStationAllocator,
    #[cfg(test)]
    hook: Option<&'a dyn Fn(PlanStage, &Route)>,
}

/// Points in `plan` where tests can interleave competing work.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanStage {
    StopsChosen,
    StopsReserved,
}

impl<'a> MultiLegRouteOptimizer<'a> {
    pub fn new(
        config: &'a OptimizerConfig,
        compliance: &'a ComplianceRuleEngine,
        allocator: &'a DockingStationAllocator,
    ) -> Self {
        Self {
            config,
            compliance,
            allocator,
            #[cfg(test)]
            hook: None,
        }
    }

    #[cfg(test)]
    fn with_hook(mut self, hook: &'a dyn Fn(PlanStage, &Route)) -> Self {
        self.hook = Some(hook);
        self
    }

    #[cfg(test)]
    fn run_hook(&self, stage: PlanStage, route: &Route) {
        if let Some(hook) = self.hook {
            hook(stage, route);
        }
    }

    /// Plan and reserve a route.
    ///
    /// On success the returned route owns its docking reservations. On any
    /// error every provisional reservation has been released.
    pub fn plan(
        &self,
        request: &RouteRequest,
        zones: &ZoneSnapshot,
        scope: &SearchScope,
    ) -> Result<Route> {
        scope.check_cancelled()?;
        let prepared = self.compliance.prepare(zones.zones());
        let obstacles = self.obstacles(&prepared, &scope.avoid_zones);
        let env = SearchEnv {
            optimizer: self,
            request,
            zones: &prepared,
            obstacles: &obstacles,
            scope,
        };

        if let Some(route) = self.direct_route(&env) {
            tracing::info!(
                distance_m = route.total_distance_m,
                drone_id = %request.drone_id,
                "Direct route planned"
            );
            return Ok(route);
        }

        let mut stats = SearchStats::default();
        let mut excluded: BTreeSet<String> = BTreeSet::new();
        let attempts = self.config.max_reservation_attempts.max(1);

        for attempt in 1..=attempts {
            stats.attempts = attempt;
            let mut search = RouteSearch::new(&env, self.stop_nodes(&excluded, false), true);
            let found = search.shortest_path();
            stats.legs_evaluated += search.legs_evaluated;
            stats.detours_computed += search.detours_computed;

            let Some(sequence) = found? else {
                tracing::debug!(?stats, "Stop graph has no path");
                return Err(self.classify_failure(&env, &excluded)?);
            };

            let mut route = search.assemble(&sequence)?;
            #[cfg(test)]
            self.run_hook(PlanStage::StopsChosen, &route);

            let mut guard = ReservationGuard::new(self.allocator);
            match reserve_stops(&mut guard, &mut route, &request.drone_id) {
                Ok(()) => {
                    #[cfg(test)]
                    self.run_hook(PlanStage::StopsReserved, &route);
                    scope.check_cancelled()?;
                    guard.commit();
                    tracing::info!(
                        route_id = %route.id,
                        legs = route.legs.len(),
                        stops = route.stops.len(),
                        total_time_s = route.total_time_s,
                        ?stats,
                        "Multi-leg route planned"
                    );
                    return Ok(route);
                }
                Err(PlannerError::StationFull { station_id, .. }) => {
                    tracing::warn!(
                        station_id = %station_id,
                        attempt,
                        "Docking station filled during planning, re-searching without it"
                    );
                    guard.release_all();
                    excluded.insert(station_id);
                }
                Err(err) => return Err(err),
            }
        }

        Err(PlannerError::infeasible(
            InfeasibleReason::NoDockingCapacity,
            format!(
                "reservations failed after {attempts} attempts; excluded stations: {}",
                excluded.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        ))
    }

    /// Obstacles for detours: prohibited zones plus explicitly avoided ones.
    fn obstacles(&self, zones: &[BufferedZone], avoid: &BTreeSet<String>) -> ObstacleSet {
        let buffer_m = self.compliance.config().buffer_distance_m.max(0.0);
        let segments = self.compliance.config().buffer_segments;
        let clearance = self.config.detour_clearance_m.max(1.0);

        let mut wide = Vec::new();
        let mut narrow = Vec::new();
        for zone in zones {
            let avoided = avoid.contains(&zone.zone.id);
            let prohibited = matches!(zone.zone.kind, ZoneKind::NoFly | ZoneKind::Restricted);
            if !avoided && !prohibited {
                continue;
            }
            let outside_buffer = Obstacle::new(
                &zone.zone.id,
                &zone.zone.polygon,
                buffer_m + clearance,
                segments,
            );
            if avoided {
                narrow.push(outside_buffer.clone());
            } else {
                narrow.push(Obstacle::new(&zone.zone.id, &zone.zone.polygon, clearance, segments));
            }
            wide.push(outside_buffer);
        }
        ObstacleSet { wide, narrow }
    }

    fn direct_route(&self, env: &SearchEnv<'_, '_>) -> Option<Route> {
        let request = env.request;
        let path = vec![request.source, request.destination];
        let distance = request.source.distance_m(&request.destination);
        if distance > request.drone.safe_range_m(request.drone.initial_soc_pct) {
            return None;
        }
        if !env.is_compliant(&path) {
            return None;
        }
        let mut search = RouteSearch::new(env, Vec::new(), false);
        search.paths.insert((SOURCE, DESTINATION), Some(path));
        search.assemble(&[SOURCE, DESTINATION]).ok()
    }

    fn stop_nodes(&self, excluded: &BTreeSet<String>, include_unavailable: bool) -> Vec<StopNode> {
        let stations = self
            .allocator
            .list_stations()
            .into_iter()
            .filter(|station| !excluded.contains(&station.id))
            .filter(|station| include_unavailable || station.status() != StationStatus::Occupied);
        stations.map(StopNode::station).collect()
    }

    /// Decide why no route exists by relaxing one constraint at a time.
    fn classify_failure(
        &self,
        env: &SearchEnv<'_, '_>,
        excluded: &BTreeSet<String>,
    ) -> Result<PlannerError> {
        let request = env.request;
        let distance_km = request.source.distance_m(&request.destination) / 1000.0;
        let range_km = request.drone.safe_range_m(self.config.target_charge_pct) / 1000.0;

        let mut with_full_stations =
            RouteSearch::new(env, self.stop_nodes(&BTreeSet::new(), true), true);
        if with_full_stations.shortest_path()?.is_some() {
            return Ok(PlannerError::infeasible(
                InfeasibleReason::NoDockingCapacity,
                format!(
                    "a route exists only through full docking stations ({} excluded after reservation failures)",
                    excluded.len()
                ),
            ));
        }

        let mut ignoring_zones =
            RouteSearch::new(env, self.stop_nodes(&BTreeSet::new(), true), false);
        if ignoring_zones.shortest_path()?.is_some() {
            return Ok(PlannerError::infeasible(
                InfeasibleReason::NoCompliantPath,
                format!(
                    "every stop sequence bridging {distance_km:.1} km crosses a prohibited zone"
                ),
            ));
        }

        Ok(PlannerError::infeasible(
            InfeasibleReason::BatteryRangeExhausted,
            format!(
                "no chain of docking stations bridges {distance_km:.1} km with a per-leg safe range of {range_km:.1} km"
            ),
        ))
    }
}

fn reserve_stops(
    guard: &mut ReservationGuard<'_>,
    route: &mut Route,
    drone_id: &str,
) -> Result<()> {
    for stop in route.stops.iter_mut() {
        let id = guard.reserve(&stop.station_id, drone_id)?;
        stop.reservation_id = id.to_string();
    }
    Ok(())
}

struct ObstacleSet {
    /// Clear of zone buffers.
    wide: Vec<Obstacle>,
    /// Clear of prohibited zones only; avoided zones keep their wide ring.
    narrow: Vec<Obstacle>,
}

struct SearchEnv<'o, 'r> {
    optimizer: &'r MultiLegRouteOptimizer<'o>,
    request: &'r RouteRequest,
    zones: &'r [BufferedZone],
    obstacles: &'r ObstacleSet,
    scope: &'r SearchScope,
}

impl SearchEnv<'_, '_> {
    /// Not prohibited and clear of every avoided zone.
    fn is_compliant(&self, path: &[LatLng]) -> bool {
        self.optimizer
            .compliance
            .evaluate_path("route-search", path, self.zones)
            .iter()
            .all(|conflict| {
                !conflict.is_critical() && !self.scope.avoid_zones.contains(&conflict.zone_id)
            })
    }
}

#[derive(Debug, Clone)]
struct StopNode {
    stop: Stop,
    station: Option<DockingStation>,
}

impl StopNode {
    fn station(station: DockingStation) -> Self {
        Self {
            stop: Stop::Station {
                station_id: station.id.clone(),
                name: station.name.clone(),
                location: station.location,
                charging_type: station.charging_type,
            },
            station: Some(station),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LegMetrics {
    start_soc_pct: f64,
    end_soc_pct: f64,
    consumed_pct: f64,
    margin_pct: f64,
    flight_time_s: f64,
    charge_time_s: f64,
    energy_wh: f64,
    cost: f64,
}

/// Lexicographic Dijkstra label: cost, then fewer stops, then larger margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
struct Label {
    cost_milli: i64,
    stops: u32,
    neg_margin_milli: i64,
}

impl Label {
    fn extend(self, metrics: &LegMetrics, docks: bool) -> Self {
        Self {
            cost_milli: self.cost_milli + (metrics.cost * 1000.0).round() as i64,
            stops: self.stops + u32::from(docks),
            neg_margin_milli: self.neg_margin_milli - (metrics.margin_pct * 1000.0).round() as i64,
        }
    }
}

struct RouteSearch<'e, 'o, 'r> {
    env: &'e SearchEnv<'o, 'r>,
    nodes: Vec<StopNode>,
    enforce_compliance: bool,
    /// Leg paths keyed by (lower, higher) node index, oriented low to high.
    paths: HashMap<(usize, usize), Option<Vec<LatLng>>>,
    legs_evaluated: usize,
    detours_computed: usize,
}

impl<'e, 'o, 'r> RouteSearch<'e, 'o, 'r> {
    fn new(env: &'e SearchEnv<'o, 'r>, stations: Vec<StopNode>, enforce_compliance: bool) -> Self {
        let mut nodes = vec![
            StopNode {
                stop: Stop::Source {
                    location: env.request.source,
                },
                station: None,
            },
            StopNode {
                stop: Stop::Destination {
                    location: env.request.destination,
                },
                station: None,
            },
        ];
        nodes.extend(stations);
        Self {
            env,
            nodes,
            enforce_compliance,
            paths: HashMap::new(),
            legs_evaluated: 0,
            detours_computed: 0,
        }
    }

    fn config(&self) -> &OptimizerConfig {
        self.env.optimizer.config
    }

    fn start_soc(&self, node: usize) -> f64 {
        if node == SOURCE {
            self.env.request.drone.initial_soc_pct
        } else {
            self.config().target_charge_pct.min(100.0)
        }
    }

    fn leg_path(&mut self, from: usize, to: usize) -> Option<Vec<LatLng>> {
        let key = (from.min(to), from.max(to));
        if !self.paths.contains_key(&key) {
            let a = self.nodes[key.0].stop.location();
            let b = self.nodes[key.1].stop.location();
            let path = self.compute_path(a, b);
            self.paths.insert(key, path);
        }
        let mut path = self.paths.get(&key)?.clone()?;
        if from > to {
            path.reverse();
        }
        Some(path)
    }

    fn compute_path(&mut self, a: LatLng, b: LatLng) -> Option<Vec<LatLng>> {
        let env = self.env;
        let straight = vec![a, b];
        if !self.enforce_compliance || env.is_compliant(&straight) {
            return Some(straight);
        }
        for obstacles in [&env.obstacles.wide, &env.obstacles.narrow] {
            if obstacles.is_empty() {
                continue;
            }
            self.detours_computed += 1;
            if let Some(path) = detour::find_detour(a, b, obstacles) {
                if env.is_compliant(&path) {
                    return Some(path);
                }
            }
        }
        None
    }

    fn metrics(&self, from: usize, to: usize, distance_m: f64) -> Option<LegMetrics> {
        let drone = &self.env.request.drone;
        let config = self.config();
        let start_soc_pct = self.start_soc(from);
        let consumed_pct = drone.consumption_pct(distance_m);
        let end_soc_pct = start_soc_pct - consumed_pct;
        if !end_soc_pct.is_finite() || end_soc_pct + 1e-9 < drone.safety_margin_pct {
            return None;
        }
        let margin_pct = (end_soc_pct - drone.safety_margin_pct).max(0.0);

        let charge_time_s = match &self.nodes[to].station {
            Some(station) => self
                .env
                .optimizer
                .allocator
                .charging_model()
                .charge_time(station.charging_type, end_soc_pct, config.target_charge_pct)
                .as_secs_f64(),
            None => 0.0,
        };
        let flight_time_s = drone.flight_time_s(distance_m);
        let energy_wh = drone.energy_wh(distance_m);

        let cost = match self.env.request.goal {
            OptimizationGoal::MinimizeTime => flight_time_s + charge_time_s,
            OptimizationGoal::MinimizeBattery => energy_wh,
            OptimizationGoal::MaximizeSafety => {
                let usable = start_soc_pct - drone.safety_margin_pct;
                let headroom = if usable > 0.0 {
                    (margin_pct / usable).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                flight_time_s + charge_time_s + config.safety_penalty_s * (1.0 - headroom).powi(2)
            }
        };

        Some(LegMetrics {
            start_soc_pct,
            end_soc_pct,
            consumed_pct,
            margin_pct,
            flight_time_s,
            charge_time_s,
            energy_wh,
            cost,
        })
    }

    /// Dijkstra over the stop graph. Returns the node sequence, if any.
    fn shortest_path(&mut self) -> Result<Option<Vec<usize>>> {
        let n = self.nodes.len();
        let mut best: Vec<Option<Label>> = vec![None; n];
        let mut prev: Vec<Option<usize>> = vec![None; n];
        let mut open: BinaryHeap<Reverse<(Label, usize)>> = BinaryHeap::new();
        best[SOURCE] = Some(Label::default());
        open.push(Reverse((Label::default(), SOURCE)));

        while let Some(Reverse((label, u))) = open.pop() {
            self.env.scope.check_cancelled()?;
            if best[u] != Some(label) {
                continue;
            }
            if u == DESTINATION {
                break;
            }

            let from = self.nodes[u].stop.location();
            let range_m = self.env.request.drone.safe_range_m(self.start_soc(u));
            for v in DESTINATION..n {
                if v == u {
                    continue;
                }
                if from.distance_m(&self.nodes[v].stop.location()) > range_m {
                    continue;
                }
                self.legs_evaluated += 1;
                let Some(path) = self.leg_path(u, v) else {
                    continue;
                };
                let Some(metrics) = self.metrics(u, v, spatial::path_length_m(&path)) else {
                    continue;
                };
                let next = label.extend(&metrics, self.nodes[v].station.is_some());
                if best[v].map_or(true, |current| next < current) {
                    best[v] = Some(next);
                    prev[v] = Some(u);
                    open.push(Reverse((next, v)));
                }
            }
        }

        if best[DESTINATION].is_none() {
            return Ok(None);
        }
        let mut sequence = vec![DESTINATION];
        let mut cursor = DESTINATION;
        while let Some(p) = prev[cursor] {
            sequence.push(p);
            cursor = p;
        }
        sequence.reverse();
        Ok(Some(sequence))
    }

    /// Turn a node sequence into a route without reservations.
    ///
    /// Every leg was already checked by the search, so a leg without metrics
    /// means the sequence did not come from this search.
    fn assemble(&mut self, sequence: &[usize]) -> Result<Route> {
        let mut legs = Vec::with_capacity(sequence.len().saturating_sub(1));
        let mut stops = Vec::new();

        for (index, pair) in sequence.windows(2).enumerate() {
            let (u, v) = (pair[0], pair[1]);
            let path = self.leg_path(u, v).unwrap_or_else(|| {
                vec![self.nodes[u].stop.location(), self.nodes[v].stop.location()]
            });
            let distance_m = spatial::path_length_m(&path);
            let Some(metrics) = self.metrics(u, v, distance_m) else {
                tracing::error!(from = u, to = v, "Assembled leg has no metrics");
                return Err(PlannerError::infeasible(
                    InfeasibleReason::BatteryRangeExhausted,
                    format!("leg {index} of the chosen stop sequence is not flyable"),
                ));
            };

            if let Some(station) = &self.nodes[v].station {
                stops.push(DockingStop {
                    station_id: station.id.clone(),
                    name: station.name.clone(),
                    location: station.location,
                    charging_type: station.charging_type,
                    reservation_id: String::new(),
                    arrival_soc_pct: metrics.end_soc_pct,
                    charge_time_s: metrics.charge_time_s,
                });
            }
            legs.push(Leg {
                index,
                from: self.nodes[u].stop.clone(),
                to: self.nodes[v].stop.clone(),
                path,
                distance_m,
                flight_time_s: metrics.flight_time_s,
                start_soc_pct: metrics.start_soc_pct,
                end_soc_pct: metrics.end_soc_pct,
                battery_consumed_pct: metrics.consumed_pct,
                margin_pct: metrics.margin_pct,
                charge_time_s: metrics.charge_time_s,
            });
        }

        let total_distance_m = legs.iter().map(|leg| leg.distance_m).sum();
        let total_flight_time_s: f64 = legs.iter().map(|leg| leg.flight_time_s).sum();
        let total_charge_time_s: f64 = legs.iter().map(|leg| leg.charge_time_s).sum();
        let energy_wh = legs
            .iter()
            .map(|leg| self.env.request.drone.energy_wh(leg.distance_m))
            .sum();
        let kind = if !stops.is_empty() {
            RouteKind::MultiLeg
        } else if legs.iter().any(|leg| leg.path.len() > 2) {
            RouteKind::Detour
        } else {
            RouteKind::Direct
        };

        Ok(Route {
            id: Uuid::new_v4().to_string(),
            kind,
            goal: self.env.request.goal,
            legs,
            stops,
            total_distance_m,
            total_flight_time_s,
            total_charge_time_s,
            total_time_s: total_flight_time_s + total_charge_time_s,
            energy_wh,
            planned_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ComplianceConfig;
    use crate::models::{ChargingType, DroneProfile, Zone};
    use crate::spatial::meters_to_lat;

    const BASE_LAT: f64 = 12.8;
    const BASE_LNG: f64 = 80.1;

    fn north_of_base(km: f64) -> LatLng {
        LatLng::new(BASE_LAT + meters_to_lat(km * 1000.0, BASE_LAT), BASE_LNG)
    }

    fn drone() -> DroneProfile {
        // 20 km safe range from a full battery.
        DroneProfile {
            battery_capacity_wh: 400.0,
            consumption_wh_per_km: 17.0,
            safety_margin_pct: 15.0,
            cruise_speed_mps: 15.0,
            initial_soc_pct: 100.0,
        }
    }

    fn request(km: f64) -> RouteRequest {
        RouteRequest {
            source: north_of_base(0.0),
            destination: north_of_base(km),
            drone: drone(),
            drone_id: "drone-1".into(),
            goal: OptimizationGoal::MinimizeTime,
        }
    }

    fn station(id: &str, km: f64, capacity: u32) -> DockingStation {
        DockingStation {
            id: id.into(),
            name: id.into(),
            location: north_of_base(km),
            capacity,
            occupancy: 0,
            charging_type: ChargingType::Fast,
        }
    }

    struct Fixture {
        config: OptimizerConfig,
        compliance: ComplianceRuleEngine,
        allocator: DockingStationAllocator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: OptimizerConfig::default(),
                compliance: ComplianceRuleEngine::new(ComplianceConfig::default()),
                allocator: DockingStationAllocator::default(),
            }
        }

        fn optimizer(&self) -> MultiLegRouteOptimizer<'_> {
            MultiLegRouteOptimizer::new(&self.config, &self.compliance, &self.allocator)
        }

        fn plan(&self, request: &RouteRequest, zones: Vec<Zone>) -> Result<Route> {
            let snapshot = ZoneSnapshot::from_zones(zones, Utc::now());
            self.optimizer()
                .plan(request, &snapshot, &SearchScope::default())
        }
    }

    fn band_across(km: f64, kind: ZoneKind) -> Zone {
        // 1 km tall band spanning well past the route on both sides.
        let south = north_of_base(km).lat;
        let north = north_of_base(km + 1.0).lat;
        Zone::new(
            "band",
            "Band",
            kind,
            vec![
                LatLng::new(south, BASE_LNG - 0.5),
                LatLng::new(south, BASE_LNG + 0.5),
                LatLng::new(north, BASE_LNG + 0.5),
                LatLng::new(north, BASE_LNG - 0.5),
            ],
        )
    }

    #[test]
    fn short_clear_route_is_direct() {
        let fixture = Fixture::new();
        let route = fixture.plan(&request(10.0), Vec::new()).unwrap();
        assert_eq!(route.kind, RouteKind::Direct);
        assert_eq!(route.legs.len(), 1);
        assert!(route.stops.is_empty());
    }

    #[test]
    fn long_route_inserts_docking_stops() {
        let fixture = Fixture::new();
        fixture.allocator.register_station(station("d18", 18.0, 2)).unwrap();
        fixture.allocator.register_station(station("d31", 31.0, 2)).unwrap();

        let route = fixture.plan(&request(42.0), Vec::new()).unwrap();
        assert_eq!(route.kind, RouteKind::MultiLeg);
        assert_eq!(route.legs.len(), 3);
        let ids: Vec<_> = route.stops.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, vec!["d18", "d31"]);
        for leg in &route.legs {
            assert!(leg.end_soc_pct >= 15.0 - 1e-9);
        }
        assert_eq!(fixture.allocator.station("d18").unwrap().occupancy, 1);
    }

    #[test]
    fn no_stations_is_battery_infeasible() {
        let fixture = Fixture::new();
        let err = fixture.plan(&request(42.0), Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::RouteInfeasible {
                reason: InfeasibleReason::BatteryRangeExhausted,
                ..
            }
        ));
    }

    #[test]
    fn full_station_is_capacity_infeasible() {
        let fixture = Fixture::new();
        fixture.allocator.register_station(station("d15", 15.0, 1)).unwrap();
        fixture.allocator.reserve("d15", "other-drone").unwrap();

        let err = fixture.plan(&request(30.0), Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::RouteInfeasible {
                reason: InfeasibleReason::NoDockingCapacity,
                ..
            }
        ));
        assert_eq!(fixture.allocator.station("d15").unwrap().occupancy, 1);
    }

    #[test]
    fn wall_of_no_fly_is_compliance_infeasible() {
        let fixture = Fixture::new();
        let wall = band_across(5.0, ZoneKind::NoFly);
        let err = fixture.plan(&request(10.0), vec![wall]).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::RouteInfeasible {
                reason: InfeasibleReason::NoCompliantPath,
                ..
            }
        ));
    }

    #[test]
    fn no_fly_block_is_detoured() {
        let fixture = Fixture::new();
        let mid = north_of_base(5.0);
        let block = Zone::new(
            "block",
            "Block",
            ZoneKind::NoFly,
            vec![
                LatLng::new(mid.lat - 0.005, BASE_LNG - 0.01),
                LatLng::new(mid.lat - 0.005, BASE_LNG + 0.01),
                LatLng::new(mid.lat + 0.005, BASE_LNG + 0.01),
                LatLng::new(mid.lat + 0.005, BASE_LNG - 0.01),
            ],
        );
        let route = fixture.plan(&request(10.0), vec![block.clone()]).unwrap();
        assert_eq!(route.kind, RouteKind::Detour);

        let prepared = fixture.compliance.prepare(&[block]);
        let conflicts = fixture
            .compliance
            .evaluate_path("t", &route.flight_path().positions(), &prepared);
        assert!(conflicts.iter().all(|c| !c.is_critical()));
    }

    #[test]
    fn cancelled_scope_releases_and_fails() {
        let fixture = Fixture::new();
        fixture.allocator.register_station(station("d18", 18.0, 2)).unwrap();
        fixture.allocator.register_station(station("d31", 31.0, 2)).unwrap();
        let scope = SearchScope {
            mission_id: Some("m-1".into()),
            ..SearchScope::default()
        };
        scope.cancel.cancel();
        let snapshot = ZoneSnapshot::from_zones(Vec::new(), Utc::now());
        let err = fixture
            .optimizer()
            .plan(&request(42.0), &snapshot, &scope)
            .unwrap_err();
        assert_eq!(err, PlannerError::Cancelled("m-1".into()));
        assert_eq!(fixture.allocator.station("d18").unwrap().occupancy, 0);
    }

    #[test]
    fn station_taken_during_planning_is_re_searched() {
        let fixture = Fixture::new();
        fixture.allocator.register_station(station("d15", 15.0, 1)).unwrap();
        let mut backup = station("d15-east", 15.0, 1);
        backup.location.lng += 0.01;
        backup.charging_type = ChargingType::Slow;
        fixture.allocator.register_station(backup).unwrap();

        // A rival drone takes d15 after the search picked it.
        let rival = |stage: PlanStage, route: &Route| {
            if stage == PlanStage::StopsChosen
                && route.stops.iter().any(|stop| stop.station_id == "d15")
            {
                let _ = fixture.allocator.reserve("d15", "rival");
            }
        };
        let snapshot = ZoneSnapshot::from_zones(Vec::new(), Utc::now());
        let route = fixture
            .optimizer()
            .with_hook(&rival)
            .plan(&request(30.0), &snapshot, &SearchScope::default())
            .unwrap();

        let ids: Vec<_> = route.stops.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, vec!["d15-east"]);
        assert_eq!(fixture.allocator.station("d15").unwrap().occupancy, 1);
        assert_eq!(fixture.allocator.station("d15-east").unwrap().occupancy, 1);
    }

    #[test]
    fn repeated_races_exhaust_attempts() {
        let mut fixture = Fixture::new();
        fixture.config.max_reservation_attempts = 1;
        fixture.allocator.register_station(station("d15", 15.0, 1)).unwrap();
        fixture.allocator.register_station(station("d16", 16.0, 1)).unwrap();

        let rival = |stage: PlanStage, route: &Route| {
            if stage == PlanStage::StopsChosen {
                for stop in &route.stops {
                    let _ = fixture.allocator.reserve(&stop.station_id, "rival");
                }
            }
        };
        let snapshot = ZoneSnapshot::from_zones(Vec::new(), Utc::now());
        let err = fixture
            .optimizer()
            .with_hook(&rival)
            .plan(&request(30.0), &snapshot, &SearchScope::default())
            .unwrap_err();

        assert!(matches!(
            err,
            PlannerError::RouteInfeasible {
                reason: InfeasibleReason::NoDockingCapacity,
                ..
            }
        ));
    }

    #[test]
    fn cancel_after_reserving_releases_stops() {
        let fixture = Fixture::new();
        fixture.allocator.register_station(station("d18", 18.0, 2)).unwrap();
        fixture.allocator.register_station(station("d31", 31.0, 2)).unwrap();
        let scope = SearchScope {
            mission_id: Some("m-1".into()),
            ..SearchScope::default()
        };

        let reserved = std::cell::Cell::new(0);
        let cancel_mission = |stage: PlanStage, _: &Route| {
            if stage == PlanStage::StopsReserved {
                reserved.set(fixture.allocator.station("d18").unwrap().occupancy);
                scope.cancel.cancel();
            }
        };
        let snapshot = ZoneSnapshot::from_zones(Vec::new(), Utc::now());
        let err = fixture
            .optimizer()
            .with_hook(&cancel_mission)
            .plan(&request(42.0), &snapshot, &scope)
            .unwrap_err();

        assert_eq!(err, PlannerError::Cancelled("m-1".into()));
        assert_eq!(reserved.get(), 1);
        assert_eq!(fixture.allocator.station("d18").unwrap().occupancy, 0);
        assert_eq!(fixture.allocator.station("d31").unwrap().occupancy, 0);
    }

    #[test]
    fn unflyable_sequence_is_not_assembled() {
        let fixture = Fixture::new();
        let optimizer = fixture.optimizer();
        let request = request(42.0);
        let scope = SearchScope::default();
        let obstacles = ObstacleSet {
            wide: Vec::new(),
            narrow: Vec::new(),
        };
        let env = SearchEnv {
            optimizer: &optimizer,
            request: &request,
            zones: &[],
            obstacles: &obstacles,
            scope: &scope,
        };

        let mut search = RouteSearch::new(&env, Vec::new(), true);
        let err = search.assemble(&[SOURCE, DESTINATION]).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::RouteInfeasible {
                reason: InfeasibleReason::BatteryRangeExhausted,
                ..
            }
        ));
    }

    #[test]
    fn equal_cost_prefers_fewer_stops() {
        let label = Label::default();
        let metrics = LegMetrics {
            start_soc_pct: 100.0,
            end_soc_pct: 50.0,
            consumed_pct: 50.0,
            margin_pct: 35.0,
            flight_time_s: 100.0,
            charge_time_s: 0.0,
            energy_wh: 10.0,
            cost: 100.0,
        };
        let via_station = label.extend(&metrics, true);
        let direct = label.extend(&metrics, false);
        assert!(direct < via_station);

        let wider = LegMetrics {
            margin_pct: 40.0,
            ..metrics
        };
        assert!(label.extend(&wider, false) < direct);
    }

    #[test]
    fn battery_goal_avoids_detour_station() {
        let fixture = Fixture::new();
        // Two ways to bridge 30 km: via a station on the line, or a slightly
        // offset one that is quicker to charge at.
        fixture.allocator.register_station(station("on-line", 15.0, 2)).unwrap();
        let mut offset = station("offset", 15.0, 2);
        offset.location.lng += 0.02;
        offset.charging_type = ChargingType::BatterySwap;
        fixture.allocator.register_station(offset).unwrap();

        let mut battery_request = request(30.0);
        battery_request.goal = OptimizationGoal::MinimizeBattery;
        let route = fixture.plan(&battery_request, Vec::new()).unwrap();
        assert_eq!(route.stops[0].station_id, "on-line");

        let mut time_request = request(30.0);
        time_request.drone_id = "drone-2".into();
        let route = fixture.plan(&time_request, Vec::new()).unwrap();
        assert_eq!(route.stops[0].station_id, "offset");
    }
}
