//! Router assembly and ad-hoc route planning endpoints.

use axum::{
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use dockroute_core::{ReservationId, Route, RouteRequest};

use crate::api::{missions, run_planner, stations, zones, ApiError, ApiResult};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    let zone_routes = Router::new()
        .route("/v1/zones", post(zones::create_zone).get(zones::list_zones))
        .route("/v1/zones/feed", post(zones::ingest_feed))
        .route("/v1/zones/check-path", post(zones::check_path))
        .route("/v1/zones/:id", get(zones::get_zone).delete(zones::delete_zone))
        .route("/v1/zones/:id/active", put(zones::set_zone_active));

    let station_routes = Router::new()
        .route(
            "/v1/stations",
            post(stations::register_station).get(stations::list_stations),
        )
        .route("/v1/stations/nearest", get(stations::nearest_station))
        .route("/v1/stations/:id", get(stations::get_station))
        .route("/v1/stations/:id/charge-time", get(stations::charge_time))
        .route("/v1/stations/:id/reservations", post(stations::reserve))
        .route("/v1/reservations/:id", delete(stations::release));

    let mission_routes = Router::new()
        .route(
            "/v1/missions",
            post(missions::create_mission).get(missions::list_missions),
        )
        .route("/v1/missions/:id", get(missions::get_mission))
        .route("/v1/missions/:id/validation", get(missions::validation_results))
        .route("/v1/missions/:id/revalidate", post(missions::revalidate_mission))
        .route("/v1/missions/:id/deployability", get(missions::deployability))
        .route("/v1/missions/:id/cancel", post(missions::cancel_mission))
        .route("/v1/missions/:id/deploy", post(missions::deploy_mission))
        .route("/v1/missions/:id/deployed-routes", get(missions::deployed_routes))
        .route(
            "/v1/missions/:id/tasks/:task_id/acknowledge",
            post(missions::acknowledge),
        )
        .route("/v1/missions/:id/tasks/:task_id/rule", put(missions::set_rule))
        .route("/v1/missions/:id/tasks/:task_id/route", post(missions::plan_task_route))
        .route("/v1/missions/:id/tasks/:task_id/reroute", post(missions::reroute_task));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/v1/routes/plan", post(plan_route))
        .route("/v1/routes/release", post(release_route))
        .merge(zone_routes)
        .merge(station_routes)
        .merge(mission_routes)
}

/// Plan a route for an ad-hoc request. The caller owns the reservations.
pub async fn plan_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteRequest>,
) -> ApiResult<Json<Route>> {
    if !request.source.is_valid() || !request.destination.is_valid() {
        return Err(ApiError::BadRequest(
            "source and destination must be valid coordinates".to_string(),
        ));
    }
    let route = run_planner(state, move |state| state.planner().plan_route(&request)).await?;
    Ok(Json(route))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRouteRequest {
    pub reservation_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseRouteResponse {
    pub released: usize,
}

/// Give back the docking reservations of an abandoned ad-hoc route.
pub async fn release_route(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReleaseRouteRequest>,
) -> ApiResult<Json<ReleaseRouteResponse>> {
    let ids = req
        .reservation_ids
        .iter()
        .map(|raw| {
            ReservationId::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("invalid reservation id '{raw}'")))
        })
        .collect::<ApiResult<Vec<_>>>()?;
    let allocator = state.planner().allocator();
    let released = ids.iter().filter(|id| allocator.release(id)).count();
    Ok(Json(ReleaseRouteResponse { released }))
}
