//! Docking station inventory and reservation endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use dockroute_core::{
    ChargingType, DockingStation, LatLng, PlannerError, Reservation, ReservationId,
};

use crate::api::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterStationRequest {
    pub id: String,
    pub name: String,
    pub location: LatLng,
    pub capacity: u32,
    #[serde(default)]
    pub occupancy: u32,
    pub charging_type: ChargingType,
}

pub async fn register_station(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterStationRequest>,
) -> ApiResult<(StatusCode, Json<DockingStation>)> {
    let station = state
        .register_station(DockingStation {
            id: req.id,
            name: req.name,
            location: req.location,
            capacity: req.capacity,
            occupancy: req.occupancy,
            charging_type: req.charging_type,
        })
        .await?;
    tracing::info!("Registered docking station '{}' ({})", station.name, station.id);
    Ok((StatusCode::CREATED, Json(station)))
}

#[derive(Debug, Deserialize)]
pub struct StationListQuery {
    #[serde(default)]
    pub available: bool,
}

pub async fn list_stations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StationListQuery>,
) -> Json<Vec<DockingStation>> {
    let allocator = state.planner().allocator();
    Json(if query.available {
        allocator.available_stations()
    } else {
        allocator.list_stations()
    })
}

pub async fn get_station(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DockingStation>> {
    state
        .planner()
        .allocator()
        .station(&id)
        .map(Json)
        .ok_or_else(|| PlannerError::StationNotFound(id).into())
}

#[derive(Debug, Deserialize)]
pub struct NearestQuery {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
    #[serde(default = "default_search_radius_m")]
    pub max_distance_m: f64,
}

fn default_search_radius_m() -> f64 {
    20_000.0
}

/// Closest station with a free bay.
pub async fn nearest_station(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearestQuery>,
) -> ApiResult<Json<DockingStation>> {
    state
        .planner()
        .allocator()
        .nearest_available(&LatLng::new(query.lat, query.lng), query.max_distance_m)
        .map(Json)
        .ok_or_else(|| {
            ApiError::Planner(PlannerError::StationNotFound(format!(
                "no available station within {:.0} m",
                query.max_distance_m
            )))
        })
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub drone_id: String,
}

pub async fn reserve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ReserveRequest>,
) -> ApiResult<(StatusCode, Json<Reservation>)> {
    let allocator = state.planner().allocator();
    let reservation_id = allocator.reserve(&id, &req.drone_id)?;
    let reservation = allocator.reservation(&reservation_id).ok_or_else(|| {
        ApiError::Internal(anyhow::anyhow!("reservation {reservation_id} vanished"))
    })?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

pub async fn release(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let reservation_id = ReservationId::parse(&id)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid reservation id '{id}'")))?;
    if state.planner().allocator().release(&reservation_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChargeTimeQuery {
    pub from_pct: f64,
    #[serde(default = "full_charge")]
    pub to_pct: f64,
}

fn full_charge() -> f64 {
    100.0
}

#[derive(Debug, Serialize)]
pub struct ChargeTimeResponse {
    pub station_id: String,
    pub charging_type: ChargingType,
    pub seconds: f64,
}

pub async fn charge_time(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ChargeTimeQuery>,
) -> ApiResult<Json<ChargeTimeResponse>> {
    let allocator = state.planner().allocator();
    let duration = allocator.estimate_charge_time(&id, query.from_pct, query.to_pct)?;
    let station = allocator
        .station(&id)
        .ok_or_else(|| PlannerError::StationNotFound(id.clone()))?;
    Ok(Json(ChargeTimeResponse {
        station_id: id,
        charging_type: station.charging_type,
        seconds: duration.as_secs_f64(),
    }))
}
