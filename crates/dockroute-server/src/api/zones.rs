//! Zone endpoints: CRUD, activation toggles, feed ingestion and path checks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use dockroute_core::{Conflict, FeedReport, LatLng, Zone, ZoneKind};

use crate::api::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateZoneRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub kind: ZoneKind,
    pub polygon: Vec<LatLng>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub authority: Option<String>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Create or replace a zone.
pub async fn create_zone(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateZoneRequest>,
) -> ApiResult<(StatusCode, Json<Zone>)> {
    let id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut zone = Zone::new(id, req.name, req.kind, req.polygon);
    zone.active = req.active.unwrap_or(true);
    zone.description = req.description.unwrap_or_default();
    zone.authority = req.authority;
    zone.valid_until = req.valid_until;

    let zone = state.upsert_zone(zone).await?;
    tracing::info!("Created zone '{}' ({})", zone.name, zone.id);
    Ok((StatusCode::CREATED, Json(zone)))
}

#[derive(Debug, Deserialize)]
pub struct ZoneListQuery {
    pub kind: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_zones(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ZoneListQuery>,
) -> ApiResult<Json<Vec<Zone>>> {
    let kind = match query.kind.as_deref() {
        Some(raw) => Some(
            ZoneKind::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown zone kind '{raw}'")))?,
        ),
        None => None,
    };

    let registry = state.planner().zones();
    let zones = if query.active_only {
        registry.list_active(kind, Utc::now())
    } else {
        registry
            .all()
            .into_iter()
            .filter(|zone| kind.map_or(true, |kind| zone.kind == kind))
            .collect()
    };
    Ok(Json(zones))
}

pub async fn get_zone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Zone>> {
    state
        .planner()
        .zones()
        .get(&id)
        .map(Json)
        .ok_or_else(|| dockroute_core::PlannerError::ZoneNotFound(id).into())
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

pub async fn set_zone_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> ApiResult<Json<Zone>> {
    Ok(Json(state.set_zone_active(&id, req.active).await?))
}

pub async fn delete_zone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.remove_zone(&id).await?;
    tracing::info!("Deleted zone {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Push a feed payload directly, bypassing the sync loop.
pub async fn ingest_feed(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<FeedReport>> {
    let batch = dockroute_feed::parse_feed(payload)
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(Json(state.apply_feed_batch(batch).await))
}

#[derive(Debug, Deserialize)]
pub struct CheckPathRequest {
    pub waypoints: Vec<LatLng>,
}

#[derive(Debug, Serialize)]
pub struct CheckPathResponse {
    pub compliant: bool,
    pub conflicts: Vec<Conflict>,
}

/// Classify an arbitrary path against the current zone set.
pub async fn check_path(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckPathRequest>,
) -> ApiResult<Json<CheckPathResponse>> {
    if req.waypoints.len() < 2 {
        return Err(ApiError::BadRequest("path needs at least two waypoints".to_string()));
    }
    let planner = state.planner();
    let snapshot = planner.zones().snapshot(Utc::now());
    let prepared = planner.compliance().prepare(snapshot.zones());
    let conflicts = planner
        .compliance()
        .evaluate_path("path-check", &req.waypoints, &prepared);
    Ok(Json(CheckPathResponse {
        compliant: conflicts.iter().all(|conflict| !conflict.is_critical()),
        conflicts,
    }))
}
