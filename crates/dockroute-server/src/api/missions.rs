//! Mission authoring and compliance endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use dockroute_core::{
    DeployabilityReport, DeployedMission, Mission, RestrictionRule, Route, TaskDraft, TaskStatus,
    TaskValidation,
};

use crate::api::{run_planner, ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    pub name: String,
    pub tasks: Vec<TaskDraft>,
}

/// Create a mission and validate its tasks against the current zones.
pub async fn create_mission(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMissionRequest>,
) -> ApiResult<(StatusCode, Json<Mission>)> {
    if req.tasks.iter().any(|task| task.waypoints.len() < 2) {
        return Err(ApiError::BadRequest("every task needs at least two waypoints".to_string()));
    }
    let mission = run_planner(state, move |state| {
        state.planner().create_mission(&req.name, req.tasks)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(mission)))
}

pub async fn list_missions(State(state): State<Arc<AppState>>) -> Json<Vec<Mission>> {
    Json(state.planner().list_missions())
}

pub async fn get_mission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Mission>> {
    Ok(Json(state.planner().mission(&id)?))
}

pub async fn validation_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TaskValidation>>> {
    Ok(Json(state.planner().validation_results(&id)?))
}

pub async fn revalidate_mission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TaskValidation>>> {
    let results = run_planner(state, move |state| state.planner().revalidate_mission(&id)).await?;
    Ok(Json(results))
}

pub async fn deployability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeployabilityReport>> {
    Ok(Json(state.planner().deployability(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub zone_id: String,
}

#[derive(Debug, Serialize)]
pub struct AcknowledgeResponse {
    pub task_id: String,
    pub zone_id: String,
    pub status: TaskStatus,
}

pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
    Json(req): Json<AcknowledgeRequest>,
) -> ApiResult<Json<AcknowledgeResponse>> {
    let status = state.planner().acknowledge(&id, &task_id, &req.zone_id)?;
    Ok(Json(AcknowledgeResponse {
        task_id,
        zone_id: req.zone_id,
        status,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetRuleRequest {
    pub rule: RestrictionRule,
}

pub async fn set_rule(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
    Json(req): Json<SetRuleRequest>,
) -> ApiResult<Json<TaskValidation>> {
    let validation = run_planner(state, move |state| {
        state.planner().set_restriction_rule(&id, &task_id, req.rule)
    })
    .await?;
    Ok(Json(validation))
}

pub async fn plan_task_route(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<Route>> {
    let route = run_planner(state, move |state| {
        state.planner().plan_task_route(&id, &task_id)
    })
    .await?;
    Ok(Json(route))
}

pub async fn reroute_task(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<TaskValidation>> {
    let validation = run_planner(state, move |state| {
        state.planner().apply_auto_reroute(&id, &task_id)
    })
    .await?;
    Ok(Json(validation))
}

pub async fn cancel_mission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Mission>> {
    Ok(Json(state.planner().cancel_mission(&id)?))
}

pub async fn deploy_mission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeployedMission>> {
    Ok(Json(state.deploy_mission(&id).await?))
}

pub async fn deployed_routes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Route>>> {
    Ok(Json(state.deployed_routes(&id).await?))
}
