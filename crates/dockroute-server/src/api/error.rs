//! Mapping of planner failures to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dockroute_core::PlannerError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Planner(err) => match err {
                PlannerError::InvalidGeometry { .. }
                | PlannerError::InvalidZone { .. }
                | PlannerError::InvalidStation { .. } => StatusCode::BAD_REQUEST,
                PlannerError::ZoneNotFound(_)
                | PlannerError::StationNotFound(_)
                | PlannerError::TaskNotFound(_)
                | PlannerError::MissionNotFound(_) => StatusCode::NOT_FOUND,
                PlannerError::InvalidAcknowledgment { .. }
                | PlannerError::StationFull { .. }
                | PlannerError::NotDeployable { .. }
                | PlannerError::Cancelled(_) => StatusCode::CONFLICT,
                PlannerError::RouteInfeasible { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        let mut body = match self {
            ApiError::Planner(err) => json!({ "error": err.code(), "message": err.to_string() }),
            ApiError::BadRequest(message) => json!({ "error": "bad_request", "message": message }),
            ApiError::Internal(_) => {
                json!({ "error": "internal", "message": "internal server error" })
            }
        };

        let context = match self {
            ApiError::Planner(PlannerError::InvalidGeometry { zone_id, reason })
            | ApiError::Planner(PlannerError::InvalidZone { zone_id, reason }) => {
                json!({ "zone_id": zone_id, "reason": reason })
            }
            ApiError::Planner(PlannerError::ZoneNotFound(zone_id)) => json!({ "zone_id": zone_id }),
            ApiError::Planner(PlannerError::InvalidAcknowledgment { task_id, zone_id, reason }) => {
                json!({ "task_id": task_id, "zone_id": zone_id, "reason": reason })
            }
            ApiError::Planner(PlannerError::StationNotFound(station_id))
            | ApiError::Planner(PlannerError::InvalidStation { station_id, .. })
            | ApiError::Planner(PlannerError::StationFull { station_id, .. }) => {
                json!({ "station_id": station_id })
            }
            ApiError::Planner(PlannerError::RouteInfeasible { reason, detail }) => {
                json!({ "reason": reason, "detail": detail })
            }
            ApiError::Planner(PlannerError::TaskNotFound(task_id)) => json!({ "task_id": task_id }),
            ApiError::Planner(PlannerError::MissionNotFound(mission_id))
            | ApiError::Planner(PlannerError::Cancelled(mission_id)) => {
                json!({ "mission_id": mission_id })
            }
            ApiError::Planner(PlannerError::NotDeployable { mission_id, blocking_tasks }) => {
                json!({ "mission_id": mission_id, "blocking_tasks": blocking_tasks })
            }
            ApiError::BadRequest(_) | ApiError::Internal(_) => json!({}),
        };

        if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), context) {
            body.extend(extra);
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            tracing::error!("Request failed: {:#}", err);
        }
        (self.status(), Json(self.body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
