//! REST API for zones, docking stations, route planning and missions.

use std::sync::Arc;

use dockroute_core::PlannerError;

use crate::state::AppState;

pub mod error;
pub mod missions;
pub mod routes;
pub mod stations;
pub mod zones;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;


/// Run a planner call on the blocking pool; searches are CPU-bound.
pub(crate) async fn run_planner<T, F>(state: Arc<AppState>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, PlannerError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|err| ApiError::Internal(anyhow::anyhow!("planner task failed: {err}")))?
        .map_err(ApiError::from)
}
