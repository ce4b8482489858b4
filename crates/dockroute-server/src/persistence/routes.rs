//! Read-only audit log of deployed routes.

use anyhow::Result;
use dockroute_core::{DeployedMission, Route};
use sqlx::SqlitePool;

/// Insert every route of a deployed mission in one transaction.
pub async fn insert_deployed(pool: &SqlitePool, deployed: &DeployedMission) -> Result<usize> {
    let deployed_at = deployed.deployed_at.to_rfc3339();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for task in &deployed.mission.tasks {
        let Some(route) = &task.route else {
            continue;
        };
        let route_json = serde_json::to_string(route)?;
        sqlx::query(
            "INSERT INTO deployed_routes (route_id, mission_id, task_id, route_json, deployed_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&route.id)
        .bind(&deployed.mission.id)
        .bind(&task.id)
        .bind(&route_json)
        .bind(&deployed_at)
        .execute(&mut *tx)
        .await?;
        inserted += 1;
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn load_deployed_routes(pool: &SqlitePool, mission_id: &str) -> Result<Vec<Route>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT route_json FROM deployed_routes WHERE mission_id = ?1 ORDER BY deployed_at, route_id",
    )
    .bind(mission_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(json,)| serde_json::from_str(&json).map_err(Into::into))
        .collect()
}
