//! Zone persistence operations.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dockroute_core::{LatLng, Zone, ZoneKind};
use sqlx::SqlitePool;

pub async fn upsert_zone(pool: &SqlitePool, zone: &Zone) -> Result<()> {
    let vertices = serde_json::to_string(&zone.polygon)?;

    sqlx::query(
        r#"
        INSERT INTO zones (id, name, kind, vertices, active, description, authority, valid_until, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            name = ?2, kind = ?3, vertices = ?4, active = ?5,
            description = ?6, authority = ?7, valid_until = ?8,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&zone.id)
    .bind(&zone.name)
    .bind(zone.kind.as_str())
    .bind(&vertices)
    .bind(zone.active)
    .bind(&zone.description)
    .bind(&zone.authority)
    .bind(zone.valid_until.map(|t| t.to_rfc3339()))
    .bind(zone.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_all_zones(pool: &SqlitePool) -> Result<Vec<Zone>> {
    let rows = sqlx::query_as::<_, ZoneRow>(
        "SELECT id, name, kind, vertices, active, description, authority, valid_until, created_at FROM zones",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Zone::try_from).collect()
}

pub async fn delete_zone(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM zones WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct ZoneRow {
    id: String,
    name: String,
    kind: String,
    vertices: String,
    active: bool,
    description: String,
    authority: Option<String>,
    valid_until: Option<String>,
    created_at: String,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp '{value}'"))?
        .with_timezone(&Utc))
}

impl TryFrom<ZoneRow> for Zone {
    type Error = anyhow::Error;

    fn try_from(row: ZoneRow) -> Result<Self> {
        let kind = ZoneKind::parse(&row.kind)
            .with_context(|| format!("zone {} has unknown kind '{}'", row.id, row.kind))?;
        let polygon: Vec<LatLng> = serde_json::from_str(&row.vertices)
            .with_context(|| format!("zone {} has malformed vertices", row.id))?;
        let valid_until = row.valid_until.as_deref().map(parse_time).transpose()?;
        let created_at = parse_time(&row.created_at).unwrap_or_else(|_| Utc::now());

        Ok(Zone {
            id: row.id,
            name: row.name,
            kind,
            polygon,
            active: row.active,
            description: row.description,
            authority: row.authority,
            valid_until,
            created_at,
        })
    }
}
