//! Docking station inventory persistence.

use anyhow::{Context, Result};
use dockroute_core::{ChargingType, DockingStation, LatLng};
use sqlx::SqlitePool;

fn charging_type_str(charging_type: ChargingType) -> &'static str {
    match charging_type {
        ChargingType::Fast => "fast",
        ChargingType::Slow => "slow",
        ChargingType::BatterySwap => "battery-swap",
    }
}

fn parse_charging_type(value: &str) -> Option<ChargingType> {
    match value {
        "fast" => Some(ChargingType::Fast),
        "slow" => Some(ChargingType::Slow),
        "battery-swap" => Some(ChargingType::BatterySwap),
        _ => None,
    }
}

/// Store a station's inventory record. Occupancy is the registered baseline.
pub async fn upsert_station(pool: &SqlitePool, station: &DockingStation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO docking_stations (id, name, lat, lng, capacity, occupancy, charging_type, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            name = ?2, lat = ?3, lng = ?4, capacity = ?5,
            charging_type = ?7, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&station.id)
    .bind(&station.name)
    .bind(station.location.lat)
    .bind(station.location.lng)
    .bind(i64::from(station.capacity))
    .bind(i64::from(station.occupancy))
    .bind(charging_type_str(station.charging_type))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_all_stations(pool: &SqlitePool) -> Result<Vec<DockingStation>> {
    let rows = sqlx::query_as::<_, StationRow>(
        "SELECT id, name, lat, lng, capacity, occupancy, charging_type FROM docking_stations ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DockingStation::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct StationRow {
    id: String,
    name: String,
    lat: f64,
    lng: f64,
    capacity: i64,
    occupancy: i64,
    charging_type: String,
}

impl TryFrom<StationRow> for DockingStation {
    type Error = anyhow::Error;

    fn try_from(row: StationRow) -> Result<Self> {
        let charging_type = parse_charging_type(&row.charging_type).with_context(|| {
            format!("station {} has unknown charging type '{}'", row.id, row.charging_type)
        })?;
        Ok(DockingStation {
            capacity: u32::try_from(row.capacity)
                .with_context(|| format!("station {} has invalid capacity", row.id))?,
            occupancy: u32::try_from(row.occupancy).unwrap_or(0),
            id: row.id,
            name: row.name,
            location: LatLng::new(row.lat, row.lng),
            charging_type,
        })
    }
}
