//! Application state: the mission planner plus write-through persistence.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use dockroute_core::{
    ComplianceRuleEngine, DeployedMission, DockingStation, DockingStationAllocator, FeedReport,
    MissionPlanner, PlannerError, Route, Zone, ZoneRegistry,
};
use dockroute_feed::FeedBatch;

use crate::config::Config;
use crate::persistence::{self, Database};

/// Shared server state.
///
/// The in-memory registry and allocator are authoritative. Database writes
/// follow every successful mutation; a failed write is logged, not surfaced.
pub struct AppState {
    planner: MissionPlanner,
    db: Option<Database>,
    config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::build(None, config)
    }

    pub fn with_database(db: Database, config: Config) -> Self {
        Self::build(Some(db), config)
    }

    fn build(db: Option<Database>, config: Config) -> Self {
        let planner = MissionPlanner::new(
            Arc::new(ZoneRegistry::new()),
            DockingStationAllocator::new(config.charging),
            ComplianceRuleEngine::new(config.compliance),
            config.optimizer.clone(),
        );
        Self {
            planner,
            db,
            config,
        }
    }

    pub fn planner(&self) -> &MissionPlanner {
        &self.planner
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Restore zones and station inventory after a restart.
    pub async fn load_from_database(&self) -> Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };

        let zones = persistence::zones::load_all_zones(db.pool()).await?;
        let zone_count = zones.len();
        for zone in zones {
            let zone_id = zone.id.clone();
            if let Err(err) = self.planner.zones().upsert_zone(zone) {
                tracing::warn!(zone_id = %zone_id, error = %err, "Skipping stored zone");
            }
        }

        let stations = persistence::stations::load_all_stations(db.pool()).await?;
        let station_count = stations.len();
        for station in stations {
            let station_id = station.id.clone();
            if let Err(err) = self.planner.allocator().register_station(station) {
                tracing::warn!(station_id = %station_id, error = %err, "Skipping stored station");
            }
        }

        tracing::info!(
            zones = zone_count,
            stations = station_count,
            "Loaded state from database"
        );
        Ok(())
    }

    async fn persist_zone(&self, zone: &Zone) {
        if let Some(db) = &self.db {
            if let Err(err) = persistence::zones::upsert_zone(db.pool(), zone).await {
                tracing::error!(zone_id = %zone.id, "Failed to persist zone: {}", err);
            }
        }
    }

    pub async fn upsert_zone(&self, zone: Zone) -> Result<Zone, PlannerError> {
        let zone = self.planner.zones().upsert_zone(zone)?;
        self.persist_zone(&zone).await;
        Ok(zone)
    }

    pub async fn set_zone_active(&self, zone_id: &str, active: bool) -> Result<Zone, PlannerError> {
        let zone = self.planner.zones().set_active(zone_id, active)?;
        self.persist_zone(&zone).await;
        Ok(zone)
    }

    pub async fn remove_zone(&self, zone_id: &str) -> Result<Zone, PlannerError> {
        let zone = self.planner.zones().remove(zone_id)?;
        if let Some(db) = &self.db {
            if let Err(err) = persistence::zones::delete_zone(db.pool(), zone_id).await {
                tracing::error!(zone_id, "Failed to delete zone: {}", err);
            }
        }
        Ok(zone)
    }

    /// Merge a parsed feed batch; parse-time rejections are folded into the report.
    pub async fn apply_feed_batch(&self, batch: FeedBatch) -> FeedReport {
        let mut report = self.planner.zones().apply_feed_update(batch.zones, Utc::now());
        for rejected in &batch.rejected {
            tracing::warn!(
                zone_id = %rejected.zone_id,
                reason = %rejected.reason,
                "Feed record rejected"
            );
        }
        report.rejected.splice(0..0, batch.rejected);

        for zone_id in &report.accepted {
            if let Some(zone) = self.planner.zones().get(zone_id) {
                self.persist_zone(&zone).await;
            }
        }
        report
    }

    /// Deactivate expired temporary restrictions and persist the change.
    pub async fn expire_stale_zones(&self) -> Vec<String> {
        let expired = self.planner.zones().expire_stale_zones(Utc::now());
        for zone_id in &expired {
            if let Some(zone) = self.planner.zones().get(zone_id) {
                self.persist_zone(&zone).await;
            }
        }
        expired
    }

    pub async fn register_station(
        &self,
        station: DockingStation,
    ) -> Result<DockingStation, PlannerError> {
        let station = self.planner.allocator().register_station(station)?;
        if let Some(db) = &self.db {
            if let Err(err) = persistence::stations::upsert_station(db.pool(), &station).await {
                tracing::error!(station_id = %station.id, "Failed to persist station: {}", err);
            }
        }
        Ok(station)
    }

    /// Deploy a mission and append its routes to the audit log.
    pub async fn deploy_mission(&self, mission_id: &str) -> Result<DeployedMission, PlannerError> {
        let deployed = self.planner.deploy_mission(mission_id)?;
        if let Some(db) = &self.db {
            match persistence::routes::insert_deployed(db.pool(), &deployed).await {
                Ok(count) => {
                    tracing::info!(mission_id, routes = count, "Deployed routes persisted")
                }
                Err(err) => {
                    tracing::error!(mission_id, "Failed to persist deployed routes: {}", err)
                }
            }
        }
        Ok(deployed)
    }

    pub async fn deployed_routes(&self, mission_id: &str) -> Result<Vec<Route>> {
        match &self.db {
            Some(db) => persistence::routes::load_deployed_routes(db.pool(), mission_id).await,
            None => Ok(Vec::new()),
        }
    }
}
