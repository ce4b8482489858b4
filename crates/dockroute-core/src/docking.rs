//! Docking station inventory, reservations and charge-time estimates.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{PlannerError, Result};
use crate::models::{ChargingType, DockingStation, LatLng, StationStatus};

/// Charge rates per charging type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargingModel {
    pub fast_pct_per_min: f64,
    pub slow_pct_per_min: f64,
    pub swap_duration_s: u64,
}

impl Default for ChargingModel {
    fn default() -> Self {
        Self {
            fast_pct_per_min: 2.0,
            slow_pct_per_min: 0.5,
            swap_duration_s: 180,
        }
    }
}

impl ChargingModel {
    /// Time to bring a battery from `from_pct` to `to_pct`.
    ///
    /// Battery swaps take a fixed time regardless of the delta.
    pub fn charge_time(&self, charging_type: ChargingType, from_pct: f64, to_pct: f64) -> Duration {
        let rate_per_min = match charging_type {
            ChargingType::BatterySwap => return Duration::from_secs(self.swap_duration_s),
            ChargingType::Fast => self.fast_pct_per_min,
            ChargingType::Slow => self.slow_pct_per_min,
        };
        let delta = (to_pct.min(100.0) - from_pct.max(0.0)).max(0.0);
        if delta == 0.0 || rate_per_min <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(delta / rate_per_min * 60.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub station_id: String,
    pub drone_id: String,
    pub created_at: DateTime<Utc>,
}

/// Shared station inventory.
///
/// Cloning is cheap and every clone sees the same stations and reservations.
#[derive(Debug, Clone, Default)]
pub struct DockingStationAllocator {
    stations: Arc<DashMap<String, DockingStation>>,
    reservations: Arc<DashMap<ReservationId, Reservation>>,
    charging: ChargingModel,
}

impl DockingStationAllocator {
    pub fn new(charging: ChargingModel) -> Self {
        Self {
            stations: Arc::new(DashMap::new()),
            reservations: Arc::new(DashMap::new()),
            charging,
        }
    }

    pub fn charging_model(&self) -> &ChargingModel {
        &self.charging
    }

    /// Add or update a station.
    ///
    /// Updating an existing station keeps its live occupancy.
    pub fn register_station(&self, mut station: DockingStation) -> Result<DockingStation> {
        if station.id.trim().is_empty() || station.capacity == 0 {
            return Err(PlannerError::InvalidStation {
                station_id: station.id,
                reason: "station needs an id and a capacity of at least 1".to_string(),
            });
        }
        if !station.location.is_valid() {
            return Err(PlannerError::InvalidStation {
                station_id: station.id,
                reason: "station coordinates out of range".to_string(),
            });
        }

        let stored = match self.stations.entry(station.id.clone()) {
            Entry::Occupied(mut entry) => {
                station.occupancy = entry.get().occupancy;
                entry.insert(station.clone());
                station
            }
            Entry::Vacant(entry) => {
                station.occupancy = station.occupancy.min(station.capacity);
                entry.insert(station.clone());
                station
            }
        };
        tracing::info!(
            station_id = %stored.id,
            capacity = stored.capacity,
            occupancy = stored.occupancy,
            "Docking station registered"
        );
        Ok(stored)
    }

    pub fn station(&self, station_id: &str) -> Option<DockingStation> {
        self.stations.get(station_id).map(|s| s.value().clone())
    }

    pub fn list_stations(&self) -> Vec<DockingStation> {
        let mut stations: Vec<DockingStation> =
            self.stations.iter().map(|s| s.value().clone()).collect();
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        stations
    }

    /// Stations that currently have a free bay.
    pub fn available_stations(&self) -> Vec<DockingStation> {
        self.list_stations()
            .into_iter()
            .filter(|s| s.status() != StationStatus::Occupied)
            .collect()
    }

    pub fn reservation(&self, reservation_id: &ReservationId) -> Option<Reservation> {
        self.reservations.get(reservation_id).map(|r| r.value().clone())
    }

    /// Take one bay at a station.
    ///
    /// The check and the increment happen under the station's shard lock.
    pub fn reserve(&self, station_id: &str, drone_id: &str) -> Result<ReservationId> {
        let mut station = self
            .stations
            .get_mut(station_id)
            .ok_or_else(|| PlannerError::StationNotFound(station_id.to_string()))?;

        if station.occupancy >= station.capacity {
            return Err(PlannerError::StationFull {
                station_id: station_id.to_string(),
                capacity: station.capacity,
            });
        }
        station.occupancy += 1;
        let occupancy = station.occupancy;
        drop(station);

        let id = ReservationId::new();
        self.reservations.insert(
            id,
            Reservation {
                id,
                station_id: station_id.to_string(),
                drone_id: drone_id.to_string(),
                created_at: Utc::now(),
            },
        );
        tracing::info!(%id, station_id, drone_id, occupancy, "Docking bay reserved");
        Ok(id)
    }

    /// Free a reservation. Releasing an unknown or already released id is a no-op.
    ///
    /// Returns whether a bay was actually freed.
    pub fn release(&self, reservation_id: &ReservationId) -> bool {
        let Some((_, reservation)) = self.reservations.remove(reservation_id) else {
            tracing::debug!(%reservation_id, "Release of unknown reservation ignored");
            return false;
        };
        if let Some(mut station) = self.stations.get_mut(&reservation.station_id) {
            station.occupancy = station.occupancy.saturating_sub(1);
        }
        tracing::info!(
            %reservation_id,
            station_id = %reservation.station_id,
            "Docking bay released"
        );
        true
    }

    pub fn estimate_charge_time(
        &self,
        station_id: &str,
        from_pct: f64,
        to_pct: f64,
    ) -> Result<Duration> {
        let station = self
            .station(station_id)
            .ok_or_else(|| PlannerError::StationNotFound(station_id.to_string()))?;
        Ok(self
            .charging
            .charge_time(station.charging_type, from_pct, to_pct))
    }

    /// Closest station with a free bay within `max_distance_m` of `point`.
    pub fn nearest_available(&self, point: &LatLng, max_distance_m: f64) -> Option<DockingStation> {
        self.stations
            .iter()
            .filter(|s| s.status() != StationStatus::Occupied)
            .map(|s| (s.location.distance_m(point), s.value().clone()))
            .filter(|(distance, _)| *distance <= max_distance_m)
            .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)))
            .map(|(_, station)| station)
    }
}

/// Provisional reservations released on drop unless committed.
pub struct ReservationGuard<'a> {
    allocator: &'a DockingStationAllocator,
    held: Vec<ReservationId>,
}

impl<'a> ReservationGuard<'a> {
    pub fn new(allocator: &'a DockingStationAllocator) -> Self {
        Self {
            allocator,
            held: Vec::new(),
        }
    }

    pub fn reserve(&mut self, station_id: &str, drone_id: &str) -> Result<ReservationId> {
        let id = self.allocator.reserve(station_id, drone_id)?;
        self.held.push(id);
        Ok(id)
    }

    pub fn release_all(&mut self) {
        for id in self.held.drain(..) {
            self.allocator.release(&id);
        }
    }

    pub fn held(&self) -> &[ReservationId] {
        &self.held
    }

    /// Keep the reservations; the caller now owns their release.
    pub fn commit(mut self) -> Vec<ReservationId> {
        std::mem::take(&mut self.held)
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            tracing::debug!(count = self.held.len(), "Releasing provisional reservations");
        }
        self.release_all();
    }
}
