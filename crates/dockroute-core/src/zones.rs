//! Restricted-airspace zone registry.
//!
//! Writes are serialized behind a single `RwLock`; readers clone the current
//! `Arc` so a planning request keeps a consistent view while writers publish
//! a new map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{PlannerError, Result};
use crate::models::{Zone, ZoneKind};

type ZoneMap = BTreeMap<String, Zone>;

/// Immutable set of effective zones captured for one planning request.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    pub taken_at: DateTime<Utc>,
    zones: Arc<ZoneMap>,
}

impl ZoneSnapshot {
    pub fn from_zones(zones: Vec<Zone>, taken_at: DateTime<Utc>) -> Self {
        let map = zones
            .into_iter()
            .filter(|zone| zone.is_effective(taken_at))
            .map(|zone| (zone.id.clone(), zone))
            .collect();
        Self {
            taken_at,
            zones: Arc::new(map),
        }
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn get(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.get(zone_id)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Outcome of merging one feed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedZone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedZone {
    pub zone_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: RwLock<Arc<ZoneMap>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Arc<ZoneMap> {
        self.zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write<T>(&self, f: impl FnOnce(&mut ZoneMap) -> T) -> T {
        let mut guard = self.zones.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }

    /// Validate and insert a zone, replacing any zone with the same id.
    pub fn upsert_zone(&self, mut zone: Zone) -> Result<Zone> {
        zone.normalize()?;
        let stored = zone.clone();
        self.write(|zones| zones.insert(zone.id.clone(), zone));
        tracing::info!(zone_id = %stored.id, kind = stored.kind.as_str(), "Zone upserted");
        Ok(stored)
    }

    pub fn set_active(&self, zone_id: &str, active: bool) -> Result<Zone> {
        let updated = self.write(|zones| {
            zones.get_mut(zone_id).map(|zone| {
                zone.active = active;
                zone.clone()
            })
        });
        let zone = updated.ok_or_else(|| PlannerError::ZoneNotFound(zone_id.to_string()))?;
        tracing::info!(zone_id, active, "Zone activation changed");
        Ok(zone)
    }

    pub fn remove(&self, zone_id: &str) -> Result<Zone> {
        self.write(|zones| zones.remove(zone_id))
            .ok_or_else(|| PlannerError::ZoneNotFound(zone_id.to_string()))
    }

    pub fn get(&self, zone_id: &str) -> Option<Zone> {
        self.read().get(zone_id).cloned()
    }

    /// Every stored zone, including inactive and expired ones.
    pub fn all(&self) -> Vec<Zone> {
        self.read().values().cloned().collect()
    }

    /// Merge externally-sourced zones.
    ///
    /// Feed zones are always temporary restrictions and must carry
    /// `valid_until`. Invalid records are rejected individually; the rest of
    /// the batch is applied under one write lock.
    pub fn apply_feed_update(&self, feed_zones: Vec<Zone>, now: DateTime<Utc>) -> FeedReport {
        let mut report = FeedReport::default();
        let mut valid = Vec::with_capacity(feed_zones.len());

        for mut zone in feed_zones {
            zone.kind = ZoneKind::TemporaryRestriction;
            if zone.valid_until.is_none() {
                report.rejected.push(RejectedZone {
                    zone_id: zone.id.clone(),
                    reason: "feed zone has no valid_until".to_string(),
                });
                continue;
            }
            match zone.normalize() {
                Ok(()) => {
                    zone.active = !zone.is_expired(now);
                    valid.push(zone);
                }
                Err(err) => report.rejected.push(RejectedZone {
                    zone_id: zone.id.clone(),
                    reason: err.to_string(),
                }),
            }
        }

        self.write(|zones| {
            for zone in valid {
                report.accepted.push(zone.id.clone());
                zones.insert(zone.id.clone(), zone);
            }
        });

        for rejected in &report.rejected {
            tracing::warn!(
                zone_id = %rejected.zone_id,
                reason = %rejected.reason,
                "Feed zone rejected"
            );
        }
        tracing::info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Feed update applied"
        );
        report
    }

    /// Deactivate temporary restrictions whose validity has passed.
    ///
    /// Returns the ids that were deactivated by this call.
    pub fn expire_stale_zones(&self, now: DateTime<Utc>) -> Vec<String> {
        // Skip the write lock when nothing needs to change.
        let needs_update = self
            .read()
            .values()
            .any(|zone| zone.active && zone.is_expired(now));
        if !needs_update {
            return Vec::new();
        }

        let expired = self.write(|zones| {
            let mut expired = Vec::new();
            for zone in zones.values_mut() {
                if zone.active && zone.is_expired(now) {
                    zone.active = false;
                    expired.push(zone.id.clone());
                }
            }
            expired
        });
        for zone_id in &expired {
            tracing::info!(zone_id = %zone_id, "Temporary restriction expired");
        }
        expired
    }

    pub fn list_active(&self, kind: Option<ZoneKind>, now: DateTime<Utc>) -> Vec<Zone> {
        self.expire_stale_zones(now);
        self.read()
            .values()
            .filter(|zone| zone.is_effective(now))
            .filter(|zone| kind.map_or(true, |kind| zone.kind == kind))
            .cloned()
            .collect()
    }

    /// Consistent view of effective zones for one planning request.
    pub fn snapshot(&self, now: DateTime<Utc>) -> ZoneSnapshot {
        self.expire_stale_zones(now);
        let zones = self.read();
        let effective: ZoneMap = zones
            .iter()
            .filter(|(_, zone)| zone.is_effective(now))
            .map(|(id, zone)| (id.clone(), zone.clone()))
            .collect();
        ZoneSnapshot {
            taken_at: now,
            zones: Arc::new(effective),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LatLng;
    use chrono::Duration;

    fn zone(id: &str, kind: ZoneKind) -> Zone {
        Zone::new(
            id,
            id,
            kind,
            vec![
                LatLng::new(13.0, 80.0),
                LatLng::new(13.0, 80.01),
                LatLng::new(13.01, 80.01),
                LatLng::new(13.01, 80.0),
            ],
        )
    }

    #[test]
    fn upsert_replaces_by_id() {
        let registry = ZoneRegistry::new();
        registry.upsert_zone(zone("a", ZoneKind::NoFly)).unwrap();
        let mut replacement = zone("a", ZoneKind::Restricted);
        replacement.name = "Renamed".into();
        registry.upsert_zone(replacement).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().kind, ZoneKind::Restricted);
    }

    #[test]
    fn upsert_rejects_two_vertices() {
        let registry = ZoneRegistry::new();
        let mut bad = zone("bad", ZoneKind::NoFly);
        bad.polygon.truncate(2);
        assert!(matches!(
            registry.upsert_zone(bad),
            Err(PlannerError::InvalidGeometry { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn set_active_unknown_zone_fails() {
        let registry = ZoneRegistry::new();
        assert_eq!(
            registry.set_active("missing", false).unwrap_err(),
            PlannerError::ZoneNotFound("missing".into())
        );
    }

    #[test]
    fn inactive_zone_hidden_from_list() {
        let registry = ZoneRegistry::new();
        let now = Utc::now();
        registry.upsert_zone(zone("a", ZoneKind::NoFly)).unwrap();
        registry.set_active("a", false).unwrap();
        assert!(registry.list_active(None, now).is_empty());
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn feed_update_rejects_per_zone() {
        let registry = ZoneRegistry::new();
        let now = Utc::now();
        let good = zone("tfr-1", ZoneKind::Custom).with_valid_until(now + Duration::hours(2));
        let no_expiry = zone("tfr-2", ZoneKind::TemporaryRestriction);
        let mut broken = zone("tfr-3", ZoneKind::TemporaryRestriction)
            .with_valid_until(now + Duration::hours(2));
        broken.polygon.truncate(2);

        let report = registry.apply_feed_update(vec![good, no_expiry, broken], now);
        assert_eq!(report.accepted, vec!["tfr-1".to_string()]);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(
            registry.get("tfr-1").unwrap().kind,
            ZoneKind::TemporaryRestriction
        );
    }

    #[test]
    fn list_active_expires_stale_tfrs() {
        let registry = ZoneRegistry::new();
        let now = Utc::now();
        registry
            .upsert_zone(
                zone("old", ZoneKind::TemporaryRestriction)
                    .with_valid_until(now - Duration::minutes(5)),
            )
            .unwrap();
        registry.upsert_zone(zone("nf", ZoneKind::NoFly)).unwrap();

        let active = registry.list_active(None, now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "nf");
        assert!(!registry.get("old").unwrap().active);
    }

    #[test]
    fn kind_filter_applies() {
        let registry = ZoneRegistry::new();
        let now = Utc::now();
        registry.upsert_zone(zone("nf", ZoneKind::NoFly)).unwrap();
        registry.upsert_zone(zone("r", ZoneKind::Restricted)).unwrap();
        let restricted = registry.list_active(Some(ZoneKind::Restricted), now);
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted[0].id, "r");
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let registry = ZoneRegistry::new();
        let now = Utc::now();
        registry.upsert_zone(zone("nf", ZoneKind::NoFly)).unwrap();
        let snapshot = registry.snapshot(now);
        registry.set_active("nf", false).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(registry.snapshot(now).is_empty());
    }
}
