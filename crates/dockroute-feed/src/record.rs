//! Wire format of the regulatory feed.

use chrono::{DateTime, Utc};
use dockroute_core::{LatLng, RejectedZone, Zone, ZoneKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A polygon vertex as `[lat, lng]` or `{ "lat": .., "lng": .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedPoint {
    Pair([f64; 2]),
    Object(LatLng),
}

impl FeedPoint {
    pub fn position(&self) -> LatLng {
        match self {
            FeedPoint::Pair([lat, lng]) => LatLng::new(*lat, *lng),
            FeedPoint::Object(point) => *point,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedZone {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    pub polygon: Vec<FeedPoint>,
    #[serde(default)]
    pub authority: Option<String>,
    #[serde(default, alias = "validUntil")]
    pub valid_until: Option<String>,
}

impl FeedZone {
    /// Convert to a registry zone. Geometry is validated by the registry.
    pub fn into_zone(self) -> Result<Zone, String> {
        if self.id.trim().is_empty() {
            return Err("record has an empty id".to_string());
        }
        if let Some(kind) = self.kind.as_deref() {
            match ZoneKind::parse(kind) {
                Some(ZoneKind::TemporaryRestriction) => {}
                Some(other) => tracing::warn!(
                    zone_id = %self.id,
                    kind = other.as_str(),
                    "Feed zone kind ignored, treating as temporary restriction"
                ),
                None => return Err(format!("unknown zone kind '{kind}'")),
            }
        }

        let valid_until = match self.valid_until.as_deref() {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|err| format!("invalid valid_until '{raw}': {err}"))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let polygon = self.polygon.iter().map(FeedPoint::position).collect();
        let name = self.name.unwrap_or_else(|| self.id.clone());
        let mut zone = Zone::new(self.id, name, ZoneKind::TemporaryRestriction, polygon);
        zone.valid_until = valid_until;
        zone.authority = self.authority;
        Ok(zone)
    }
}

/// Parsed feed payload: convertible zones plus per-record rejections.
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    pub zones: Vec<Zone>,
    pub rejected: Vec<RejectedZone>,
}

/// Parse a feed body, either a bare array or `{ "zones": [...] }`.
///
/// A malformed record never fails the batch.
pub fn parse_feed(payload: Value) -> anyhow::Result<FeedBatch> {
    let records = match payload {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("zones") {
            Some(Value::Array(records)) => records,
            _ => anyhow::bail!("feed object has no 'zones' array"),
        },
        other => anyhow::bail!("unexpected feed payload: {}", type_name(&other)),
    };

    let mut batch = FeedBatch::default();
    for (index, record) in records.into_iter().enumerate() {
        let fallback_id = record
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("record-{index}"));

        let converted = serde_json::from_value::<FeedZone>(record)
            .map_err(|err| err.to_string())
            .and_then(FeedZone::into_zone);
        match converted {
            Ok(zone) => batch.zones.push(zone),
            Err(reason) => batch.rejected.push(RejectedZone {
                zone_id: fallback_id,
                reason,
            }),
        }
    }
    Ok(batch)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pairs_and_objects() {
        let batch = parse_feed(json!([
            {
                "id": "tfr-1",
                "name": "Stadium",
                "polygon": [[13.06, 80.27], [13.06, 80.28], [13.07, 80.28]],
                "authority": "DGCA",
                "valid_until": "2030-01-01T00:00:00Z"
            },
            {
                "id": "tfr-2",
                "kind": "tfr",
                "polygon": [
                    {"lat": 13.0, "lng": 80.0},
                    {"lat": 13.0, "lon": 80.1},
                    {"lat": 13.1, "lng": 80.1}
                ],
                "validUntil": "2030-01-01T05:30:00+05:30"
            }
        ]))
        .unwrap();

        assert!(batch.rejected.is_empty());
        assert_eq!(batch.zones.len(), 2);
        assert_eq!(batch.zones[0].authority.as_deref(), Some("DGCA"));
        assert_eq!(batch.zones[1].name, "tfr-2");
        assert_eq!(batch.zones[1].polygon[1], LatLng::new(13.0, 80.1));
        assert_eq!(
            batch.zones[1].valid_until.unwrap().to_rfc3339(),
            "2030-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn bad_records_are_rejected_individually() {
        let batch = parse_feed(json!({
            "zones": [
                {
                    "id": "ok",
                    "polygon": [[1.0, 1.0], [1.0, 1.1], [1.1, 1.1]],
                    "valid_until": "2030-01-01T00:00:00Z"
                },
                {"id": "bad-date", "polygon": [[1.0, 1.0]], "valid_until": "tomorrow"},
                {"id": "bad-kind", "kind": "volcano", "polygon": []},
                {"polygon": "nope"}
            ]
        }))
        .unwrap();

        assert_eq!(batch.zones.len(), 1);
        let rejected: Vec<&str> = batch.rejected.iter().map(|r| r.zone_id.as_str()).collect();
        assert_eq!(rejected, vec!["bad-date", "bad-kind", "record-3"]);
    }

    #[test]
    fn non_tfr_kind_is_coerced() {
        let zone = FeedZone {
            id: "z".into(),
            name: None,
            kind: Some("no_fly".into()),
            polygon: vec![],
            authority: None,
            valid_until: None,
        }
        .into_zone()
        .unwrap();
        assert_eq!(zone.kind, ZoneKind::TemporaryRestriction);
        assert!(zone.valid_until.is_none());
    }

    #[test]
    fn scalar_payload_is_an_error() {
        assert!(parse_feed(json!("zones")).is_err());
    }
}
