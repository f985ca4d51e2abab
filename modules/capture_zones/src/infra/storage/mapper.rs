//! Record to model mappers
//!
//! Conversions between persisted records and contract models

use super::entity::{GeometryRecord, PlayerStatEntry, ShopRecord, ZoneRecord};
use crate::contract::{Geometry, PlayerId, PlayerStatRecord, Position, Zone, ZoneType};
use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};

// ===== Zone Conversions =====

impl From<&Zone> for ZoneRecord {
    fn from(zone: &Zone) -> Self {
        Self {
            id: zone.id.clone(),
            name: zone.name.clone(),
            world: zone.world.clone(),
            geometry: (&zone.geometry).into(),
            zone_type: zone.zone_type.as_str().to_string(),
            active: zone.active,
            min_players: zone.min_players,
            max_players: zone.max_players,
            reward: zone.reward,
            created_at: zone.created_at,
        }
    }
}

impl TryFrom<ZoneRecord> for Zone {
    type Error = anyhow::Error;

    fn try_from(record: ZoneRecord) -> Result<Self, Self::Error> {
        let zone_type: ZoneType = record
            .zone_type
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("zone '{}'", record.id))?;

        Ok(Self {
            id: record.id,
            name: record.name,
            world: record.world,
            geometry: record.geometry.into(),
            zone_type,
            active: record.active,
            min_players: record.min_players,
            max_players: record.max_players,
            reward: record.reward,
            created_at: record.created_at,
        })
    }
}

impl From<&Geometry> for GeometryRecord {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point {
                center,
                radius_chunks,
            } => Self::Point {
                x: center.x,
                y: center.y,
                z: center.z,
                radius_chunks: *radius_chunks,
            },
            Geometry::Cuboid { min, max } => Self::Cuboid {
                min_x: min.x,
                min_y: min.y,
                min_z: min.z,
                max_x: max.x,
                max_y: max.y,
                max_z: max.z,
            },
        }
    }
}

impl From<GeometryRecord> for Geometry {
    fn from(record: GeometryRecord) -> Self {
        match record {
            GeometryRecord::Point {
                x,
                y,
                z,
                radius_chunks,
            } => Self::Point {
                center: Position::new(x, y, z),
                radius_chunks,
            },
            GeometryRecord::Cuboid {
                min_x,
                min_y,
                min_z,
                max_x,
                max_y,
                max_z,
            } => Self::Cuboid {
                min: Position::new(min_x, min_y, min_z),
                max: Position::new(max_x, max_y, max_z),
            },
        }
    }
}

// ===== Stats Conversions =====

impl From<&PlayerStatRecord> for PlayerStatEntry {
    fn from(record: &PlayerStatRecord) -> Self {
        Self {
            player: record.player.to_string(),
            captures: record.captures,
            reward_total: record.reward_total,
            last_capture_at: record.last_capture_at,
        }
    }
}

impl From<PlayerStatEntry> for PlayerStatRecord {
    fn from(entry: PlayerStatEntry) -> Self {
        Self {
            player: PlayerId::new(entry.player),
            captures: entry.captures,
            reward_total: entry.reward_total,
            last_capture_at: entry.last_capture_at,
        }
    }
}

// ===== JSON Serialization Helpers =====

pub fn to_blob<T: Serialize>(record: &T) -> anyhow::Result<serde_json::Value> {
    serde_json::to_value(record).context("failed to serialize record")
}

pub fn from_blob<T: DeserializeOwned>(key: &str, blob: serde_json::Value) -> anyhow::Result<T> {
    serde_json::from_value(blob).with_context(|| format!("malformed record at '{}'", key))
}

pub fn shop_record(enabled: bool, last_restock: Option<chrono::DateTime<chrono::Utc>>) -> ShopRecord {
    ShopRecord {
        enabled,
        last_restock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zone_record_rejects_unknown_type() {
        let blob = json!({
            "id": "A1",
            "name": "A1",
            "world": "world",
            "geometry": {"shape": "point", "x": 0.0, "y": 64.0, "z": 0.0, "radius_chunks": 2},
            "zone_type": "arena",
            "created_at": "2026-01-01T00:00:00Z"
        });

        let record: ZoneRecord = from_blob("zones/A1", blob).unwrap();
        assert_eq!(record.min_players, 1);
        assert!(record.active);
        assert!(Zone::try_from(record).is_err());
    }

    #[test]
    fn test_cuboid_record_shape() {
        let geometry = Geometry::Cuboid {
            min: Position::new(0.0, 0.0, 0.0),
            max: Position::new(4.0, 5.0, 6.0),
        };

        let blob = to_blob(&GeometryRecord::from(&geometry)).unwrap();
        assert_eq!(blob["shape"], "cuboid");
        assert_eq!(blob["max_z"], 6.0);
    }
}
