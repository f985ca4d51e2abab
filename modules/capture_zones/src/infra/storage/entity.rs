//! Persisted record shapes
//!
//! These are the blobs written to the data store, one per key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored under `zones/<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub id: String,
    pub name: String,
    pub world: String,
    pub geometry: GeometryRecord,
    pub zone_type: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_min_players")]
    pub min_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
    #[serde(default)]
    pub reward: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GeometryRecord {
    Point {
        x: f64,
        y: f64,
        z: f64,
        radius_chunks: i32,
    },
    Cuboid {
        min_x: f64,
        min_y: f64,
        min_z: f64,
        max_x: f64,
        max_y: f64,
        max_z: f64,
    },
}

/// Stored under `shops/<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopRecord {
    pub enabled: bool,
    #[serde(default)]
    pub last_restock: Option<DateTime<Utc>>,
}

/// One entry of the list stored under `stats/players`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatEntry {
    pub player: String,
    pub captures: u64,
    pub reward_total: f64,
    #[serde(default)]
    pub last_capture_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_min_players() -> u32 {
    1
}
